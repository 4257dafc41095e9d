//! meter2car-lib: surplus solar charging for go-e wallboxes
//!
//! This crate provides the building blocks of the `meter2car` daemon:
//! - `hdlc` and `dlms`: codecs for the frames smart meters push over their
//!   customer interface
//! - `meter`: reads and decrypts the live import/export power
//! - `charger`: status and control of a go-e charger over HTTP
//! - `control`: the decision logic turning surplus power into charging current
//! - `config`: the TOML configuration file

pub mod average;
pub mod charger;
pub mod config;
pub mod consts;
pub mod control;
pub mod dlms;
pub mod hdlc;
pub mod key;
pub mod meter;
pub mod paths;
