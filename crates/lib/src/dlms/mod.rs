//! DLMS/COSEM application layer.
//!
//! Meters push `data-notification` APDUs, usually wrapped in
//! `general-glo-ciphering`. This module decodes both along with the A-XDR
//! encoded payload.

mod apdu;
mod cipher;
mod data;
mod reader;

pub use apdu::{Apdu, DataNotification};
pub use cipher::{SecurityControl, encode_encrypted};
pub use data::Data;

use thiserror::Error;

/// Errors produced while decoding APDUs and their payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DlmsError {
  /// The input ends early; carries the number of missing bytes when known.
  #[error("incomplete APDU")]
  Incomplete(Option<usize>),

  #[error("unsupported APDU tag 0x{0:02X}")]
  UnsupportedApdu(u8),

  #[error("unsupported data type 0x{0:02X}")]
  UnsupportedData(u8),

  #[error("invalid length field")]
  InvalidLength,

  #[error("unsupported security control byte 0x{0:02X}")]
  UnsupportedSecurity(u8),
}
