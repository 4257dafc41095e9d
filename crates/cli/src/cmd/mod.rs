mod charge;
mod config;
mod meter;
mod run;
mod status;

pub use charge::{ChargeState, cmd_ampere, cmd_charge};
pub use config::cmd_config;
pub use meter::cmd_meter;
pub use run::cmd_run;
pub use status::cmd_status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use meter2car_lib::charger::GoE;
use meter2car_lib::config::Config;

use crate::output::OutputFormat;

/// Flags shared by all subcommands.
pub struct GlobalOptions {
  pub config: Option<PathBuf>,
  pub url: Option<String>,
  pub output: OutputFormat,
}

impl GlobalOptions {
  /// Load the configuration and apply command-line overrides.
  pub fn load_config(&self) -> Result<Config> {
    let mut config = match &self.config {
      Some(path) => Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))?,
      None => Config::load_default().context("Failed to load default config")?,
    };

    if let Some(url) = &self.url {
      config.charger.url = Some(url.clone());
      config.validate().context("Invalid --url")?;
    }

    Ok(config)
  }

  pub fn charger(&self, config: &Config) -> Result<GoE> {
    GoE::from_config(&config.charger).context("Failed to set up charger client")
  }
}
