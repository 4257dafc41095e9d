//! Config command implementation.
//!
//! Prints the configuration after defaults, file and environment are merged.

use anyhow::{Context, Result};

use super::GlobalOptions;
use crate::output::{print_info, print_json};

const REDACTED: &str = "<redacted>";

pub fn cmd_config(options: &GlobalOptions) -> Result<()> {
  let mut config = options.load_config()?;
  if config.meter.key.is_some() {
    config.meter.key = Some(REDACTED.to_string());
  }

  if options.output.is_json() {
    return print_json(&config);
  }

  let interval = humantime::format_duration(config.control.interval());
  print_info(&format!("Control interval: {}", interval));
  let rendered = toml::to_string_pretty(&config).context("Failed to serialize config")?;
  print!("{}", rendered);
  Ok(())
}
