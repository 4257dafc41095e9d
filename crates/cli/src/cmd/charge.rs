//! Manual charger control.

use anyhow::{Context, Result};
use clap::ValueEnum;
use meter2car_lib::charger::Charger;

use super::GlobalOptions;
use crate::output::{print_success, print_warning};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ChargeState {
  On,
  Off,
}

pub async fn cmd_charge(options: &GlobalOptions, state: ChargeState) -> Result<()> {
  let config = options.load_config()?;
  let charger = options.charger(&config)?;
  let allowed = matches!(state, ChargeState::On);

  charger
    .set_charging_allowed(allowed)
    .await
    .context("Failed to switch charging")?;

  print_success(if allowed { "Charging allowed" } else { "Charging forbidden" });
  Ok(())
}

pub async fn cmd_ampere(options: &GlobalOptions, ampere: u8) -> Result<()> {
  let config = options.load_config()?;
  let charger = options.charger(&config)?;

  let effective = charger.clamp_ampere(ampere);
  if effective != ampere {
    print_warning(&format!(
      "{} A is outside the configured range {}-{} A, using {} A",
      ampere, config.charger.min_ampere, config.charger.max_ampere, effective
    ));
  }

  charger.set_ampere(ampere).await.context("Failed to set charging current")?;

  print_success(&format!("Charging current set to {} A", effective));
  Ok(())
}
