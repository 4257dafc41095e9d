//! Status command implementation.
//!
//! Displays the charger's current state.

use anyhow::{Context, Result};
use meter2car_lib::charger::{Charger, ChargingStatus};

use super::GlobalOptions;
use crate::output::{format_watts, print_json, print_stat, print_success};

pub async fn cmd_status(options: &GlobalOptions) -> Result<()> {
  let config = options.load_config()?;
  let charger = options.charger(&config)?;

  let status = charger
    .status()
    .await
    .with_context(|| format!("Failed to query charger at {}", charger.url()))?;

  if options.output.is_json() {
    print_json(&status)?;
    return Ok(());
  }

  let state = match status.charging_status {
    ChargingStatus::Ready => "no car connected",
    ChargingStatus::Charging => "charging",
    ChargingStatus::Waiting => "waiting for car",
    ChargingStatus::Finished => "charge finished",
  };

  print_success(&format!("Charger at {}", charger.url()));
  print_stat("State", state);
  print_stat("Charging allowed", if status.is_charging_allowed { "yes" } else { "no" });
  print_stat("Current", &format!("{} A", status.ampere));
  print_stat("Phases", &status.phases.to_string());
  print_stat("Power", &format_watts(i64::from(status.total_power)));

  Ok(())
}
