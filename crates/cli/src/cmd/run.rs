//! Run command implementation.
//!
//! Opens the meter and the charger and runs the control loop until Ctrl-C.

use anyhow::{Context, Result};
use meter2car_lib::control::{self, Controller};
use meter2car_lib::meter::SerialMeter;
use tracing::{info, warn};

use super::GlobalOptions;
use crate::output::print_success;

pub async fn cmd_run(options: &GlobalOptions) -> Result<()> {
  let config = options.load_config()?;
  let key = config.decryption_key()?;
  let charger = options.charger(&config)?;

  let mut meter = SerialMeter::open(&config.meter, key)
    .with_context(|| format!("Failed to open meter on {}", config.meter.device))?;
  if config.meter.trigger_pin.is_none() {
    info!("no trigger pin configured, expecting unsolicited pushes");
  }

  info!(charger = %charger.url(), device = %config.meter.device, "starting meter2car");
  let controller = Controller::new(config.control.clone(), &config.charger);

  let shutdown = async {
    if let Err(err) = tokio::signal::ctrl_c().await {
      warn!(%err, "failed to listen for Ctrl-C");
      std::future::pending::<()>().await;
    }
  };

  control::run(controller, &mut meter, &charger, shutdown).await;

  print_success("Stopped");
  Ok(())
}
