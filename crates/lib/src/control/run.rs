use std::future::Future;

use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{info, warn};

use super::{Command, ControlError, Controller};
use crate::charger::{Charger, ChargerStatus};
use crate::meter::{MeterError, PowerSource};

/// Outcome of a single control cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
  pub available_power: i32,
  pub status: ChargerStatus,
  pub commands: Vec<Command>,
}

/// Serial reads block for up to the port timeout; keep them off the other tasks.
fn read_power<S: PowerSource>(meter: &mut S) -> Result<i32, MeterError> {
  match Handle::try_current().map(|handle| handle.runtime_flavor()) {
    Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(|| meter.available_power()),
    _ => meter.available_power(),
  }
}

/// Read the meter and the charger once, then apply the controller's commands.
pub async fn run_cycle<S, C>(controller: &mut Controller, meter: &mut S, charger: &C) -> Result<CycleReport, ControlError>
where
  S: PowerSource,
  C: Charger,
{
  let available_power = read_power(meter)?;
  let status = charger.status().await?;
  let commands = controller.decide(available_power, &status);

  for command in &commands {
    match *command {
      Command::SetAmpere(ampere) => charger.set_ampere(ampere).await?,
      Command::Wait(delay) => tokio::time::sleep(delay).await,
      Command::SetChargingAllowed(allowed) => charger.set_charging_allowed(allowed).await?,
    }
  }

  Ok(CycleReport {
    available_power,
    status,
    commands,
  })
}

/// Run control cycles every interval until `shutdown` resolves.
///
/// `shutdown` is polled before each cycle and while waiting on the charger or
/// the next tick. A failed cycle is logged and retried on the next tick.
pub async fn run<S, C, F>(mut controller: Controller, meter: &mut S, charger: &C, shutdown: F)
where
  S: PowerSource,
  C: Charger,
  F: Future<Output = ()>,
{
  tokio::pin!(shutdown);
  let interval = controller.interval();
  info!(interval_secs = interval.as_secs(), "starting control loop");

  loop {
    let result = tokio::select! {
      biased;
      _ = &mut shutdown => {
        info!("shutting down control loop");
        return;
      }
      result = run_cycle(&mut controller, meter, charger) => result,
    };

    match result {
      Ok(report) => info!(
        available_w = report.available_power,
        charging_status = ?report.status.charging_status,
        ampere = report.status.ampere,
        car_w = report.status.total_power,
        commands = ?report.commands,
        "control cycle complete"
      ),
      Err(err) => warn!(%err, "control cycle failed"),
    }

    tokio::select! {
      biased;
      _ = &mut shutdown => {
        info!("shutting down control loop");
        return;
      }
      _ = tokio::time::sleep(interval) => {}
    }
  }
}

#[cfg(test)]
mod tests {
  use std::collections::VecDeque;
  use std::sync::Mutex;
  use std::time::Duration;

  use super::*;
  use crate::charger::{ChargerError, ChargingStatus};
  use crate::config::{ChargerConfig, ControlConfig};

  struct FakeMeter(VecDeque<i32>);

  impl PowerSource for FakeMeter {
    fn available_power(&mut self) -> Result<i32, MeterError> {
      self.0.pop_front().ok_or(MeterError::EndOfStream)
    }
  }

  #[derive(Debug, Clone, PartialEq)]
  enum Call {
    Ampere(u8),
    Allowed(bool),
  }

  struct FakeCharger {
    status: Mutex<ChargerStatus>,
    calls: Mutex<Vec<Call>>,
  }

  impl FakeCharger {
    fn new(status: ChargerStatus) -> Self {
      Self {
        status: Mutex::new(status),
        calls: Mutex::new(Vec::new()),
      }
    }

    fn calls(&self) -> Vec<Call> {
      self.calls.lock().unwrap().clone()
    }
  }

  impl Charger for FakeCharger {
    async fn status(&self) -> Result<ChargerStatus, ChargerError> {
      Ok(self.status.lock().unwrap().clone())
    }

    async fn set_charging_allowed(&self, is_charging_allowed: bool) -> Result<(), ChargerError> {
      self.calls.lock().unwrap().push(Call::Allowed(is_charging_allowed));
      self.status.lock().unwrap().is_charging_allowed = is_charging_allowed;
      Ok(())
    }

    async fn set_ampere(&self, ampere: u8) -> Result<(), ChargerError> {
      self.calls.lock().unwrap().push(Call::Ampere(ampere));
      self.status.lock().unwrap().ampere = ampere;
      Ok(())
    }
  }

  fn waiting_car() -> ChargerStatus {
    ChargerStatus {
      charging_status: ChargingStatus::Waiting,
      ampere: 6,
      total_power: 0,
      is_charging_allowed: false,
      phases: 1,
    }
  }

  fn controller() -> Controller {
    Controller::new(ControlConfig::default(), &ChargerConfig::default())
  }

  #[tokio::test(start_paused = true)]
  async fn cycle_applies_commands_in_order() {
    let charger = FakeCharger::new(waiting_car());
    let mut meter = FakeMeter(VecDeque::from([2400]));
    let mut controller = controller();

    let started = tokio::time::Instant::now();
    let report = run_cycle(&mut controller, &mut meter, &charger).await.unwrap();

    assert_eq!(report.available_power, 2400);
    assert_eq!(charger.calls(), vec![Call::Ampere(10), Call::Allowed(true)]);
    assert!(started.elapsed() >= Duration::from_secs(5));
  }

  #[tokio::test]
  async fn meter_failure_aborts_cycle() {
    let charger = FakeCharger::new(waiting_car());
    let mut meter = FakeMeter(VecDeque::new());

    let result = run_cycle(&mut controller(), &mut meter, &charger).await;
    assert!(matches!(result, Err(ControlError::Meter(_))));
    assert!(charger.calls().is_empty());
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn cycle_reads_meter_on_multi_thread_runtime() {
    let charger = FakeCharger::new(waiting_car());
    let mut meter = FakeMeter(VecDeque::from([100]));

    let report = run_cycle(&mut controller(), &mut meter, &charger).await.unwrap();
    assert_eq!(report.available_power, 100);
    assert!(report.commands.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn loop_survives_failed_cycles_until_shutdown() {
    let charger = FakeCharger::new(waiting_car());
    // Only the first cycle gets a reading; the two after it fail.
    let mut meter = FakeMeter(VecDeque::from([0]));
    let shutdown = tokio::time::sleep(Duration::from_secs(150));

    run(controller(), &mut meter, &charger, shutdown).await;
    assert!(meter.0.is_empty());
    assert!(charger.calls().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn pending_shutdown_skips_first_cycle() {
    let charger = FakeCharger::new(waiting_car());
    let mut meter = FakeMeter(VecDeque::from([3000, 3000, 3000]));

    run(controller(), &mut meter, &charger, std::future::ready(())).await;

    assert_eq!(meter.0.len(), 3);
    assert!(charger.calls().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn shutdown_interrupts_enable_delay() {
    let charger = FakeCharger::new(waiting_car());
    let mut meter = FakeMeter(VecDeque::from([3000, 3000]));
    let shutdown = tokio::time::sleep(Duration::from_secs(2));

    run(controller(), &mut meter, &charger, shutdown).await;

    assert_eq!(meter.0.len(), 1);
    assert_eq!(charger.calls(), vec![Call::Ampere(13)]);
  }
}
