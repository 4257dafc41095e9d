//! Surplus charging controller.
//!
//! Each cycle the controller looks at the power the house currently feeds
//! into the grid and at the charger state, and decides which commands to send:
//!
//! - While charging is forbidden, the surplus is averaged. Once the average
//!   exceeds the turn-on threshold and a car is waiting, the matching current is
//!   set and charging is released.
//! - While charging, the power available to the car (surplus plus what the car
//!   already draws) is averaged and the current follows it. Every few cycles the
//!   average is checked against the turn-off threshold and charging is stopped
//!   if it fell below.

mod run;

pub use run::{CycleReport, run, run_cycle};

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::average::RunningAverage;
use crate::charger::{ChargerError, ChargerStatus, ChargingStatus};
use crate::config::{ChargerConfig, ControlConfig};
use crate::meter::MeterError;

/// Number of cycles averaged before acting on a power value.
pub const AVERAGE_WINDOW: usize = 5;

#[derive(Debug, Error)]
pub enum ControlError {
  #[error("failed to read meter: {0}")]
  Meter(#[from] MeterError),

  #[error("charger error: {0}")]
  Charger(#[from] ChargerError),
}

/// An action for the charger, executed in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
  SetAmpere(u8),
  Wait(Duration),
  SetChargingAllowed(bool),
}

#[derive(Debug, Clone)]
pub struct Controller {
  config: ControlConfig,
  min_ampere: u8,
  max_ampere: u8,
  turn_off_counter: u32,
  power_for_car: RunningAverage<AVERAGE_WINDOW>,
  available_power: RunningAverage<AVERAGE_WINDOW>,
}

impl Controller {
  pub fn new(config: ControlConfig, charger: &ChargerConfig) -> Self {
    Self {
      config,
      min_ampere: charger.min_ampere,
      max_ampere: charger.max_ampere,
      turn_off_counter: 0,
      power_for_car: RunningAverage::new(),
      available_power: RunningAverage::new(),
    }
  }

  pub fn interval(&self) -> Duration {
    self.config.interval()
  }

  /// Current that `power` W allow on `phases` phases, clamped to the charger limits.
  fn ampere_for(&self, power: i64, phases: i64) -> u8 {
    let desired = power / (self.config.volts_per_phase * phases);
    let ampere = desired.clamp(i64::from(self.min_ampere), i64::from(self.max_ampere));
    if ampere != desired {
      debug!(desired, ampere, "desired current outside charger limits");
    }
    ampere as u8
  }

  /// Decide on the commands for one cycle.
  pub fn decide(&mut self, available_power: i32, status: &ChargerStatus) -> Vec<Command> {
    let phases = i64::from(status.phases.max(1));
    let mut commands = Vec::new();

    if status.is_charging_allowed {
      if status.charging_status == ChargingStatus::Charging {
        self.power_for_car.add(i64::from(available_power) + i64::from(status.total_power));
        let average = self.power_for_car.average();
        let threshold = self.config.turn_off_threshold_w * phases;
        debug!(
          average_w = average,
          threshold_w = threshold,
          turn_off_counter = self.turn_off_counter,
          "power for car"
        );

        if self.turn_off_counter >= self.config.turn_off_after_cycles {
          self.turn_off_counter = 0;
          if average < threshold {
            info!(average_w = average, threshold_w = threshold, "surplus too low, disabling charging");
            self.power_for_car.reset();
            commands.push(Command::SetChargingAllowed(false));
          }
        }

        if commands.is_empty() {
          let ampere = self.ampere_for(average, phases);
          if ampere != status.ampere {
            commands.push(Command::SetAmpere(ampere));
          }
        }
      }
    } else {
      self.available_power.add(i64::from(available_power));
      let average = self.available_power.average();
      let threshold = self.config.turn_on_threshold_w * phases;
      debug!(average_w = average, threshold_w = threshold, "average available power");

      if status.charging_status.is_car_waiting() && average > threshold {
        let ampere = self.ampere_for(average, phases);
        info!(average_w = average, ampere, "enabling charging");
        commands.extend([
          Command::SetAmpere(ampere),
          Command::Wait(self.config.enable_delay()),
          Command::SetChargingAllowed(true),
        ]);
      }
    }

    self.turn_off_counter += 1;
    commands
  }
}
