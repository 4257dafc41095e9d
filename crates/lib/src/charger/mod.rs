//! Wallbox status and control.

mod goe;

pub use goe::GoE;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors talking to the charger.
#[derive(Debug, Error)]
pub enum ChargerError {
  /// No charger URL was configured.
  #[error("no charger url configured")]
  MissingUrl,

  #[error("invalid charger url '{url}': {source}")]
  InvalidUrl {
    url: String,
    #[source]
    source: url::ParseError,
  },

  #[error("failed to build http client: {0}")]
  Client(#[source] reqwest::Error),

  #[error("request to {url} failed: {source}")]
  Request {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("invalid JSON status")]
  InvalidStatusJson,

  #[error("charger rejected request with HTTP {0}")]
  FailedRequest(reqwest::StatusCode),
}

/// Vehicle state reported in the `car` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargingStatus {
  /// No car connected.
  Ready,
  Charging,
  /// Car connected, waiting for it or for the charger to release power.
  Waiting,
  /// Charge finished, car still connected.
  Finished,
}

impl ChargingStatus {
  pub fn from_car(car: u64) -> Option<Self> {
    match car {
      1 => Some(ChargingStatus::Ready),
      2 => Some(ChargingStatus::Charging),
      3 => Some(ChargingStatus::Waiting),
      4 => Some(ChargingStatus::Finished),
      _ => None,
    }
  }

  /// A car is plugged in and could take power.
  pub fn is_car_waiting(self) -> bool {
    matches!(self, ChargingStatus::Waiting | ChargingStatus::Finished)
  }
}

/// Snapshot of the charger state relevant for surplus charging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargerStatus {
  pub charging_status: ChargingStatus,
  /// Currently requested charging current in A.
  pub ampere: u8,
  /// Power delivered to the car in W.
  pub total_power: u32,
  pub is_charging_allowed: bool,
  /// Number of phases switched through to the car.
  pub phases: u8,
}

/// The go-e API reports most numbers as decimal strings.
fn num_from_value(value: &Value) -> Option<u64> {
  match value {
    Value::Number(num) => num.as_u64(),
    Value::String(num_str) => num_str.trim().parse().ok(),
    _ => None,
  }
}

fn get_num(map: &Map<String, Value>, key: &str) -> Option<u64> {
  num_from_value(map.get(key)?)
}

impl ChargerStatus {
  /// Index of the total power (in 0.01 kW) within the `nrg` array.
  const NRG_TOTAL_POWER: usize = 11;

  /// Parse the `/status` response of the go-e API v1.
  pub fn from_json(json: &Value) -> Option<Self> {
    let map = json.as_object()?;
    let car = get_num(map, "car")?;
    let amp = u8::try_from(get_num(map, "amp")?).ok()?;
    let pha = get_num(map, "pha")?;
    let alw = get_num(map, "alw")?;
    let nrg = map.get("nrg")?.as_array()?;
    let ptot = num_from_value(nrg.get(Self::NRG_TOTAL_POWER)?)?;

    // Bits 3-5 flag the phases available after the contactor.
    let phases = if (pha & 0xF8) == 0x38 { 3 } else { 1 };

    Some(Self {
      charging_status: ChargingStatus::from_car(car)?,
      ampere: amp,
      total_power: u32::try_from(ptot.saturating_mul(10)).ok()?,
      is_charging_allowed: alw > 0,
      phases,
    })
  }
}

/// A wallbox the controller can steer.
#[allow(async_fn_in_trait)]
pub trait Charger {
  async fn status(&self) -> Result<ChargerStatus, ChargerError>;

  async fn set_charging_allowed(&self, is_charging_allowed: bool) -> Result<(), ChargerError>;

  /// Request a charging current; implementations clamp to their limits.
  async fn set_ampere(&self, ampere: u8) -> Result<(), ChargerError>;
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn nrg(total_power: u64) -> Value {
    let mut values = vec![json!(0); 16];
    values[11] = json!(total_power);
    Value::Array(values)
  }

  #[test]
  fn parses_string_encoded_fields() {
    let status = ChargerStatus::from_json(&json!({
      "car": "2",
      "amp": "10",
      "pha": "63",
      "alw": "1",
      "nrg": nrg(690),
    }))
    .unwrap();

    assert_eq!(
      status,
      ChargerStatus {
        charging_status: ChargingStatus::Charging,
        ampere: 10,
        total_power: 6900,
        is_charging_allowed: true,
        phases: 3,
      }
    );
  }

  #[test]
  fn parses_numeric_fields() {
    let status = ChargerStatus::from_json(&json!({
      "car": 4, "amp": 6, "pha": 9, "alw": 0, "nrg": nrg(0),
    }))
    .unwrap();

    assert_eq!(status.charging_status, ChargingStatus::Finished);
    assert!(!status.is_charging_allowed);
    assert_eq!(status.phases, 1);
  }

  #[test]
  fn missing_field_is_rejected() {
    assert_eq!(
      ChargerStatus::from_json(&json!({ "car": "1", "amp": "6", "pha": "8", "nrg": nrg(0) })),
      None
    );
  }

  #[test]
  fn short_energy_array_is_rejected() {
    assert_eq!(
      ChargerStatus::from_json(&json!({ "car": "1", "amp": "6", "pha": "8", "alw": "0", "nrg": [1, 2, 3] })),
      None
    );
  }

  #[test]
  fn unknown_car_state_is_rejected() {
    assert_eq!(
      ChargerStatus::from_json(&json!({ "car": "9", "amp": "6", "pha": "8", "alw": "0", "nrg": nrg(0) })),
      None
    );
  }

  #[test]
  fn non_object_is_rejected() {
    assert_eq!(ChargerStatus::from_json(&json!([1, 2])), None);
  }

  #[test]
  fn waiting_states() {
    assert!(ChargingStatus::Waiting.is_car_waiting());
    assert!(ChargingStatus::Finished.is_car_waiting());
    assert!(!ChargingStatus::Ready.is_car_waiting());
    assert!(!ChargingStatus::Charging.is_car_waiting());
  }
}
