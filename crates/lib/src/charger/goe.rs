//! go-e Charger HTTP API (v1).
//!
//! Status is read from `GET /status`; settings are changed through
//! `GET /mqtt?payload=<key>=<value>`.

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::{Charger, ChargerError, ChargerStatus};
use crate::config::ChargerConfig;

#[derive(Debug, Clone)]
pub struct GoE {
  url: Url,
  client: Client,
  min_ampere: u8,
  max_ampere: u8,
}

impl GoE {
  pub fn from_config(config: &ChargerConfig) -> Result<Self, ChargerError> {
    let url = config.url.as_deref().ok_or(ChargerError::MissingUrl)?;
    let client = Client::builder()
      .timeout(config.timeout())
      .build()
      .map_err(ChargerError::Client)?;
    let mut url = Url::parse(url).map_err(|source| ChargerError::InvalidUrl {
      url: url.to_string(),
      source,
    })?;

    // Endpoints are joined relative to the base, which must end in a slash.
    if !url.path().ends_with('/') {
      let path = format!("{}/", url.path());
      url.set_path(&path);
    }

    Ok(Self {
      url,
      client,
      min_ampere: config.min_ampere,
      max_ampere: config.max_ampere,
    })
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  pub fn clamp_ampere(&self, ampere: u8) -> u8 {
    ampere.clamp(self.min_ampere, self.max_ampere)
  }

  fn endpoint(&self, path: &str) -> Result<Url, ChargerError> {
    self.url.join(path).map_err(|source| ChargerError::InvalidUrl {
      url: format!("{}{}", self.url, path),
      source,
    })
  }

  async fn send_message(&self, payload: &str) -> Result<(), ChargerError> {
    let mut url = self.endpoint("mqtt")?;
    url.set_query(Some(&format!("payload={}", payload)));
    debug!(%url, "sending charger command");

    let response = self
      .client
      .get(url.clone())
      .send()
      .await
      .map_err(|source| ChargerError::Request {
        url: url.to_string(),
        source,
      })?;

    if response.status().is_success() {
      Ok(())
    } else {
      Err(ChargerError::FailedRequest(response.status()))
    }
  }
}

impl Charger for GoE {
  async fn status(&self) -> Result<ChargerStatus, ChargerError> {
    let url = self.endpoint("status")?;
    let request_error = |source| ChargerError::Request {
      url: url.to_string(),
      source,
    };

    let response = self.client.get(url.clone()).send().await.map_err(request_error)?;
    if !response.status().is_success() {
      return Err(ChargerError::FailedRequest(response.status()));
    }
    let json: Value = response.json().await.map_err(request_error)?;

    let status = ChargerStatus::from_json(&json).ok_or(ChargerError::InvalidStatusJson)?;
    debug!(?status, "charger status");
    Ok(status)
  }

  async fn set_charging_allowed(&self, is_charging_allowed: bool) -> Result<(), ChargerError> {
    info!(is_charging_allowed, "switching charging");
    let payload = if is_charging_allowed { "alw=1" } else { "alw=0" };
    self.send_message(payload).await
  }

  async fn set_ampere(&self, ampere: u8) -> Result<(), ChargerError> {
    let ampere = self.clamp_ampere(ampere);
    info!(ampere, "setting charging current");
    self.send_message(&format!("amx={}", ampere)).await
  }
}
