//! Meter decryption key.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Length of an AES-128 key in bytes.
pub const KEY_LEN: usize = 16;

/// Errors parsing a hex-encoded key.
#[derive(Debug, Error)]
pub enum KeyError {
  #[error("invalid key format: {0}")]
  InvalidHex(#[from] hex::FromHexError),
}

/// The global unicast encryption key (GUEK) handed out by the grid operator.
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptionKey([u8; KEY_LEN]);

impl DecryptionKey {
  pub fn new(bytes: [u8; KEY_LEN]) -> Self {
    Self(bytes)
  }

  pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
    &self.0
  }
}

impl FromStr for DecryptionKey {
  type Err = KeyError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let bytes = <[u8; KEY_LEN] as hex::FromHex>::from_hex(s.trim())?;
    Ok(Self(bytes))
  }
}

impl From<[u8; KEY_LEN]> for DecryptionKey {
  fn from(bytes: [u8; KEY_LEN]) -> Self {
    Self(bytes)
  }
}

impl fmt::Debug for DecryptionKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("DecryptionKey(<redacted>)")
  }
}
