use super::DlmsError;
use super::cipher::{self, GENERAL_GLO_CIPHERING};
use super::data::Data;
use super::reader::Reader;
use crate::key::DecryptionKey;

const DATA_NOTIFICATION: u8 = 0x0F;
const OCTET_STRING: u8 = 0x09;

/// An xDLMS APDU pushed by a meter.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Apdu {
  DataNotification(DataNotification),
}

/// Unsolicited push of a set of register values.
#[derive(Debug, Clone, PartialEq)]
pub struct DataNotification {
  pub long_invoke_id_and_priority: u32,
  /// Raw COSEM date-time octets, absent when the meter sends none.
  pub date_time: Option<Vec<u8>>,
  pub body: Data,
}

impl Apdu {
  /// Parse an unencrypted APDU.
  pub fn parse(input: &[u8]) -> Result<Apdu, DlmsError> {
    let mut r = Reader::new(input);
    match r.u8()? {
      DATA_NOTIFICATION => Ok(Apdu::DataNotification(DataNotification::read(&mut r)?)),
      other => Err(DlmsError::UnsupportedApdu(other)),
    }
  }

  /// Parse a `general-glo-ciphering` APDU and the APDU it carries.
  pub fn parse_encrypted(input: &[u8], key: &DecryptionKey) -> Result<Apdu, DlmsError> {
    let mut r = Reader::new(input);
    match r.u8()? {
      GENERAL_GLO_CIPHERING => {
        let plain = cipher::decrypt(&mut r, key)?;
        Self::parse(&plain)
      }
      other => Err(DlmsError::UnsupportedApdu(other)),
    }
  }

  /// Encode as an unencrypted APDU.
  pub fn encode(&self) -> Vec<u8> {
    match self {
      Apdu::DataNotification(notification) => {
        let mut out = vec![DATA_NOTIFICATION];
        out.extend(notification.long_invoke_id_and_priority.to_be_bytes());
        match &notification.date_time {
          Some(date_time) if !date_time.is_empty() => {
            out.extend([OCTET_STRING, date_time.len() as u8]);
            out.extend(date_time);
          }
          _ => out.push(0x00),
        }
        notification.body.encode(&mut out);
        out
      }
    }
  }
}

impl DataNotification {
  fn read(r: &mut Reader<'_>) -> Result<Self, DlmsError> {
    let long_invoke_id_and_priority = r.u32()?;

    // Some meters encode the date-time as a tagged octet-string.
    let mut len = r.u8()?;
    if len == OCTET_STRING {
      len = r.u8()?;
    }
    let date_time = match len {
      0 => None,
      n => Some(r.take(usize::from(n))?.to_vec()),
    };

    let body = Data::read(r)?;
    Ok(Self {
      long_invoke_id_and_priority,
      date_time,
      body,
    })
  }
}
