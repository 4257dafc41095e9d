//! Smart meter reader.
//!
//! The meter pushes an encrypted DLMS data notification over its customer
//! interface while the data-request line is held high. [`Meter`] raises the
//! line, collects the HDLC frame(s), decrypts the payload and extracts the
//! active power registers.

mod port;
mod trigger;

pub use port::{MeterPort, SerialMeter, open_serial};
pub use trigger::{NoopPin, TriggerPin, open_trigger_pin};
#[cfg(feature = "gpio")]
pub use trigger::GpioPin;

use std::fmt;
use std::io::{self, Read};
use std::num::NonZeroUsize;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::dlms::{Apdu, Data, DlmsError};
use crate::hdlc::{self, HdlcError};
use crate::key::DecryptionKey;

/// Bytes read while looking for one frame before giving up: four frames of
/// the largest length the format field can express.
const MAX_SCAN_BYTES: usize = 4 * (0x07FF + 2);

/// Errors that can occur while reading the meter.
#[derive(Debug, Error)]
pub enum MeterError {
  #[error("serial port error: {0}")]
  SerialPort(#[from] serialport::Error),

  #[cfg(feature = "gpio")]
  #[error("gpio error: {0}")]
  Gpio(#[from] rppal::gpio::Error),

  #[error("trigger pin {0} is configured but GPIO support is not compiled in")]
  GpioUnavailable(u8),

  #[error("io error: {0}")]
  Io(#[from] io::Error),

  #[error("meter stopped sending data")]
  EndOfStream,

  #[error("no valid frame within {0} bytes")]
  NoFrame(usize),

  #[error("failed to decode APDU: {0}")]
  Dlms(#[from] DlmsError),

  #[error("invalid apdu format")]
  InvalidApduFormat,

  #[error("notification has no register at index {0}")]
  MissingField(usize),
}

/// Which of the notification's `double-long-unsigned` registers hold the
/// active power. Other value types are skipped when counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingLayout {
  pub import_index: usize,
  pub export_index: usize,
}

impl Default for ReadingLayout {
  /// Register order of the Kaifa/Sagemcom meters used by Austrian grid
  /// operators: energy +A, -A, +R, -R, then power +P, -P.
  fn default() -> Self {
    Self {
      import_index: 4,
      export_index: 5,
    }
  }
}

/// Instantaneous active power at the grid connection point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PowerReading {
  /// Power drawn from the grid in W.
  pub import_w: u32,
  /// Power fed into the grid in W.
  pub export_w: u32,
}

impl PowerReading {
  /// Surplus power in W; negative while drawing from the grid.
  pub fn available_power(&self) -> i32 {
    (i64::from(self.export_w) - i64::from(self.import_w)).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
  }
}

/// Anything that reports the current surplus power.
pub trait PowerSource {
  fn available_power(&mut self) -> Result<i32, MeterError>;
}

pub struct Meter<R, P> {
  port: R,
  pin: P,
  key: DecryptionKey,
  layout: ReadingLayout,
  buffer: Vec<u8>,
}

impl<R: MeterPort, P: TriggerPin> Meter<R, P> {
  pub fn new(port: R, pin: P, key: DecryptionKey, layout: ReadingLayout) -> Self {
    Self {
      port,
      pin,
      key,
      layout,
      buffer: Vec::new(),
    }
  }

  /// Request and read a fresh reading.
  ///
  /// Stale input is discarded first so the reading reflects the moment of the
  /// request. The data-request line is lowered again even if reading fails.
  pub fn reading(&mut self) -> Result<PowerReading, MeterError> {
    self.buffer.clear();
    self.port.clear_input()?;
    self.pin.set_high();
    let result = self.read_next();
    self.pin.set_low();
    result
  }

  /// Read the next notification from the port without triggering the meter.
  pub fn read_next(&mut self) -> Result<PowerReading, MeterError> {
    let information = self.read_information()?;
    let Apdu::DataNotification(notification) = Apdu::parse_encrypted(&information, &self.key)?;
    let reading = extract_reading(&notification.body, self.layout)?;
    debug!(
      import_w = reading.import_w,
      export_w = reading.export_w,
      available_w = reading.available_power(),
      "meter reading"
    );
    Ok(reading)
  }

  /// Collect the information field of one logical frame, joining segments.
  fn read_information(&mut self) -> Result<Vec<u8>, MeterError> {
    let mut information = Vec::new();
    let mut continuation = false;
    loop {
      let (segment, segmented) = self.read_frame(continuation)?;
      information.extend(segment);
      if !segmented {
        return Ok(information);
      }
      trace!(len = information.len(), "awaiting next segment");
      continuation = true;
    }
  }

  fn read_frame(&mut self, continuation: bool) -> Result<(Vec<u8>, bool), MeterError> {
    let mut bytes_needed = 0;
    let mut scanned = 0;
    loop {
      if bytes_needed > 0 {
        if scanned >= MAX_SCAN_BYTES {
          return Err(MeterError::NoFrame(MAX_SCAN_BYTES));
        }
        let read = (&mut self.port)
          .take(bytes_needed as u64)
          .read_to_end(&mut self.buffer)?;
        if read == 0 {
          return Err(MeterError::EndOfStream);
        }
        scanned += read;
      }

      self.drop_repeated_flags();
      match hdlc::parse(&self.buffer, continuation) {
        Ok((rest, frame)) => {
          // The closing flag may double as the opening flag of the next frame.
          let consumed = self.buffer.len() - rest.len() - 1;
          let segment = (frame.information.to_vec(), frame.segmented);
          self.buffer.drain(..consumed);
          return Ok(segment);
        }
        Err(HdlcError::Incomplete(needed)) => {
          bytes_needed = needed.map_or(1, NonZeroUsize::get);
        }
        Err(err) => {
          debug!(%err, buffered = self.buffer.len(), "resynchronizing on next frame flag");
          self.skip_to_next_flag();
          bytes_needed = 0;
        }
      }
    }
  }

  /// Collapse a run of flags at the start of the buffer into one.
  fn drop_repeated_flags(&mut self) {
    let repeated = self
      .buffer
      .windows(2)
      .take_while(|pair| *pair == [hdlc::FLAG; 2])
      .count();
    self.buffer.drain(..repeated);
  }

  /// Drop the current start byte and everything up to the next flag.
  fn skip_to_next_flag(&mut self) {
    let skip = self
      .buffer
      .iter()
      .skip(1)
      .position(|&b| b == hdlc::FLAG)
      .map_or(self.buffer.len(), |pos| pos + 1);
    self.buffer.drain(..skip);
  }
}

impl<R: MeterPort, P: TriggerPin> PowerSource for Meter<R, P> {
  fn available_power(&mut self) -> Result<i32, MeterError> {
    Ok(self.reading()?.available_power())
  }
}

impl<R, P> fmt::Debug for Meter<R, P> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Meter")
      .field("key", &self.key)
      .field("layout", &self.layout)
      .field("buffered", &self.buffer.len())
      .finish_non_exhaustive()
  }
}

fn extract_reading(body: &Data, layout: ReadingLayout) -> Result<PowerReading, MeterError> {
  let Data::Structure(items) = body else {
    return Err(MeterError::InvalidApduFormat);
  };

  let registers: Vec<u32> = items
    .iter()
    .filter_map(|item| match item {
      Data::DoubleLongUnsigned(value) => Some(*value),
      _ => None,
    })
    .collect();
  let register = |index: usize| registers.get(index).copied().ok_or(MeterError::MissingField(index));

  Ok(PowerReading {
    import_w: register(layout.import_index)?,
    export_w: register(layout.export_index)?,
  })
}

#[cfg(test)]
pub(crate) mod testutil {
  use std::io::Cursor;

  use crate::dlms::{Apdu, Data, DataNotification, encode_encrypted};
  use crate::hdlc::{self, HdlcFrame};
  use crate::key::DecryptionKey;

  pub const KEY: [u8; 16] = [0x5A; 16];

  /// Structure laid out like an EVN push: timestamp, six registers, voltages.
  pub fn evn_body(import_w: u32, export_w: u32) -> Data {
    Data::Structure(vec![
      Data::OctetString(vec![0x07, 0xE8, 0x05, 0x11, 0x05, 0x0C, 0x1E, 0x00, 0x00, 0x80, 0x00, 0x00]),
      Data::DoubleLongUnsigned(1_234_567),
      Data::DoubleLongUnsigned(7_654_321),
      Data::DoubleLongUnsigned(100),
      Data::DoubleLongUnsigned(200),
      Data::DoubleLongUnsigned(import_w),
      Data::DoubleLongUnsigned(export_w),
      Data::LongUnsigned(2301),
      Data::LongUnsigned(2298),
    ])
  }

  pub fn encrypted_information(body: Data) -> Vec<u8> {
    let apdu = Apdu::DataNotification(DataNotification {
      long_invoke_id_and_priority: 1,
      date_time: None,
      body,
    });
    encode_encrypted(&DecryptionKey::new(KEY), *b"KFM\x10\x20\x00\x91\xA2", 7, &apdu.encode())
  }

  pub fn frame(information: &[u8], segmented: bool, continuation: bool) -> Vec<u8> {
    hdlc::encode(
      &HdlcFrame {
        dest_address: 0x10,
        src_address: 0x01,
        control: 0x13,
        segmented,
        information,
      },
      continuation,
    )
  }

  pub fn push(import_w: u32, export_w: u32) -> Vec<u8> {
    frame(&encrypted_information(evn_body(import_w, export_w)), false, false)
  }

  pub fn cursor(bytes: Vec<u8>) -> Cursor<Vec<u8>> {
    Cursor::new(bytes)
  }
}
