use std::fs::File;
use std::io::{self, Cursor};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use tracing::info;

use super::{Meter, MeterError, ReadingLayout, TriggerPin, open_trigger_pin};
use crate::config::MeterConfig;
use crate::key::DecryptionKey;

/// Byte source the meter pushes its frames into.
pub trait MeterPort: io::Read {
  /// Discard input received but not yet read.
  fn clear_input(&mut self) -> io::Result<()> {
    Ok(())
  }
}

impl MeterPort for Box<dyn SerialPort> {
  fn clear_input(&mut self) -> io::Result<()> {
    self.clear(ClearBuffer::Input).map_err(io::Error::from)
  }
}

/// Recorded captures are replayed as-is.
impl MeterPort for File {}

impl<T: AsRef<[u8]>> MeterPort for Cursor<T> {}

/// A meter on a local serial port.
pub type SerialMeter = Meter<Box<dyn SerialPort>, Box<dyn TriggerPin + Send>>;

/// Open the meter's customer interface: 8 data bits, no parity, one stop bit.
pub fn open_serial(device: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialPort>, MeterError> {
  let port = serialport::new(device, baud_rate)
    .parity(Parity::None)
    .data_bits(DataBits::Eight)
    .stop_bits(StopBits::One)
    .timeout(timeout)
    .open()?;
  info!(device, baud_rate, "opened meter serial port");
  Ok(port)
}

impl SerialMeter {
  pub fn open(config: &MeterConfig, key: DecryptionKey) -> Result<Self, MeterError> {
    let port = open_serial(&config.device, config.baud_rate, config.timeout())?;
    let pin = open_trigger_pin(config.trigger_pin)?;
    Ok(Meter::new(port, pin, key, config.layout()))
  }
}

impl Meter<File, Box<dyn TriggerPin + Send>> {
  /// Read frames from a capture file instead of a live port.
  pub fn replay(file: File, key: DecryptionKey, layout: ReadingLayout) -> Self {
    Meter::new(file, Box::new(super::NoopPin), key, layout)
  }
}
