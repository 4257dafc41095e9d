use tracing::debug;

use super::MeterError;

/// Output line that asks the meter to push a reading while high.
pub trait TriggerPin {
  fn set_high(&mut self);
  fn set_low(&mut self);
}

impl<P: TriggerPin + ?Sized> TriggerPin for Box<P> {
  fn set_high(&mut self) {
    (**self).set_high();
  }

  fn set_low(&mut self) {
    (**self).set_low();
  }
}

/// For meters that push unsolicited, or when the request line is hard-wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPin;

impl TriggerPin for NoopPin {
  fn set_high(&mut self) {}

  fn set_low(&mut self) {}
}

#[cfg(feature = "gpio")]
#[derive(Debug)]
pub struct GpioPin(rppal::gpio::OutputPin);

#[cfg(feature = "gpio")]
impl GpioPin {
  /// Claim a BCM-numbered pin as a low output.
  pub fn open(pin: u8) -> Result<Self, MeterError> {
    let gpio = rppal::gpio::Gpio::new()?;
    let pin = gpio.get(pin)?.into_output_low();
    Ok(Self(pin))
  }
}

#[cfg(feature = "gpio")]
impl TriggerPin for GpioPin {
  fn set_high(&mut self) {
    self.0.set_high();
  }

  fn set_low(&mut self) {
    self.0.set_low();
  }
}

/// Resolve the configured trigger pin; `None` means the meter pushes on its own.
pub fn open_trigger_pin(pin: Option<u8>) -> Result<Box<dyn TriggerPin + Send>, MeterError> {
  match pin {
    None => Ok(Box::new(NoopPin)),
    #[cfg(feature = "gpio")]
    Some(pin) => {
      debug!(pin, "claiming data request pin");
      Ok(Box::new(GpioPin::open(pin)?))
    }
    #[cfg(not(feature = "gpio"))]
    Some(pin) => {
      debug!(pin, "gpio support disabled");
      Err(MeterError::GpioUnavailable(pin))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn no_pin_needs_no_gpio() {
    assert!(open_trigger_pin(None).is_ok());
  }
}
