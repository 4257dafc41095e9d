//! Meter command implementation.
//!
//! Takes one or more readings, either live from the serial port or from a
//! capture file.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use meter2car_lib::meter::{Meter, PowerReading, SerialMeter};
use serde::Serialize;

use super::GlobalOptions;
use crate::output::{format_watts, print_info, print_json, print_stat};

#[derive(Serialize)]
struct ReadingOutput {
  #[serde(flatten)]
  reading: PowerReading,
  available_w: i32,
}

pub fn cmd_meter(options: &GlobalOptions, replay: Option<&Path>, count: usize) -> Result<()> {
  let config = options.load_config()?;
  let key = config.decryption_key()?;

  let mut take: Box<dyn FnMut() -> Result<PowerReading>> = match replay {
    Some(path) => {
      let file = File::open(path).with_context(|| format!("Failed to open capture {}", path.display()))?;
      let mut meter = Meter::replay(file, key, config.meter.layout());
      Box::new(move || meter.read_next().context("Failed to read meter capture"))
    }
    None => {
      let mut meter = SerialMeter::open(&config.meter, key)
        .with_context(|| format!("Failed to open meter on {}", config.meter.device))?;
      Box::new(move || meter.reading().context("Failed to read meter"))
    }
  };

  let mut readings = Vec::with_capacity(count);
  for _ in 0..count {
    let reading = take()?;
    readings.push(ReadingOutput {
      reading,
      available_w: reading.available_power(),
    });
  }

  if options.output.is_json() {
    return print_json(&readings);
  }

  for (i, output) in readings.iter().enumerate() {
    print_info(&format!("Reading {}", i + 1));
    print_stat("Import", &format_watts(i64::from(output.reading.import_w)));
    print_stat("Export", &format_watts(i64::from(output.reading.export_w)));
    print_stat("Available", &format_watts(i64::from(output.available_w)));
  }

  Ok(())
}
