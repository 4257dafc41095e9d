//! A-XDR encoded COSEM data.

use super::DlmsError;
use super::reader::{Reader, write_length};

/// A COSEM data value.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
  Null,
  Array(Vec<Data>),
  Structure(Vec<Data>),
  Boolean(bool),
  BitString(Vec<u8>),
  DoubleLong(i32),
  DoubleLongUnsigned(u32),
  OctetString(Vec<u8>),
  VisibleString(Vec<u8>),
  Utf8String(String),
  Integer(i8),
  Long(i16),
  Unsigned(u8),
  LongUnsigned(u16),
  Long64(i64),
  Long64Unsigned(u64),
  Enum(u8),
  Float32(f32),
  Float64(f64),
  DateTime([u8; 12]),
  Date([u8; 5]),
  Time([u8; 4]),
}

mod tag {
  pub const NULL: u8 = 0x00;
  pub const ARRAY: u8 = 0x01;
  pub const STRUCTURE: u8 = 0x02;
  pub const BOOLEAN: u8 = 0x03;
  pub const BIT_STRING: u8 = 0x04;
  pub const DOUBLE_LONG: u8 = 0x05;
  pub const DOUBLE_LONG_UNSIGNED: u8 = 0x06;
  pub const OCTET_STRING: u8 = 0x09;
  pub const VISIBLE_STRING: u8 = 0x0A;
  pub const UTF8_STRING: u8 = 0x0C;
  pub const INTEGER: u8 = 0x0F;
  pub const LONG: u8 = 0x10;
  pub const UNSIGNED: u8 = 0x11;
  pub const LONG_UNSIGNED: u8 = 0x12;
  pub const LONG64: u8 = 0x14;
  pub const LONG64_UNSIGNED: u8 = 0x15;
  pub const ENUM: u8 = 0x16;
  pub const FLOAT32: u8 = 0x17;
  pub const FLOAT64: u8 = 0x18;
  pub const DATE_TIME: u8 = 0x19;
  pub const DATE: u8 = 0x1A;
  pub const TIME: u8 = 0x1B;
}

impl Data {
  /// Decode one value from the start of `input`, returning the rest.
  pub fn parse(input: &[u8]) -> Result<(&[u8], Data), DlmsError> {
    let mut reader = Reader::new(input);
    let data = Self::read(&mut reader)?;
    Ok((reader.remaining(), data))
  }

  pub(super) fn read(r: &mut Reader<'_>) -> Result<Data, DlmsError> {
    let data = match r.u8()? {
      tag::NULL => Data::Null,
      tag::ARRAY => Data::Array(Self::read_items(r)?),
      tag::STRUCTURE => Data::Structure(Self::read_items(r)?),
      tag::BOOLEAN => Data::Boolean(r.u8()? != 0),
      tag::BIT_STRING => {
        let bits = r.length()?;
        Data::BitString(r.take(bits.div_ceil(8))?.to_vec())
      }
      tag::DOUBLE_LONG => Data::DoubleLong(i32::from_be_bytes(r.array()?)),
      tag::DOUBLE_LONG_UNSIGNED => Data::DoubleLongUnsigned(u32::from_be_bytes(r.array()?)),
      tag::OCTET_STRING => {
        let len = r.length()?;
        Data::OctetString(r.take(len)?.to_vec())
      }
      tag::VISIBLE_STRING => {
        let len = r.length()?;
        Data::VisibleString(r.take(len)?.to_vec())
      }
      tag::UTF8_STRING => {
        let len = r.length()?;
        Data::Utf8String(String::from_utf8_lossy(r.take(len)?).into_owned())
      }
      tag::INTEGER => Data::Integer(i8::from_be_bytes(r.array()?)),
      tag::LONG => Data::Long(i16::from_be_bytes(r.array()?)),
      tag::UNSIGNED => Data::Unsigned(r.u8()?),
      tag::LONG_UNSIGNED => Data::LongUnsigned(u16::from_be_bytes(r.array()?)),
      tag::LONG64 => Data::Long64(i64::from_be_bytes(r.array()?)),
      tag::LONG64_UNSIGNED => Data::Long64Unsigned(u64::from_be_bytes(r.array()?)),
      tag::ENUM => Data::Enum(r.u8()?),
      tag::FLOAT32 => Data::Float32(f32::from_be_bytes(r.array()?)),
      tag::FLOAT64 => Data::Float64(f64::from_be_bytes(r.array()?)),
      tag::DATE_TIME => Data::DateTime(r.array()?),
      tag::DATE => Data::Date(r.array()?),
      tag::TIME => Data::Time(r.array()?),
      other => return Err(DlmsError::UnsupportedData(other)),
    };
    Ok(data)
  }

  fn read_items(r: &mut Reader<'_>) -> Result<Vec<Data>, DlmsError> {
    let count = r.length()?;
    // Every item takes at least its tag byte.
    if count > r.remaining().len() {
      return Err(DlmsError::Incomplete(Some(count - r.remaining().len())));
    }
    (0..count).map(|_| Self::read(r)).collect()
  }

  /// Append the A-XDR encoding of this value to `out`.
  pub fn encode(&self, out: &mut Vec<u8>) {
    match self {
      Data::Null => out.push(tag::NULL),
      Data::Array(items) | Data::Structure(items) => {
        out.push(if matches!(self, Data::Array(_)) { tag::ARRAY } else { tag::STRUCTURE });
        write_length(out, items.len());
        for item in items {
          item.encode(out);
        }
      }
      Data::Boolean(value) => out.extend([tag::BOOLEAN, u8::from(*value)]),
      Data::BitString(bytes) => {
        out.push(tag::BIT_STRING);
        write_length(out, bytes.len() * 8);
        out.extend(bytes);
      }
      Data::DoubleLong(value) => encode_fixed(out, tag::DOUBLE_LONG, &value.to_be_bytes()),
      Data::DoubleLongUnsigned(value) => encode_fixed(out, tag::DOUBLE_LONG_UNSIGNED, &value.to_be_bytes()),
      Data::OctetString(bytes) => encode_var(out, tag::OCTET_STRING, bytes),
      Data::VisibleString(bytes) => encode_var(out, tag::VISIBLE_STRING, bytes),
      Data::Utf8String(text) => encode_var(out, tag::UTF8_STRING, text.as_bytes()),
      Data::Integer(value) => encode_fixed(out, tag::INTEGER, &value.to_be_bytes()),
      Data::Long(value) => encode_fixed(out, tag::LONG, &value.to_be_bytes()),
      Data::Unsigned(value) => out.extend([tag::UNSIGNED, *value]),
      Data::LongUnsigned(value) => encode_fixed(out, tag::LONG_UNSIGNED, &value.to_be_bytes()),
      Data::Long64(value) => encode_fixed(out, tag::LONG64, &value.to_be_bytes()),
      Data::Long64Unsigned(value) => encode_fixed(out, tag::LONG64_UNSIGNED, &value.to_be_bytes()),
      Data::Enum(value) => out.extend([tag::ENUM, *value]),
      Data::Float32(value) => encode_fixed(out, tag::FLOAT32, &value.to_be_bytes()),
      Data::Float64(value) => encode_fixed(out, tag::FLOAT64, &value.to_be_bytes()),
      Data::DateTime(bytes) => encode_fixed(out, tag::DATE_TIME, bytes),
      Data::Date(bytes) => encode_fixed(out, tag::DATE, bytes),
      Data::Time(bytes) => encode_fixed(out, tag::TIME, bytes),
    }
  }
}

fn encode_fixed(out: &mut Vec<u8>, tag: u8, bytes: &[u8]) {
  out.push(tag);
  out.extend_from_slice(bytes);
}

fn encode_var(out: &mut Vec<u8>, tag: u8, bytes: &[u8]) {
  out.push(tag);
  write_length(out, bytes.len());
  out.extend_from_slice(bytes);
}
