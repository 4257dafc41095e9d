//! HDLC frame codec (frame format type 3, IEC 62056-46).
//!
//! Smart meters push their data notifications wrapped in HDLC frames:
//!
//! ```text
//! 7E | A0 LL | dest addr | src addr | ctrl | HCS | E6 E7 00 | information | FCS | 7E
//! ```
//!
//! The frame length in the format field counts everything between the two
//! flags. HCS and FCS are CRC-16/X.25 checksums, transmitted low byte first.

use std::num::NonZeroUsize;

use crc::{CRC_16_IBM_SDLC, Crc};
use thiserror::Error;

/// Opening and closing flag of every frame.
pub const FLAG: u8 = 0x7E;

const CHECKSUM: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// Errors produced while parsing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HdlcError {
  /// The input ends before the frame does.
  #[error("incomplete frame")]
  Incomplete(Option<NonZeroUsize>),

  /// The input does not start with the `0x7E` flag.
  #[error("frame does not start with the 0x7E flag")]
  InvalidStartCharacter,

  /// The format field, frame length or closing flag is malformed.
  #[error("invalid frame format")]
  InvalidFormat,

  /// HCS or FCS does not match the frame content.
  #[error("frame checksum mismatch")]
  InvalidChecksum,

  /// An address field is not 1, 2 or 4 bytes long.
  #[error("invalid address field")]
  InvalidAddress,

  /// The information field of a first segment lacks the LLC header.
  #[error("invalid LLC header")]
  InvalidLlcHeader,
}

/// A parsed frame borrowing its information field from the input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdlcFrame<'a> {
  pub dest_address: u32,
  pub src_address: u32,
  pub control: u8,
  /// More segments of the same frame follow.
  pub segmented: bool,
  /// Information field with the LLC header removed.
  pub information: &'a [u8],
}

fn incomplete(needed: usize) -> HdlcError {
  HdlcError::Incomplete(NonZeroUsize::new(needed))
}

/// Parse a single frame from the start of `input`.
///
/// `continuation` marks the frame as a follow-up segment, which carries no LLC
/// header. On success, returns the unconsumed rest of the input and the frame.
pub fn parse(input: &[u8], continuation: bool) -> Result<(&[u8], HdlcFrame<'_>), HdlcError> {
  match input.first() {
    None => return Err(incomplete(1)),
    Some(&FLAG) => {}
    Some(_) => return Err(HdlcError::InvalidStartCharacter),
  }

  if input.len() < 3 {
    return Err(incomplete(3 - input.len()));
  }

  let format = u16::from_be_bytes([input[1], input[2]]);
  if format >> 12 != 0xA {
    return Err(HdlcError::InvalidFormat);
  }
  let segmented = format & 0x0800 != 0;
  let frame_len = usize::from(format & 0x07FF);

  // format (2) + dest (1) + src (1) + control (1) + FCS (2)
  if frame_len < 7 {
    return Err(HdlcError::InvalidFormat);
  }

  let total_len = frame_len + 2;
  if input.len() < total_len {
    return Err(incomplete(total_len - input.len()));
  }

  let frame = &input[1..=frame_len];
  if input[frame_len + 1] != FLAG {
    return Err(HdlcError::InvalidFormat);
  }

  let (dest_address, dest_len) = parse_address(&frame[2..])?;
  let (src_address, src_len) = parse_address(&frame[2 + dest_len..])?;
  let control_pos = 2 + dest_len + src_len;
  if control_pos + 3 > frame.len() {
    return Err(HdlcError::InvalidFormat);
  }
  let control = frame[control_pos];

  let (body, fcs) = frame.split_at(frame.len() - 2);
  if CHECKSUM.checksum(body) != u16::from_le_bytes([fcs[0], fcs[1]]) {
    return Err(HdlcError::InvalidChecksum);
  }

  let header_end = control_pos + 1;
  let information = if body.len() == header_end {
    &[][..]
  } else {
    if body.len() < header_end + 2 {
      return Err(HdlcError::InvalidFormat);
    }
    let hcs = &body[header_end..header_end + 2];
    if CHECKSUM.checksum(&body[..header_end]) != u16::from_le_bytes([hcs[0], hcs[1]]) {
      return Err(HdlcError::InvalidChecksum);
    }
    &body[header_end + 2..]
  };

  let information = if continuation || information.is_empty() {
    information
  } else {
    strip_llc_header(information)?
  };

  Ok((
    &input[total_len..],
    HdlcFrame {
      dest_address,
      src_address,
      control,
      segmented,
      information,
    },
  ))
}

/// Decode an address field; the last byte has its low bit set.
fn parse_address(input: &[u8]) -> Result<(u32, usize), HdlcError> {
  let len = input
    .iter()
    .take(4)
    .position(|b| b & 1 == 1)
    .map(|pos| pos + 1)
    .ok_or(HdlcError::InvalidAddress)?;

  if len == 3 {
    return Err(HdlcError::InvalidAddress);
  }

  let address = input[..len].iter().fold(0u32, |acc, b| (acc << 7) | u32::from(b >> 1));
  Ok((address, len))
}

/// Remove the LLC header (dest LSAP, src LSAP, quality) of a first segment.
fn strip_llc_header(information: &[u8]) -> Result<&[u8], HdlcError> {
  match information {
    [0xE6, 0xE6 | 0xE7, 0x00, rest @ ..] => Ok(rest),
    _ => Err(HdlcError::InvalidLlcHeader),
  }
}

fn encode_address(address: u32) -> Vec<u8> {
  let len = match address {
    0..=0x7F => 1,
    0x80..=0x3FFF => 2,
    _ => 4,
  };
  let mut bytes: Vec<u8> = (0..len)
    .rev()
    .map(|i| (((address >> (7 * i)) & 0x7F) as u8) << 1)
    .collect();
  if let Some(last) = bytes.last_mut() {
    *last |= 1;
  }
  bytes
}

/// Encode a frame, adding the LLC header unless `frame` is a continuation.
///
/// Used to feed recorded or simulated meter traffic through the parser.
pub fn encode(frame: &HdlcFrame<'_>, continuation: bool) -> Vec<u8> {
  let mut header = Vec::new();
  header.extend(encode_address(frame.dest_address));
  header.extend(encode_address(frame.src_address));
  header.push(frame.control);

  let mut information = Vec::new();
  if !frame.information.is_empty() {
    if !continuation {
      information.extend([0xE6, 0xE7, 0x00]);
    }
    information.extend_from_slice(frame.information);
  }

  let hcs_len = if information.is_empty() { 0 } else { 2 };
  let frame_len = 2 + header.len() + hcs_len + information.len() + 2;
  let mut format = 0xA000 | (frame_len as u16 & 0x07FF);
  if frame.segmented {
    format |= 0x0800;
  }

  let mut body = format.to_be_bytes().to_vec();
  body.extend(header);
  if !information.is_empty() {
    let hcs = CHECKSUM.checksum(&body);
    body.extend(hcs.to_le_bytes());
    body.extend(information);
  }
  let fcs = CHECKSUM.checksum(&body);
  body.extend(fcs.to_le_bytes());

  let mut out = Vec::with_capacity(body.len() + 2);
  out.push(FLAG);
  out.extend(body);
  out.push(FLAG);
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample(information: &[u8]) -> HdlcFrame<'_> {
    HdlcFrame {
      dest_address: 0x10,
      src_address: 0x01,
      control: 0x13,
      segmented: false,
      information,
    }
  }

  #[test]
  fn parses_encoded_frame_and_strips_llc() {
    let bytes = encode(&sample(&[0xDB, 0x08, 0x01]), false);
    let (rest, frame) = parse(&bytes, false).unwrap();

    assert!(rest.is_empty());
    assert_eq!(frame.information, &[0xDB, 0x08, 0x01]);
    assert_eq!(frame.dest_address, 0x10);
    assert_eq!(frame.src_address, 0x01);
    assert_eq!(frame.control, 0x13);
    assert!(!frame.segmented);
  }

  #[test]
  fn checksums_are_x25() {
    // Well-known check value of CRC-16/X.25.
    assert_eq!(CHECKSUM.checksum(b"123456789"), 0x906E);
  }

  #[test]
  fn returns_trailing_bytes() {
    let mut bytes = encode(&sample(&[1, 2, 3]), false);
    bytes.extend([FLAG, 0xA0]);
    let (rest, _) = parse(&bytes, false).unwrap();
    assert_eq!(rest, &[FLAG, 0xA0]);
  }

  #[test]
  fn empty_input_needs_one_byte() {
    assert_eq!(parse(&[], false), Err(incomplete(1)));
  }

  #[test]
  fn short_input_reports_missing_bytes() {
    let bytes = encode(&sample(&[1, 2, 3, 4]), false);
    assert_eq!(parse(&bytes[..1], false), Err(incomplete(2)));
    assert_eq!(parse(&bytes[..5], false), Err(incomplete(bytes.len() - 5)));
  }

  #[test]
  fn rejects_missing_start_flag() {
    assert_eq!(parse(&[0x00, 0xA0], false), Err(HdlcError::InvalidStartCharacter));
  }

  #[test]
  fn rejects_wrong_frame_type() {
    assert_eq!(parse(&[FLAG, 0x80, 0x07], false), Err(HdlcError::InvalidFormat));
  }

  #[test]
  fn rejects_too_short_length() {
    assert_eq!(parse(&[FLAG, 0xA0, 0x03], false), Err(HdlcError::InvalidFormat));
  }

  #[test]
  fn rejects_corrupted_payload() {
    let mut bytes = encode(&sample(&[1, 2, 3]), false);
    let pos = bytes.len() - 4;
    bytes[pos] ^= 0xFF;
    assert_eq!(parse(&bytes, false), Err(HdlcError::InvalidChecksum));
  }

  #[test]
  fn rejects_missing_closing_flag() {
    let mut bytes = encode(&sample(&[1, 2, 3]), false);
    let last = bytes.len() - 1;
    bytes[last] = 0x00;
    assert_eq!(parse(&bytes, false), Err(HdlcError::InvalidFormat));
  }

  #[test]
  fn rejects_unterminated_address() {
    // Address bytes without the low bit set.
    let mut body = vec![0xA0, 0x0A, 0x02, 0x02, 0x02, 0x02, 0x02, 0x13];
    let fcs = CHECKSUM.checksum(&body);
    body.extend(fcs.to_le_bytes());
    let mut bytes = vec![FLAG];
    bytes.extend(body);
    bytes.push(FLAG);
    assert_eq!(parse(&bytes, false), Err(HdlcError::InvalidAddress));
  }

  #[test]
  fn rejects_missing_llc_header() {
    let bytes = encode(&sample(&[0x01, 0x02, 0x03]), true);
    assert_eq!(parse(&bytes, false), Err(HdlcError::InvalidLlcHeader));
  }

  #[test]
  fn continuation_frames_keep_their_information() {
    let frame = HdlcFrame {
      segmented: true,
      ..sample(&[0x01, 0x02, 0x03])
    };
    let bytes = encode(&frame, true);
    let (_, parsed) = parse(&bytes, true).unwrap();
    assert!(parsed.segmented);
    assert_eq!(parsed.information, &[0x01, 0x02, 0x03]);
  }

  #[test]
  fn multi_byte_addresses() {
    let frame = HdlcFrame {
      dest_address: 0x1234,
      src_address: 0x0012_3456,
      ..sample(&[0xAA])
    };
    let bytes = encode(&frame, false);
    let (_, parsed) = parse(&bytes, false).unwrap();
    assert_eq!(parsed.dest_address, 0x1234);
    assert_eq!(parsed.src_address, 0x0012_3456);
  }

  #[test]
  fn frame_without_information() {
    let bytes = encode(&sample(&[]), false);
    let (_, parsed) = parse(&bytes, false).unwrap();
    assert!(parsed.information.is_empty());
  }
}
