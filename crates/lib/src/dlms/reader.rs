use super::DlmsError;

/// Cursor over an APDU byte slice.
pub(super) struct Reader<'a> {
  input: &'a [u8],
}

impl<'a> Reader<'a> {
  pub(super) fn new(input: &'a [u8]) -> Self {
    Self { input }
  }

  pub(super) fn remaining(&self) -> &'a [u8] {
    self.input
  }

  pub(super) fn take(&mut self, n: usize) -> Result<&'a [u8], DlmsError> {
    if self.input.len() < n {
      return Err(DlmsError::Incomplete(Some(n - self.input.len())));
    }
    let (head, tail) = self.input.split_at(n);
    self.input = tail;
    Ok(head)
  }

  pub(super) fn array<const N: usize>(&mut self) -> Result<[u8; N], DlmsError> {
    let mut out = [0; N];
    out.copy_from_slice(self.take(N)?);
    Ok(out)
  }

  pub(super) fn u8(&mut self) -> Result<u8, DlmsError> {
    Ok(self.array::<1>()?[0])
  }

  pub(super) fn u32(&mut self) -> Result<u32, DlmsError> {
    Ok(u32::from_be_bytes(self.array()?))
  }

  /// BER/A-XDR variable length: short form below `0x80`, otherwise the low
  /// bits give the number of big-endian length bytes that follow.
  pub(super) fn length(&mut self) -> Result<usize, DlmsError> {
    let first = self.u8()?;
    if first < 0x80 {
      return Ok(usize::from(first));
    }
    let count = usize::from(first & 0x7F);
    if count == 0 || count > 4 {
      return Err(DlmsError::InvalidLength);
    }
    let len = self
      .take(count)?
      .iter()
      .fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
    Ok(len)
  }
}

/// Append a BER/A-XDR variable length.
pub(super) fn write_length(out: &mut Vec<u8>, len: usize) {
  match len {
    0..=0x7F => out.push(len as u8),
    0x80..=0xFF => out.extend([0x81, len as u8]),
    0x100..=0xFFFF => {
      out.push(0x82);
      out.extend((len as u16).to_be_bytes());
    }
    _ => {
      out.push(0x84);
      out.extend((len as u32).to_be_bytes());
    }
  }
}
