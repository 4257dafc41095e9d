//! `general-glo-ciphering` envelope (security suite 0, AES-128-GCM).

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use tracing::trace;

use super::DlmsError;
use super::reader::{Reader, write_length};
use crate::key::DecryptionKey;

pub(super) const GENERAL_GLO_CIPHERING: u8 = 0xDB;

/// Length of the GCM authentication tag appended to authenticated APDUs.
const TAG_LEN: usize = 12;

/// Length of the system title that forms the first part of the IV.
const SYSTEM_TITLE_LEN: usize = 8;

type Aes128Ctr = ctr::Ctr32BE<Aes128>;

/// The security control byte preceding the invocation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityControl(pub u8);

impl SecurityControl {
  /// Encryption only, the usual setting for consumer information interfaces.
  pub const ENCRYPTED: SecurityControl = SecurityControl(0x20);

  pub fn is_compressed(self) -> bool {
    self.0 & 0x80 != 0
  }

  pub fn is_encrypted(self) -> bool {
    self.0 & 0x20 != 0
  }

  pub fn is_authenticated(self) -> bool {
    self.0 & 0x10 != 0
  }
}

/// Apply the GCM keystream. GCM encrypts with CTR mode starting at counter
/// block 2 of `system_title ‖ invocation_counter`.
fn apply_keystream(key: &DecryptionKey, system_title: &[u8; SYSTEM_TITLE_LEN], invocation_counter: u32, buf: &mut [u8]) {
  let mut block = [0u8; 16];
  block[..8].copy_from_slice(system_title);
  block[8..12].copy_from_slice(&invocation_counter.to_be_bytes());
  block[12..].copy_from_slice(&2u32.to_be_bytes());

  let mut cipher = Aes128Ctr::new(key.as_bytes().into(), &block.into());
  cipher.apply_keystream(buf);
}

/// Decrypt the body of a `general-glo-ciphering` APDU (the tag byte already consumed).
///
/// The authentication tag, if any, is dropped without verification since
/// consumer interfaces only hand out the encryption key.
pub(super) fn decrypt(r: &mut Reader<'_>, key: &DecryptionKey) -> Result<Vec<u8>, DlmsError> {
  let title_len = usize::from(r.u8()?);
  if title_len != SYSTEM_TITLE_LEN {
    return Err(DlmsError::InvalidLength);
  }
  let system_title: [u8; SYSTEM_TITLE_LEN] = r.array()?;

  let len = r.length()?;
  let security = SecurityControl(r.u8()?);
  if security.is_compressed() || !security.is_encrypted() {
    return Err(DlmsError::UnsupportedSecurity(security.0));
  }

  let invocation_counter = r.u32()?;
  let overhead = 5 + if security.is_authenticated() { TAG_LEN } else { 0 };
  let cipher_len = len.checked_sub(overhead).ok_or(DlmsError::InvalidLength)?;

  let mut plain = r.take(cipher_len)?.to_vec();
  if security.is_authenticated() {
    r.take(TAG_LEN)?;
  }

  trace!(
    system_title = %hex::encode(system_title),
    invocation_counter,
    len = cipher_len,
    "decrypting APDU"
  );
  apply_keystream(key, &system_title, invocation_counter, &mut plain);
  Ok(plain)
}

/// Wrap a plain APDU into an encrypted-only `general-glo-ciphering` APDU.
///
/// Produces exactly what a meter configured for encryption without
/// authentication sends, which makes it useful for replaying captured readings.
pub fn encode_encrypted(key: &DecryptionKey, system_title: [u8; SYSTEM_TITLE_LEN], invocation_counter: u32, plain: &[u8]) -> Vec<u8> {
  let mut ciphertext = plain.to_vec();
  apply_keystream(key, &system_title, invocation_counter, &mut ciphertext);

  let mut out = vec![GENERAL_GLO_CIPHERING, SYSTEM_TITLE_LEN as u8];
  out.extend(system_title);
  write_length(&mut out, 5 + ciphertext.len());
  out.push(SecurityControl::ENCRYPTED.0);
  out.extend(invocation_counter.to_be_bytes());
  out.extend(ciphertext);
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  const KEY: [u8; 16] = [
    0x36, 0xC6, 0x66, 0x39, 0xE4, 0x8A, 0x8C, 0xA4, 0xD6, 0xBC, 0x8B, 0x28, 0x2A, 0x79, 0x3B, 0xBB,
  ];
  const TITLE: [u8; 8] = *b"KFM\x10\x20\x00\x91\xA2";

  #[test]
  fn keystream_matches_aes_gcm_test_vector() {
    // NIST GCM test case 3: first ciphertext block for an all-zero key is
    // produced from counter block 2 of IV cafebabefacedbaddecaf888.
    let key = DecryptionKey::new([
      0xfe, 0xff, 0xe9, 0x92, 0x86, 0x65, 0x73, 0x1c, 0x6d, 0x6a, 0x8f, 0x94, 0x67, 0x30, 0x83, 0x08,
    ]);
    let title = [0xca, 0xfe, 0xba, 0xbe, 0xfa, 0xce, 0xdb, 0xad];
    let mut block = [
      0xd9, 0x31, 0x32, 0x25, 0xf8, 0x84, 0x06, 0xe5, 0xa5, 0x59, 0x09, 0xc5, 0xaf, 0xf5, 0x26, 0x9a,
    ];
    apply_keystream(&key, &title, 0xdeca_f888, &mut block);
    assert_eq!(block, [
      0x42, 0x83, 0x1e, 0xc2, 0x21, 0x77, 0x74, 0x24, 0x4b, 0x72, 0x21, 0xb7, 0x84, 0xd0, 0xd4, 0x9c,
    ]);
  }

  #[test]
  fn decrypts_what_it_encrypts() {
    let key = DecryptionKey::new(KEY);
    let apdu = encode_encrypted(&key, TITLE, 42, &[0x0F, 0x00, 0x00, 0x00, 0x01]);

    let mut r = Reader::new(&apdu[1..]);
    assert_eq!(decrypt(&mut r, &key).unwrap(), vec![0x0F, 0x00, 0x00, 0x00, 0x01]);
    assert!(r.remaining().is_empty());
  }

  #[test]
  fn rejects_unencrypted_security_byte() {
    let key = DecryptionKey::new(KEY);
    let mut apdu = encode_encrypted(&key, TITLE, 1, &[0x00]);
    apdu[11] = 0x10;
    let mut r = Reader::new(&apdu[1..]);
    assert_eq!(decrypt(&mut r, &key), Err(DlmsError::UnsupportedSecurity(0x10)));
  }

  #[test]
  fn skips_authentication_tag() {
    let key = DecryptionKey::new(KEY);
    let mut apdu = encode_encrypted(&key, TITLE, 7, &[0xAA, 0xBB]);
    // Mark as authenticated, grow the length and append a tag.
    apdu[10] += TAG_LEN as u8;
    apdu[11] = 0x30;
    apdu.extend([0u8; TAG_LEN]);

    let mut r = Reader::new(&apdu[1..]);
    assert_eq!(decrypt(&mut r, &key).unwrap(), vec![0xAA, 0xBB]);
    assert!(r.remaining().is_empty());
  }

  #[test]
  fn truncated_ciphertext_is_incomplete() {
    let key = DecryptionKey::new(KEY);
    let apdu = encode_encrypted(&key, TITLE, 7, &[1, 2, 3, 4]);
    let mut r = Reader::new(&apdu[1..apdu.len() - 2]);
    assert_eq!(decrypt(&mut r, &key), Err(DlmsError::Incomplete(Some(2))));
  }
}
