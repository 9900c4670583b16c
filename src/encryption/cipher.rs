//! Per-object encryption (ISO 32000-1 algorithm 1, ISO 32000-2 algorithm 1.A).
//!
//! RC4 and AES-128 use an object key derived from the file key and the
//! object's number and generation; AES-256 uses the file key directly.
//! AES ciphertext carries its random IV in the first 16 bytes.

use super::aes::{cbc_decrypt, cbc_encrypt, BLOCK_SIZE};
use super::rc4::rc4;
use super::{random_bytes, CryptMethod, EncryptionKey};
use crate::error::{Error, Result};
use crate::object::ObjectRef;
use md5::{Digest, Md5};

/// Object key for `reference` (algorithm 1, steps a to d).
pub fn object_key(key: &EncryptionKey, reference: ObjectRef) -> Vec<u8> {
    if key.method == CryptMethod::AesV3 {
        return key.raw.clone();
    }
    let mut hasher = Md5::new();
    hasher.update(&key.raw);
    hasher.update(&reference.id.to_le_bytes()[..3]);
    hasher.update(&reference.gen.to_le_bytes());
    if key.method == CryptMethod::AesV2 {
        hasher.update(b"sAlT");
    }
    let mut hash = hasher.finalize().to_vec();
    hash.truncate((key.raw.len() + 5).min(16));
    hash
}

/// Encrypt `data` belonging to object `reference`.
pub fn encrypt(key: &EncryptionKey, reference: ObjectRef, data: &[u8]) -> Result<Vec<u8>> {
    match key.method {
        CryptMethod::None => Ok(data.to_vec()),
        CryptMethod::Rc4 => rc4(&object_key(key, reference), data),
        CryptMethod::AesV2 | CryptMethod::AesV3 => {
            let iv = random_bytes(BLOCK_SIZE)?;
            encrypt_with_iv(key, reference, &iv, data)
        },
    }
}

/// AES encryption with a caller-supplied IV.
pub fn encrypt_with_iv(
    key: &EncryptionKey,
    reference: ObjectRef,
    iv: &[u8],
    data: &[u8],
) -> Result<Vec<u8>> {
    if !matches!(key.method, CryptMethod::AesV2 | CryptMethod::AesV3) {
        return Err(Error::Encryption("an IV only applies to AES".to_string()));
    }
    let mut out = iv.to_vec();
    out.extend_from_slice(&cbc_encrypt(&object_key(key, reference), iv, data)?);
    Ok(out)
}

/// Decrypt `data` belonging to object `reference`.
pub fn decrypt(key: &EncryptionKey, reference: ObjectRef, data: &[u8]) -> Result<Vec<u8>> {
    match key.method {
        CryptMethod::None => Ok(data.to_vec()),
        CryptMethod::Rc4 => rc4(&object_key(key, reference), data),
        CryptMethod::AesV2 | CryptMethod::AesV3 => {
            if data.is_empty() {
                return Ok(Vec::new());
            }
            if data.len() < BLOCK_SIZE {
                return Err(Error::Encryption(format!(
                    "AES data of {} bytes has no IV",
                    data.len()
                )));
            }
            let (iv, body) = data.split_at(BLOCK_SIZE);
            cbc_decrypt(&object_key(key, reference), iv, body)
        },
    }
}
