//! AES for PDF encryption.
//!
//! Object data uses AES in CBC mode with PKCS#7 padding and the IV stored
//! as the first 16 bytes of the ciphertext. The key computations of
//! revisions 5 and 6 additionally need unpadded CBC (algorithms 2.A, 2.B,
//! 8 and 9) and single-block ECB (algorithm 10).
//!
//! Key length selects the variant: 16 bytes for AES-128, 32 for AES-256.

use crate::error::{Error, Result};
use aes::cipher::block_padding::NoPadding;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
use aes::{Aes128, Aes256};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

fn key_error(len: usize) -> Error {
    Error::Encryption(format!("invalid AES key length {}", len))
}

fn check_blocks(data: &[u8]) -> Result<()> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(Error::Encryption(format!(
            "AES data length {} is not a multiple of {}",
            data.len(),
            BLOCK_SIZE
        )));
    }
    Ok(())
}

/// CBC encryption without padding; `data` must be block aligned.
pub fn cbc_encrypt_raw(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_blocks(data)?;
    let mut buf = data.to_vec();
    let len = buf.len();
    let failed = |_| Error::Encryption("AES encryption failed".to_string());
    match key.len() {
        16 => {
            Aes128CbcEnc::new_from_slices(key, iv)
                .map_err(|_| key_error(key.len()))?
                .encrypt_padded_mut::<NoPadding>(&mut buf, len)
                .map_err(failed)?;
        },
        32 => {
            Aes256CbcEnc::new_from_slices(key, iv)
                .map_err(|_| key_error(key.len()))?
                .encrypt_padded_mut::<NoPadding>(&mut buf, len)
                .map_err(failed)?;
        },
        n => return Err(key_error(n)),
    }
    Ok(buf)
}

/// CBC decryption without padding removal; `data` must be block aligned.
pub fn cbc_decrypt_raw(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_blocks(data)?;
    let mut buf = data.to_vec();
    let failed = |_| Error::Encryption("AES decryption failed".to_string());
    match key.len() {
        16 => {
            Aes128CbcDec::new_from_slices(key, iv)
                .map_err(|_| key_error(key.len()))?
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(failed)?;
        },
        32 => {
            Aes256CbcDec::new_from_slices(key, iv)
                .map_err(|_| key_error(key.len()))?
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(failed)?;
        },
        n => return Err(key_error(n)),
    }
    Ok(buf)
}

/// CBC encryption with PKCS#7 padding.
pub fn cbc_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let padding = BLOCK_SIZE - data.len() % BLOCK_SIZE;
    let mut padded = Vec::with_capacity(data.len() + padding);
    padded.extend_from_slice(data);
    padded.resize(data.len() + padding, padding as u8);
    cbc_encrypt_raw(key, iv, &padded)
}

/// CBC decryption followed by PKCS#7 padding removal.
pub fn cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let mut plain = cbc_decrypt_raw(key, iv, data)?;
    let padding = plain.last().copied().unwrap_or(0) as usize;
    if padding == 0 || padding > BLOCK_SIZE || padding > plain.len() {
        return Err(Error::Encryption("invalid PKCS#7 padding".to_string()));
    }
    let data_len = plain.len() - padding;
    if plain[data_len..].iter().any(|&b| b as usize != padding) {
        return Err(Error::Encryption("invalid PKCS#7 padding".to_string()));
    }
    plain.truncate(data_len);
    Ok(plain)
}

/// Encrypt one block with AES-256 in ECB mode.
pub fn ecb256_encrypt_block(key: &[u8], block: &[u8]) -> Result<Vec<u8>> {
    if block.len() != BLOCK_SIZE {
        return Err(Error::Encryption("ECB input must be one block".to_string()));
    }
    let cipher = Aes256::new_from_slice(key).map_err(|_| key_error(key.len()))?;
    let mut block = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut block);
    Ok(block.to_vec())
}

/// Decrypt one block with AES-256 in ECB mode.
pub fn ecb256_decrypt_block(key: &[u8], block: &[u8]) -> Result<Vec<u8>> {
    if block.len() != BLOCK_SIZE {
        return Err(Error::Encryption("ECB input must be one block".to_string()));
    }
    let cipher = Aes256::new_from_slice(key).map_err(|_| key_error(key.len()))?;
    let mut block = GenericArray::clone_from_slice(block);
    cipher.decrypt_block(&mut block);
    Ok(block.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fips197_aes128_block() {
        // FIPS-197 appendix C.1, one block with a zero IV is plain ECB
        let key = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let plain = hex::decode("00112233445566778899aabbccddeeff").unwrap();
        let out = cbc_encrypt_raw(&key, &[0u8; 16], &plain).unwrap();
        assert_eq!(hex::encode(&out), "69c4e0d86a7b0430d8cdb78070b4c55a");
        assert_eq!(cbc_decrypt_raw(&key, &[0u8; 16], &out).unwrap(), plain);
    }

    #[test]
    fn test_fips197_aes256_ecb() {
        let key = hex::decode("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f")
            .unwrap();
        let plain = hex::decode("00112233445566778899aabbccddeeff").unwrap();
        let out = ecb256_encrypt_block(&key, &plain).unwrap();
        assert_eq!(hex::encode(&out), "8ea2b7ca516745bfeafc49904b496089");
        assert_eq!(ecb256_decrypt_block(&key, &out).unwrap(), plain);
    }

    #[test]
    fn test_padded_round_trip() {
        let iv = [7u8; 16];
        for key in [vec![1u8; 16], vec![2u8; 32]] {
            for len in [0usize, 1, 15, 16, 17, 100] {
                let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
                let encrypted = cbc_encrypt(&key, &iv, &data).unwrap();
                assert_eq!(encrypted.len(), (len / 16 + 1) * 16);
                assert_eq!(cbc_decrypt(&key, &iv, &encrypted).unwrap(), data);
            }
        }
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(cbc_encrypt(&[0u8; 10], &[0u8; 16], b"x").is_err());
        assert!(cbc_decrypt_raw(&[0u8; 16], &[0u8; 16], &[0u8; 15]).is_err());
        // Valid block, wrong key: padding check fails
        let encrypted = cbc_encrypt(&[1u8; 16], &[0u8; 16], b"hello").unwrap();
        assert!(cbc_decrypt(&[2u8; 16], &[0u8; 16], &encrypted).is_err());
    }
}
