//! FlateDecode (zlib/deflate) implementation.
//!
//! Uses the flate2 crate. Decoding keeps whatever was inflated before a
//! corruption and falls back to raw deflate for streams with a damaged zlib
//! header.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// FlateDecode filter implementation.
pub struct FlateDecoder;

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let zlib_err = match ZlibDecoder::new(input).read_to_end(&mut output) {
            Ok(_) => return Ok(output),
            Err(e) if !output.is_empty() => {
                log::warn!(
                    "FlateDecode partial recovery: extracted {} bytes before corruption: {}",
                    output.len(),
                    e
                );
                return Ok(output);
            },
            Err(e) => e,
        };

        log::info!("Zlib decode failed ({}), trying raw deflate", zlib_err);
        // Raw deflate, then raw deflate after a damaged 2-byte zlib header.
        let body = if input.len() > 2 { &input[2..] } else { input };
        for candidate in [input, body] {
            output.clear();
            let _ = DeflateDecoder::new(candidate).read_to_end(&mut output);
            if !output.is_empty() {
                log::info!("Raw deflate recovery succeeded: {} bytes", output.len());
                return Ok(output);
            }
        }

        Err(Error::Decode(format!("FlateDecode failed: {}", zlib_err)))
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(input)?;
        Ok(encoder.finish()?)
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flate_encode_decode() {
        let original = b"1 0 obj << /Type /Catalog >> endobj ".repeat(20);
        let compressed = FlateDecoder.encode(&original).unwrap();
        assert!(compressed.len() < original.len());
        assert_eq!(FlateDecoder.decode(&compressed).unwrap(), original);
    }

    #[test]
    fn test_flate_raw_deflate_fallback() {
        let original = b"raw deflate payload without zlib header";
        let mut encoder =
            flate2::write::DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(original).unwrap();
        let raw = encoder.finish().unwrap();

        assert_eq!(FlateDecoder.decode(&raw).unwrap(), original);
    }

    #[test]
    fn test_flate_garbage_is_error() {
        assert!(FlateDecoder.decode(b"\xFF\xFF\xFF\xFF").is_err());
    }

    #[test]
    fn test_flate_name() {
        assert_eq!(FlateDecoder.name(), "FlateDecode");
    }
}
