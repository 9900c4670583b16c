//! PNG predictor decoding for Flate streams.
//!
//! Cross-reference streams are commonly written with `/Predictor 12`
//! (PNG Up) and `/Columns` equal to the sum of the `W` widths.

use crate::error::{Error, Result};
use crate::object::Dictionary;

/// Decode parameters for stream decoders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Number of columns (width in samples)
    pub columns: usize,
    /// Number of color components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Read `/Predictor`, `/Columns`, `/Colors` and `/BitsPerComponent`.
    pub fn from_dict(dict: &Dictionary) -> Self {
        let int = |key: &str, default: i64| {
            dict.get(key)
                .and_then(|o| o.as_integer())
                .unwrap_or(default)
        };
        Self {
            predictor: int("Predictor", 1),
            columns: int("Columns", 1).max(1) as usize,
            colors: int("Colors", 1).max(1) as usize,
            bits_per_component: int("BitsPerComponent", 8).max(1) as usize,
        }
    }

    fn row_bytes(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    fn pixel_bytes(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Reverse the predictor named in `params`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        10..=15 => decode_png(data, params),
        other => Err(Error::Unsupported(format!("predictor {}", other))),
    }
}

fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let p = left as i16 + up as i16 - up_left as i16;
    let pa = (p - left as i16).abs();
    let pb = (p - up as i16).abs();
    let pc = (p - up_left as i16).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        up_left
    }
}

fn decode_png(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let width = params.row_bytes();
    let bpp = params.pixel_bytes();
    let stride = width + 1;

    if data.len() % stride != 0 {
        log::warn!(
            "Predictor data length {} is not a multiple of row size {}, ignoring tail",
            data.len(),
            stride
        );
    }

    let mut output = Vec::with_capacity(data.len() / stride * width);
    let mut prev = vec![0u8; width];
    let mut row = vec![0u8; width];

    for chunk in data.chunks_exact(stride) {
        let tag = chunk[0];
        let encoded = &chunk[1..];
        for i in 0..width {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => {
                    return Err(Error::Decode(format!("Invalid PNG predictor tag: {}", other)));
                },
            };
            row[i] = encoded[i].wrapping_add(predicted);
        }
        output.extend_from_slice(&row);
        std::mem::swap(&mut prev, &mut row);
    }

    Ok(output)
}
