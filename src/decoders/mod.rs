//! Stream codecs for the filters the object store reads and writes.
//!
//! Cross-reference streams and object streams are almost always stored with
//! FlateDecode, frequently with a PNG predictor on top. Other filters are
//! content-level concerns and are reported as unsupported.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};

mod flate;
mod predictor;

pub use flate::FlateDecoder;
pub use predictor::{decode_predictor, DecodeParams};

/// Trait for PDF stream codecs.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Encode the input data.
    fn encode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Get the name of this filter (e.g., "FlateDecode").
    fn name(&self) -> &str;
}

fn decoder_for(name: &str) -> Result<Box<dyn StreamDecoder>> {
    match name {
        "FlateDecode" | "Fl" => Ok(Box::new(FlateDecoder)),
        other => Err(Error::Unsupported(format!("stream filter {}", other))),
    }
}

/// Filter names of a stream dictionary, in application order.
pub fn filter_names(dict: &Dictionary) -> Vec<String> {
    match dict.get("Filter") {
        Some(Object::Name(name)) => vec![name.clone()],
        Some(Object::Array(arr)) => arr
            .iter()
            .filter_map(|obj| obj.as_name().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn decode_params(dict: &Dictionary) -> Option<DecodeParams> {
    let params = match dict.get("DecodeParms")? {
        Object::Dictionary(d) => d,
        Object::Array(arr) => arr.iter().filter_map(Object::as_dict).next()?,
        _ => return None,
    };
    Some(DecodeParams::from_dict(params))
}

/// Decode stream data using the filter pipeline named by `dict`.
pub fn decode_stream(dict: &Dictionary, data: &[u8]) -> Result<Vec<u8>> {
    let filters = filter_names(dict);
    if filters.is_empty() {
        return Ok(data.to_vec());
    }

    let mut current = data.to_vec();
    for name in &filters {
        current = decoder_for(name)?.decode(&current)?;
    }

    match decode_params(dict) {
        Some(params) if params.predictor > 1 => decode_predictor(&current, &params),
        _ => Ok(current),
    }
}

/// Flate-compress `data` for a stream that will carry `/Filter /FlateDecode`.
pub fn encode_flate(data: &[u8]) -> Result<Vec<u8>> {
    FlateDecoder.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_stream_no_filters() {
        let data = b"Hello, World!";
        let result = decode_stream(&Dictionary::new(), data).unwrap();
        assert_eq!(result, data);
    }

    #[test]
    fn test_decode_stream_unsupported_filter() {
        let mut dict = Dictionary::new();
        dict.insert("Filter".to_string(), Object::name("LZWDecode"));
        let result = decode_stream(&dict, b"test");
        assert!(matches!(result, Err(Error::Unsupported(ref m)) if m.contains("LZWDecode")));
    }

    #[test]
    fn test_filter_names_from_array() {
        let mut dict = Dictionary::new();
        dict.insert(
            "Filter".to_string(),
            Object::Array(vec![Object::name("FlateDecode"), Object::name("Crypt")]),
        );
        assert_eq!(filter_names(&dict), vec!["FlateDecode", "Crypt"]);
    }

    #[test]
    fn test_flate_with_up_predictor() {
        // Two rows of three bytes, PNG Up predictor.
        let raw = [2u8, 1, 2, 3, 2, 1, 1, 1];
        let compressed = encode_flate(&raw).unwrap();

        let mut params = Dictionary::new();
        params.insert("Predictor".to_string(), Object::Integer(12));
        params.insert("Columns".to_string(), Object::Integer(3));
        let mut dict = Dictionary::new();
        dict.insert("Filter".to_string(), Object::name("FlateDecode"));
        dict.insert("DecodeParms".to_string(), Object::Dictionary(params));

        let decoded = decode_stream(&dict, &compressed).unwrap();
        assert_eq!(decoded, vec![1, 2, 3, 2, 3, 4]);
    }
}
