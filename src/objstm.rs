//! Object streams (PDF 1.5+).
//!
//! An object stream (`/Type /ObjStm`) bundles several non-stream objects in
//! one, usually compressed, stream:
//!
//! ```text
//! 12 0 obj
//! << /Type /ObjStm /N 3 /First 16 /Filter /FlateDecode >>
//! stream
//! 10 0 11 15 13 28 % pairs: (object number, offset relative to /First)
//! <dict>           % object 10 at offset 0
//! [array]          % object 11 at offset 15
//! ...
//! endstream
//! ```
//!
//! [`CompressedObject`] wraps such a stream. The header is parsed and the
//! payload decoded once, on first access; afterwards every lookup is a
//! table index plus a single object parse.

use crate::cursor::ByteReader;
use crate::decoders::encode_flate;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use crate::parser::parse_object;
use crate::writer::ObjectSerializer;
use bytes::Bytes;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Upper bound on `/N`; larger values indicate a corrupt stream.
const MAX_OBJECTS: i64 = 1_000_000;

/// Decoded form of an object stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedObjectStream {
    /// Byte offset of the first payload inside `data`
    pub first: usize,
    /// (object number, offset relative to `first`) per contained object
    pub refs: Vec<(u32, usize)>,
    /// Decoded stream bytes (header and payloads)
    pub data: Bytes,
}

/// An object stream with memoized decoding.
#[derive(Debug)]
pub struct CompressedObject {
    dict: Dictionary,
    raw: Bytes,
    decoded: OnceCell<DecodedObjectStream>,
    decode_count: AtomicUsize,
}

impl CompressedObject {
    /// Wrap an `ObjStm` stream object. Nothing is decoded yet.
    pub fn from_stream(stream: &Object) -> Result<Self> {
        let (dict, data) = match stream {
            Object::Stream { dict, data } => (dict, data),
            other => return Err(Error::object_type("Stream", other.type_name())),
        };
        if let Some(kind) = dict.get("Type").and_then(Object::as_name) {
            if kind != "ObjStm" {
                return Err(Error::object_type("/Type /ObjStm", format!("/Type /{}", kind)));
            }
        }
        Ok(Self {
            dict: dict.clone(),
            raw: data.clone(),
            decoded: OnceCell::new(),
            decode_count: AtomicUsize::new(0),
        })
    }

    /// `/N` as declared in the stream dictionary.
    pub fn declared_len(&self) -> Option<i64> {
        self.dict.get("N").and_then(Object::as_integer)
    }

    /// How many times the payload has actually been decoded.
    pub fn decode_count(&self) -> usize {
        self.decode_count.load(Ordering::Relaxed)
    }

    /// Decode the header and payload; later calls return the cached result.
    pub fn decode(&self) -> Result<&DecodedObjectStream> {
        self.decoded.get_or_try_init(|| {
            self.decode_count.fetch_add(1, Ordering::Relaxed);
            self.decode_uncached()
        })
    }

    fn decode_uncached(&self) -> Result<DecodedObjectStream> {
        let int = |key: &str| -> Result<i64> {
            self.dict
                .get(key)
                .and_then(Object::as_integer)
                .ok_or_else(|| Error::parse(0, format!("object stream missing /{}", key)))
        };
        let n = int("N")?;
        let first = int("First")?;
        if !(0..=MAX_OBJECTS).contains(&n) || first < 0 {
            return Err(Error::parse(0, format!("invalid object stream /N {} /First {}", n, first)));
        }
        let (n, first) = (n as usize, first as usize);

        let data = crate::decoders::decode_stream(&self.dict, &self.raw)?;
        if data.len() < first {
            return Err(Error::parse(
                first,
                format!("object stream data too short: {} bytes", data.len()),
            ));
        }

        let mut reader = ByteReader::new(&data[..first], 0);
        let mut refs = Vec::with_capacity(n);
        for _ in 0..n {
            reader.skip_whitespace();
            let id = reader.read_uint()?;
            reader.skip_whitespace();
            let offset = reader.read_uint()?;
            let id = u32::try_from(id)
                .map_err(|_| Error::parse(reader.position(), "object number out of range"))?;
            refs.push((id, offset as usize));
        }

        log::debug!("Decoded object stream with {} objects", refs.len());
        Ok(DecodedObjectStream {
            first,
            refs,
            data: Bytes::from(data),
        })
    }

    /// Number of objects in the stream.
    pub fn len(&self) -> Result<usize> {
        Ok(self.decode()?.refs.len())
    }

    /// Whether the stream holds no objects.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Object number stored at `index`.
    pub fn id_at(&self, index: usize) -> Result<u32> {
        let decoded = self.decode()?;
        decoded
            .refs
            .get(index)
            .map(|(id, _)| *id)
            .ok_or(Error::IndexOutOfRange {
                index,
                len: decoded.refs.len(),
            })
    }

    /// Parse the object stored at `index`.
    pub fn get_value(&self, index: usize) -> Result<Object> {
        let decoded = self.decode()?;
        let (id, offset) = *decoded.refs.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: decoded.refs.len(),
        })?;
        let start = decoded.first.saturating_add(offset);
        let payload = decoded.data.get(start..).ok_or_else(|| {
            Error::parse(start, format!("object {} lies beyond object stream data", id))
        })?;
        match parse_object(payload) {
            Ok((_, value)) => Ok(value),
            Err(e) => Err(Error::parse(
                start,
                format!("object {} in object stream: {:?}", id, e),
            )),
        }
    }

    /// Build an object stream from `(object number, value)` pairs.
    ///
    /// Payloads are separated by a newline so adjacent numbers never merge.
    pub fn encode(objects: &[(u32, &Object)], compress: bool) -> Result<Object> {
        let serializer = ObjectSerializer::new();
        let mut header = String::new();
        let mut payload = Vec::new();

        for (id, value) in objects {
            if value.is_stream() {
                return Err(Error::Unsupported(format!(
                    "stream object {} cannot be stored in an object stream",
                    id
                )));
            }
            header.push_str(&format!("{} {} ", id, payload.len()));
            payload.extend_from_slice(&serializer.serialize(value)?);
            payload.push(b'\n');
        }

        let first = header.len();
        let mut data = header.into_bytes();
        data.extend_from_slice(&payload);

        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::name("ObjStm"));
        dict.insert("N".to_string(), Object::Integer(objects.len() as i64));
        dict.insert("First".to_string(), Object::Integer(first as i64));
        let data = if compress {
            dict.insert("Filter".to_string(), Object::name("FlateDecode"));
            encode_flate(&data)?
        } else {
            data
        };
        Ok(Object::stream(dict, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(n: i64, first: i64, data: &[u8]) -> Object {
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::name("ObjStm"));
        dict.insert("N".to_string(), Object::Integer(n));
        dict.insert("First".to_string(), Object::Integer(first));
        Object::stream(dict, data.to_vec())
    }

    #[test]
    fn test_get_value_by_index() {
        let pairs = b"10 0 11 3 ";
        let mut data = pairs.to_vec();
        data.extend_from_slice(b"42 /Test");
        let cobj = CompressedObject::from_stream(&stream(2, pairs.len() as i64, &data)).unwrap();

        assert_eq!(cobj.len().unwrap(), 2);
        assert_eq!(cobj.id_at(1).unwrap(), 11);
        assert_eq!(cobj.get_value(0).unwrap(), Object::Integer(42));
        assert_eq!(cobj.get_value(1).unwrap(), Object::name("Test"));
    }

    #[test]
    fn test_decode_is_memoized() {
        let data = b"5 0 <</A 1>>";
        let cobj = CompressedObject::from_stream(&stream(1, 4, data)).unwrap();
        assert_eq!(cobj.decode_count(), 0);

        let first = cobj.decode().unwrap().clone();
        let second = cobj.decode().unwrap().clone();
        let _ = cobj.get_value(0).unwrap();

        assert_eq!(first, second);
        assert_eq!(cobj.decode_count(), 1);
    }

    #[test]
    fn test_index_out_of_range() {
        let cobj = CompressedObject::from_stream(&stream(1, 4, b"5 0 true")).unwrap();
        assert!(matches!(
            cobj.get_value(3),
            Err(Error::IndexOutOfRange { index: 3, len: 1 })
        ));
    }

    #[test]
    fn test_missing_first_is_error() {
        let mut dict = Dictionary::new();
        dict.insert("N".to_string(), Object::Integer(1));
        let cobj = CompressedObject::from_stream(&Object::stream(dict, b"1 0 1".to_vec())).unwrap();
        assert!(cobj.decode().is_err());
    }

    #[test]
    fn test_wrong_type_rejected() {
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::name("XRef"));
        assert!(CompressedObject::from_stream(&Object::stream(dict, Vec::new())).is_err());
        assert!(CompressedObject::from_stream(&Object::Integer(1)).is_err());
    }

    #[test]
    fn test_encode_then_read_back() {
        let catalog = {
            let mut d = Dictionary::new();
            d.insert("Type".to_string(), Object::name("Catalog"));
            Object::Dictionary(d)
        };
        let number = Object::Integer(7);
        let text = Object::string(b"hi".to_vec());
        let items = [(3u32, &catalog), (4, &number), (9, &text)];

        for compress in [false, true] {
            let encoded = CompressedObject::encode(&items, compress).unwrap();
            assert_eq!(encoded.get("N"), Some(&Object::Integer(3)));
            assert_eq!(encoded.get("Filter").is_some(), compress);

            let cobj = CompressedObject::from_stream(&encoded).unwrap();
            for (index, (id, value)) in items.iter().enumerate() {
                assert_eq!(cobj.id_at(index).unwrap(), *id);
                assert_eq!(&cobj.get_value(index).unwrap(), *value);
            }
        }
    }

    #[test]
    fn test_encode_rejects_streams() {
        let s = Object::stream(Dictionary::new(), b"x".to_vec());
        assert!(CompressedObject::encode(&[(1, &s)], false).is_err());
    }
}
