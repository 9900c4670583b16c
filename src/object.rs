//! PDF value model.
//!
//! Values are plain data: indirect references stay unresolved
//! [`Object::Reference`] values until a [`crate::Document`] resolves them.
//! Dictionaries keep insertion order so that serialized output is stable.

use crate::error::{Error, Result};
use indexmap::IndexMap;

/// Insertion-ordered PDF dictionary.
pub type Dictionary = IndexMap<String, Object>;

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String (byte array); covers literal, hex and text strings
    String(Vec<u8>),
    /// Name (without the leading /)
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (key-value pairs)
    Dictionary(Dictionary),
    /// Stream (dictionary + raw, still-encoded data)
    Stream {
        /// Stream dictionary
        dict: Dictionary,
        /// Stream data as stored in the file
        data: bytes::Bytes,
    },
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl From<ObjectRef> for Object {
    fn from(r: ObjectRef) -> Self {
        Object::Reference(r)
    }
}

impl From<Dictionary> for Object {
    fn from(d: Dictionary) -> Self {
        Object::Dictionary(d)
    }
}

impl From<i64> for Object {
    fn from(i: i64) -> Self {
        Object::Integer(i)
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Object::Boolean(b)
    }
}

impl Object {
    /// Name object from anything string-like.
    pub fn name(name: impl Into<String>) -> Self {
        Object::Name(name.into())
    }

    /// String object from raw bytes.
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Object::String(bytes.into())
    }

    /// Stream object from a dictionary and its stored data.
    pub fn stream(dict: Dictionary, data: impl Into<bytes::Bytes>) -> Self {
        Object::Stream {
            dict,
            data: data.into(),
        }
    }

    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream { .. } => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to cast to a real number. Integers are widened.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Object::Real(r) => Some(*r),
            Object::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for both Dictionary and Stream objects.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Mutable dictionary access. Works for both Dictionary and Stream objects.
    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to string (bytes).
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Stream data as stored (still encoded).
    pub fn as_stream_data(&self) -> Option<&bytes::Bytes> {
        match self {
            Object::Stream { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Whether this value points at an indirect object.
    pub fn is_indirect(&self) -> bool {
        matches!(self, Object::Reference(_))
    }

    /// Whether this is a stream.
    pub fn is_stream(&self) -> bool {
        matches!(self, Object::Stream { .. })
    }

    /// Dictionary lookup on dictionaries and streams.
    pub fn get(&self, key: &str) -> Option<&Object> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// `/Type` name of a dictionary or stream.
    pub fn type_entry(&self) -> Option<&str> {
        self.get("Type").and_then(Object::as_name)
    }

    /// Integer value or a typed error.
    pub fn expect_integer(&self) -> Result<i64> {
        self.as_integer()
            .ok_or_else(|| Error::object_type("Integer", self.type_name()))
    }

    /// Dictionary value or a typed error.
    pub fn expect_dict(&self) -> Result<&Dictionary> {
        self.as_dict()
            .ok_or_else(|| Error::object_type("Dictionary", self.type_name()))
    }

    /// Decode stream data through its `/Filter` chain.
    pub fn decode_stream_data(&self) -> Result<Vec<u8>> {
        match self {
            Object::Stream { dict, data } => crate::decoders::decode_stream(dict, data),
            _ => Err(Error::object_type("Stream", self.type_name())),
        }
    }
}
