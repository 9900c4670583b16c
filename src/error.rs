//! Error types for the object store.
//!
//! This module defines all error types that can occur while parsing, resolving,
//! serializing and ciphering PDF objects.

use crate::object::ObjectRef;

/// Result type alias for object store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during PDF processing.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)] // "Invalid" prefix is intentional for clarity
pub enum Error {
    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Malformed byte structure at a specific offset
    #[error("Failed to parse at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Unexpected byte while matching a keyword such as `xref` or `trailer`
    #[error("Unexpected character at byte {offset}: expected '{expected}', found '{found}'")]
    BadChar {
        /// Byte offset of the mismatch
        offset: usize,
        /// Keyword or character that was expected
        expected: String,
        /// What was found instead (lossy text)
        found: String,
    },

    /// Invalid cross-reference section
    #[error("Invalid cross-reference section: {0}")]
    InvalidXref(String),

    /// Referenced object not found in the update chain
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Index beyond the bounds of a table
    #[error("Index {index} out of range (length {len})")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Table length
        len: usize,
    },

    /// Unexpected end of data
    #[error("End of data reached unexpectedly")]
    UnexpectedEof,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported feature
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Encryption or key-derivation failure
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Neither the owner nor the user password matched
    #[error("Invalid password")]
    InvalidPassword,

    /// Failure while processing one indirect object
    #[error("Object {reference}: {source}")]
    Object {
        /// Reference of the failing object
        reference: ObjectRef,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// Circular reference detected in object graph or update chain
    #[error("Circular reference detected: {0}")]
    CircularReference(String),

    /// Recursion depth limit exceeded
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),

    /// CMS/DER encoding error
    #[error("CMS error: {0}")]
    Cms(#[from] der::Error),

    /// RSA key transport error
    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),
}

impl Error {
    /// Shorthand for a [`Error::ParseError`].
    pub fn parse(offset: usize, reason: impl Into<String>) -> Self {
        Error::ParseError {
            offset,
            reason: reason.into(),
        }
    }

    /// Shorthand for an [`Error::InvalidObjectType`].
    pub fn object_type(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Error::InvalidObjectType {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Wrap this error with the reference of the object being processed.
    pub fn for_object(self, reference: ObjectRef) -> Self {
        Error::Object {
            reference,
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_header_error() {
        let err = Error::InvalidHeader("NotAPDF".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("Invalid PDF header"));
        assert!(msg.contains("NotAPDF"));
    }

    #[test]
    fn test_parse_error() {
        let err = Error::parse(1234, "invalid token");
        let msg = format!("{}", err);
        assert!(msg.contains("1234"));
        assert!(msg.contains("invalid token"));
    }

    #[test]
    fn test_bad_char_error() {
        let err = Error::BadChar {
            offset: 7,
            expected: "xref".to_string(),
            found: "xrfe".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("byte 7"));
        assert!(msg.contains("'xref'"));
    }

    #[test]
    fn test_object_not_found_error() {
        let err = Error::ObjectNotFound(10, 0);
        let msg = format!("{}", err);
        assert!(msg.contains("10 0 R"));
    }

    #[test]
    fn test_object_annotation() {
        let err = Error::Decode("bad padding".to_string()).for_object(ObjectRef::new(12, 0));
        let msg = format!("{}", err);
        assert!(msg.starts_with("Object 12 0 R"));
        assert!(msg.contains("bad padding"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_index_out_of_range() {
        let err = Error::IndexOutOfRange { index: 5, len: 2 };
        assert_eq!(format!("{}", err), "Index 5 out of range (length 2)");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(format!("{}", err).contains("IO error"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
