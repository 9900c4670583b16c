//! Encrypt/decrypt traversal over indirect object values.
//!
//! Every string and every stream payload reachable from a top-level object
//! is ciphered with the key of that top-level object. Nested dictionaries
//! and arrays are rebuilt; the input values are never modified.
//!
//! Left untouched:
//! - the `/Encrypt` dictionary itself and cross-reference streams;
//! - the `/Contents` entry of a dictionary with a `/Filter` key
//!   (signature values);
//! - `/Type /Metadata` streams when `/EncryptMetadata` is false;
//! - streams whose filter chain starts with `/Crypt` (their own crypt
//!   filter overrides the document default).
//!
//! Objects stored inside object streams are never handed to this module;
//! their host stream is ciphered as a whole.

use super::handler::{CipherTarget, EncryptionHandler, SecurityHandler};
use crate::decoders::filter_names;
use crate::error::Result;
use crate::object::{Dictionary, Object, ObjectRef};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Encrypt,
    Decrypt,
}

struct Traversal<'a> {
    handler: &'a EncryptionHandler,
    reference: ObjectRef,
    direction: Direction,
}

impl Traversal<'_> {
    fn cipher(&self, data: &[u8], target: CipherTarget) -> Result<Vec<u8>> {
        match self.direction {
            Direction::Encrypt => self.handler.encrypt(self.reference, data, target),
            Direction::Decrypt => self.handler.decrypt(self.reference, data, target),
        }
    }

    fn value(&self, obj: &Object) -> Result<Object> {
        Ok(match obj {
            Object::String(s) => Object::String(self.cipher(s, CipherTarget::String)?),
            Object::Array(items) => Object::Array(
                items
                    .iter()
                    .map(|item| self.value(item))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Object::Dictionary(dict) => Object::Dictionary(self.dictionary(dict)?),
            Object::Stream { dict, data } => {
                if is_clear_metadata(dict, self.handler) {
                    return Ok(obj.clone());
                }
                let data = if starts_with_crypt_filter(dict) {
                    data.clone()
                } else {
                    self.cipher(data, CipherTarget::Stream)?.into()
                };
                Object::Stream {
                    dict: self.dictionary(dict)?,
                    data,
                }
            },
            other => other.clone(),
        })
    }

    fn dictionary(&self, dict: &Dictionary) -> Result<Dictionary> {
        let signature_like = dict.contains_key("Filter");
        let mut out = Dictionary::with_capacity(dict.len());
        for (key, value) in dict {
            let value = if signature_like && key == "Contents" {
                value.clone()
            } else {
                self.value(value)?
            };
            out.insert(key.clone(), value);
        }
        Ok(out)
    }
}

fn is_clear_metadata(dict: &Dictionary, handler: &EncryptionHandler) -> bool {
    !handler.encrypt_metadata() && dict.get("Type").and_then(Object::as_name) == Some("Metadata")
}

fn starts_with_crypt_filter(dict: &Dictionary) -> bool {
    filter_names(dict).first().map(String::as_str) == Some("Crypt")
}

/// Whether a top-level object is excluded from the traversal.
pub fn is_skipped(reference: ObjectRef, value: &Object, encrypt: Option<ObjectRef>) -> bool {
    encrypt.map(|r| r.id) == Some(reference.id) || (value.is_stream() && value.type_entry() == Some("XRef"))
}

/// Encrypted copy of the value of object `reference`.
pub fn encrypt_object(
    handler: &EncryptionHandler,
    reference: ObjectRef,
    value: &Object,
) -> Result<Object> {
    Traversal {
        handler,
        reference,
        direction: Direction::Encrypt,
    }
    .value(value)
}

/// Decrypted copy of the value of object `reference`.
pub fn decrypt_object(
    handler: &EncryptionHandler,
    reference: ObjectRef,
    value: &Object,
) -> Result<Object> {
    Traversal {
        handler,
        reference,
        direction: Direction::Decrypt,
    }
    .value(value)
}

/// Decrypt many top-level objects in parallel.
///
/// The first failure is returned, annotated with the failing reference.
pub fn decrypt_all(
    handler: &EncryptionHandler,
    objects: &[(ObjectRef, &Object)],
) -> Result<Vec<Object>> {
    objects
        .par_iter()
        .map(|(reference, value)| {
            decrypt_object(handler, *reference, value).map_err(|e| e.for_object(*reference))
        })
        .collect()
}

/// Encrypt many top-level objects in parallel.
///
/// An object that fails to encrypt is logged and comes back as `None`; the
/// caller writes it in clear.
pub fn encrypt_all(
    handler: &EncryptionHandler,
    objects: &[(ObjectRef, &Object)],
) -> Vec<Option<Object>> {
    objects
        .par_iter()
        .map(|(reference, value)| match encrypt_object(handler, *reference, value) {
            Ok(encrypted) => Some(encrypted),
            Err(e) => {
                log::warn!("Writing object {} unencrypted: {}", reference, e);
                None
            },
        })
        .collect()
}
