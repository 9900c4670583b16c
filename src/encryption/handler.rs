//! Security handler capability, handler selection and the handler registry.

use super::cipher;
use super::public_key::{CertificateCallback, PublicKeyEncryptionHandler};
use super::standard::StandardEncryptionHandler;
use super::{EncryptDictionary, EncryptionKey, KeyPair};
use crate::error::{Error, Result};
use crate::object::ObjectRef;
use std::collections::HashMap;

/// Which key applies to a piece of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherTarget {
    /// Stream data (`/StmF`)
    Stream,
    /// Strings (`/StrF`)
    String,
}

/// Credentials offered to a handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authentication<'a> {
    /// Password for the standard handler
    pub password: Option<&'a str>,
    /// Recipient resolver for the public-key handler
    pub on_certificate: Option<&'a CertificateCallback>,
}

/// Capability shared by all security handlers.
pub trait SecurityHandler {
    /// Derive the file key from the offered credentials.
    fn authenticate(&mut self, auth: &Authentication<'_>) -> Result<()>;

    /// Stream and string keys, once authenticated.
    fn keys(&self) -> Option<&KeyPair>;

    /// The encryption dictionary this handler reads or writes.
    fn encrypt_dictionary(&self) -> &EncryptDictionary;

    /// Key for `target`.
    fn key_for(&self, target: CipherTarget) -> Result<&EncryptionKey> {
        let keys = self
            .keys()
            .ok_or_else(|| Error::Encryption("security handler is not authenticated".to_string()))?;
        Ok(match target {
            CipherTarget::Stream => &keys.stream,
            CipherTarget::String => &keys.string,
        })
    }

    /// Encrypt data of object `reference`.
    fn encrypt(&self, reference: ObjectRef, data: &[u8], target: CipherTarget) -> Result<Vec<u8>> {
        cipher::encrypt(self.key_for(target)?, reference, data)
    }

    /// Decrypt data of object `reference`.
    fn decrypt(&self, reference: ObjectRef, data: &[u8], target: CipherTarget) -> Result<Vec<u8>> {
        cipher::decrypt(self.key_for(target)?, reference, data)
    }
}

/// The active security handler of a document.
#[derive(Debug, Clone)]
pub enum EncryptionHandler {
    /// Password based
    Standard(StandardEncryptionHandler),
    /// Certificate based
    PublicKey(PublicKeyEncryptionHandler),
}

impl EncryptionHandler {
    /// Whether `/Type /Metadata` streams are encrypted.
    pub fn encrypt_metadata(&self) -> bool {
        self.encrypt_dictionary().encrypt_metadata
    }

    /// Whether a file key is available.
    pub fn is_authenticated(&self) -> bool {
        self.keys().is_some()
    }

    /// Handler kind name, as written in `/Filter`.
    pub fn filter_name(&self) -> &str {
        match self {
            EncryptionHandler::Standard(_) => "Standard",
            EncryptionHandler::PublicKey(_) => "Adobe.PubSec",
        }
    }
}

impl SecurityHandler for EncryptionHandler {
    fn authenticate(&mut self, auth: &Authentication<'_>) -> Result<()> {
        match self {
            EncryptionHandler::Standard(h) => h.authenticate(auth),
            EncryptionHandler::PublicKey(h) => h.authenticate(auth),
        }
    }

    fn keys(&self) -> Option<&KeyPair> {
        match self {
            EncryptionHandler::Standard(h) => h.keys(),
            EncryptionHandler::PublicKey(h) => h.keys(),
        }
    }

    fn encrypt_dictionary(&self) -> &EncryptDictionary {
        match self {
            EncryptionHandler::Standard(h) => h.encrypt_dictionary(),
            EncryptionHandler::PublicKey(h) => h.encrypt_dictionary(),
        }
    }
}

/// Builds a handler for an encryption dictionary and the first file ID.
pub type HandlerConstructor = fn(EncryptDictionary, &[u8]) -> EncryptionHandler;

fn standard_handler(dict: EncryptDictionary, file_id: &[u8]) -> EncryptionHandler {
    EncryptionHandler::Standard(StandardEncryptionHandler::new(dict, file_id.to_vec()))
}

fn public_key_handler(dict: EncryptDictionary, _file_id: &[u8]) -> EncryptionHandler {
    EncryptionHandler::PublicKey(PublicKeyEncryptionHandler::new(dict))
}

/// Registry of security handlers keyed by `/Filter` name.
///
/// `Standard` is registered by default. A name that is not registered, or
/// a missing `/Filter`, selects the public-key handler.
#[derive(Debug, Clone)]
pub struct EncryptionFactory {
    handlers: HashMap<String, HandlerConstructor>,
}

impl Default for EncryptionFactory {
    fn default() -> Self {
        let mut factory = Self {
            handlers: HashMap::new(),
        };
        factory.register("Standard", standard_handler);
        factory
    }
}

impl EncryptionFactory {
    /// Registry with the built-in handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the constructor for `filter`.
    pub fn register(&mut self, filter: impl Into<String>, constructor: HandlerConstructor) {
        self.handlers.insert(filter.into(), constructor);
    }

    /// Whether `filter` has a registered constructor.
    pub fn contains(&self, filter: &str) -> bool {
        self.handlers.contains_key(filter)
    }

    /// Build the handler for `dict`.
    pub fn create(&self, dict: EncryptDictionary, file_id: &[u8]) -> EncryptionHandler {
        let constructor = dict
            .filter
            .as_deref()
            .and_then(|name| self.handlers.get(name))
            .copied()
            .unwrap_or(public_key_handler);
        log::debug!(
            "Selected security handler for /Filter {:?}",
            dict.filter.as_deref().unwrap_or("(none)")
        );
        constructor(dict, file_id)
    }
}
