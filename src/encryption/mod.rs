//! PDF encryption support.
//!
//! Implements the security handlers of ISO 32000-1:2008 section 7.6 and
//! ISO 32000-2 for revision 6:
//!
//! - the standard (password) security handler, revisions 2 to 6, in
//!   [`standard`], with its key derivation algorithms in [`algorithms`];
//! - the public-key security handler (`adbe.pkcs7.s4`/`s5`) in
//!   [`public_key`];
//! - per-object RC4/AES ciphering in [`cipher`];
//! - the whole-document traversal in [`traverse`].
//!
//! Handlers are selected from the `/Filter` entry by an
//! [`EncryptionFactory`] and used through the [`SecurityHandler`] trait.
//!
//! Creating documents is limited to `/V 4` (RC4-128, AES-128) and `/V 5`
//! (AES-256). Reading supports `/V 1, 2, 4, 5` with `/R 2` to `6`.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use bitflags::bitflags;

pub mod aes;
pub mod algorithms;
pub mod cipher;
mod handler;
pub mod public_key;
pub mod rc4;
pub mod standard;
pub mod traverse;

pub use handler::{
    Authentication, CipherTarget, EncryptionFactory, EncryptionHandler, HandlerConstructor,
    SecurityHandler,
};
pub use public_key::{
    CertificateCallback, PublicKeyEncryptionHandler, RecipientCredentials, RecipientQuery,
};
pub use standard::StandardEncryptionHandler;

/// Bits 7-8 and 13-32 of `/P` must be set; bits 1-2 must be clear.
const RESERVED_PERMISSION_BITS: u32 = 0xFFFF_F0C0;

bitflags! {
    /// User access permissions stored in `/P` (ISO 32000-1 table 22).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u32 {
        /// Print the document (bit 3)
        const PRINT = 1 << 2;
        /// Modify contents (bit 4)
        const MODIFY = 1 << 3;
        /// Copy or extract text and graphics (bit 5)
        const COPY = 1 << 4;
        /// Add or modify annotations (bit 6)
        const ANNOTATE = 1 << 5;
        /// Fill in form fields (bit 9)
        const FILL_FORMS = 1 << 8;
        /// Extract for accessibility (bit 10)
        const EXTRACT_ACCESSIBILITY = 1 << 9;
        /// Assemble the document (bit 11)
        const ASSEMBLE = 1 << 10;
        /// Print at full quality (bit 12)
        const PRINT_HIGH_QUALITY = 1 << 11;
    }
}

impl Permissions {
    /// Signed `/P` value with the reserved bits set.
    pub fn to_p(self) -> i32 {
        (self.bits() | RESERVED_PERMISSION_BITS) as i32
    }

    /// Permissions encoded in a `/P` value.
    pub fn from_p(p: i32) -> Self {
        Self::from_bits_truncate(p as u32)
    }
}

/// Cipher applied to one class of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    /// Identity: data is stored in clear
    None,
    /// RC4 with an object key
    Rc4,
    /// AES-128-CBC with an object key
    AesV2,
    /// AES-256-CBC with the file key
    AesV3,
}

/// A resolved encryption key: cipher plus file-level key bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    /// Cipher
    pub method: CryptMethod,
    /// File encryption key
    pub raw: Vec<u8>,
}

impl EncryptionKey {
    /// Key for `method` over file key `raw`.
    pub fn new(method: CryptMethod, raw: Vec<u8>) -> Self {
        Self { method, raw }
    }

    /// The identity key.
    pub fn identity() -> Self {
        Self {
            method: CryptMethod::None,
            raw: Vec::new(),
        }
    }
}

/// Keys for streams and strings, resolved from `/StmF` and `/StrF`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    /// Key for stream data
    pub stream: EncryptionKey,
    /// Key for strings
    pub string: EncryptionKey,
}

/// Crypt filter name used for newly created standard-handler documents.
pub const STANDARD_CRYPT_FILTER: &str = "StdCF";
/// Crypt filter name used for newly created public-key documents.
pub const DEFAULT_CRYPT_FILTER: &str = "DefaultCryptFilter";

/// Parsed `/Encrypt` dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptDictionary {
    /// `/Filter`: security handler name
    pub filter: Option<String>,
    /// `/SubFilter`
    pub sub_filter: Option<String>,
    /// `/V`: algorithm version
    pub v: i64,
    /// `/R`: standard handler revision
    pub r: i64,
    /// `/Length` in bits
    pub length: usize,
    /// `/O`
    pub o: Vec<u8>,
    /// `/U`
    pub u: Vec<u8>,
    /// `/OE` (revision 6)
    pub oe: Option<Vec<u8>>,
    /// `/UE` (revision 6)
    pub ue: Option<Vec<u8>>,
    /// `/Perms` (revision 6)
    pub perms: Option<Vec<u8>>,
    /// `/P`
    pub p: i32,
    /// `/EncryptMetadata`
    pub encrypt_metadata: bool,
    /// `/CF`: crypt filters by name
    pub cf: Dictionary,
    /// `/StmF`
    pub stm_f: String,
    /// `/StrF`
    pub str_f: String,
    /// `/EFF`
    pub eff: Option<String>,
    /// CMS blobs of the public-key handler
    pub recipients: Vec<Vec<u8>>,
}

impl Default for EncryptDictionary {
    fn default() -> Self {
        Self {
            filter: None,
            sub_filter: None,
            v: 0,
            r: 0,
            length: 40,
            o: Vec::new(),
            u: Vec::new(),
            oe: None,
            ue: None,
            perms: None,
            p: Permissions::all().to_p(),
            encrypt_metadata: true,
            cf: Dictionary::new(),
            stm_f: "Identity".to_string(),
            str_f: "Identity".to_string(),
            eff: None,
            recipients: Vec::new(),
        }
    }
}

fn bytes_entry(dict: &Dictionary, key: &str) -> Option<Vec<u8>> {
    dict.get(key).and_then(Object::as_string).map(<[u8]>::to_vec)
}

fn string_array(obj: Option<&Object>) -> Vec<Vec<u8>> {
    match obj {
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(Object::as_string)
            .map(<[u8]>::to_vec)
            .collect(),
        Some(Object::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

impl EncryptDictionary {
    /// Parse an `/Encrypt` dictionary.
    pub fn from_dict(dict: &Dictionary) -> Result<Self> {
        let name = |key: &str| dict.get(key).and_then(Object::as_name).map(str::to_string);
        let int = |key: &str| dict.get(key).and_then(Object::as_integer);

        let v = int("V").unwrap_or(0);
        let cf = dict.get("CF").and_then(Object::as_dict).cloned().unwrap_or_default();

        let mut recipients = string_array(dict.get("Recipients"));
        if recipients.is_empty() {
            for filter in cf.values().filter_map(Object::as_dict) {
                recipients = string_array(filter.get("Recipients"));
                if !recipients.is_empty() {
                    break;
                }
            }
        }

        let p = int("P").unwrap_or_else(|| Permissions::all().to_p() as i64);
        let length = match int("Length") {
            Some(bits) if bits > 0 => bits as usize,
            _ if v >= 5 => 256,
            _ if v == 4 => 128,
            _ => 40,
        };

        Ok(Self {
            filter: name("Filter"),
            sub_filter: name("SubFilter"),
            v,
            r: int("R").unwrap_or(0),
            length,
            o: bytes_entry(dict, "O").unwrap_or_default(),
            u: bytes_entry(dict, "U").unwrap_or_default(),
            oe: bytes_entry(dict, "OE"),
            ue: bytes_entry(dict, "UE"),
            perms: bytes_entry(dict, "Perms"),
            p: p as i32,
            encrypt_metadata: dict
                .get("EncryptMetadata")
                .and_then(Object::as_bool)
                .unwrap_or(true),
            cf,
            stm_f: name("StmF").unwrap_or_else(|| "Identity".to_string()),
            str_f: name("StrF").unwrap_or_else(|| "Identity".to_string()),
            eff: name("EFF"),
            recipients,
        })
    }

    /// Parse from an object that must be a dictionary.
    pub fn from_object(obj: &Object) -> Result<Self> {
        Self::from_dict(obj.expect_dict()?)
    }

    /// Serialize back to a dictionary.
    pub fn to_dict(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        if let Some(filter) = &self.filter {
            dict.insert("Filter".to_string(), Object::name(filter.as_str()));
        }
        if let Some(sub_filter) = &self.sub_filter {
            dict.insert("SubFilter".to_string(), Object::name(sub_filter.as_str()));
        }
        dict.insert("V".to_string(), Object::Integer(self.v));
        if self.r > 0 {
            dict.insert("R".to_string(), Object::Integer(self.r));
        }
        dict.insert("Length".to_string(), Object::Integer(self.length as i64));
        if !self.cf.is_empty() {
            dict.insert("CF".to_string(), Object::Dictionary(self.cf.clone()));
            dict.insert("StmF".to_string(), Object::name(self.stm_f.as_str()));
            dict.insert("StrF".to_string(), Object::name(self.str_f.as_str()));
        }
        if let Some(eff) = &self.eff {
            dict.insert("EFF".to_string(), Object::name(eff.as_str()));
        }
        if !self.o.is_empty() {
            dict.insert("O".to_string(), Object::string(self.o.clone()));
        }
        if !self.u.is_empty() {
            dict.insert("U".to_string(), Object::string(self.u.clone()));
        }
        if let Some(oe) = &self.oe {
            dict.insert("OE".to_string(), Object::string(oe.clone()));
        }
        if let Some(ue) = &self.ue {
            dict.insert("UE".to_string(), Object::string(ue.clone()));
        }
        if self.filter.as_deref() == Some("Standard") || self.r > 0 {
            dict.insert("P".to_string(), Object::Integer(self.p as i64));
        }
        if let Some(perms) = &self.perms {
            dict.insert("Perms".to_string(), Object::string(perms.clone()));
        }
        if !self.encrypt_metadata {
            dict.insert("EncryptMetadata".to_string(), Object::Boolean(false));
        }
        dict
    }

    /// File key length in bytes.
    pub fn key_length(&self) -> usize {
        match self.v {
            1 => 5,
            5 => 32,
            4 => 16,
            _ => (self.length / 8).clamp(5, 16),
        }
    }

    /// Cipher for the named crypt filter.
    pub fn crypt_method(&self, filter: &str) -> Result<CryptMethod> {
        if self.v < 4 {
            return Ok(CryptMethod::Rc4);
        }
        if filter == "Identity" {
            return Ok(CryptMethod::None);
        }
        let entry = self
            .cf
            .get(filter)
            .and_then(Object::as_dict)
            .ok_or_else(|| Error::Encryption(format!("crypt filter {} not found", filter)))?;
        match entry.get("CFM").and_then(Object::as_name).unwrap_or("None") {
            "None" => Ok(CryptMethod::None),
            "V2" => Ok(CryptMethod::Rc4),
            "AESV2" => Ok(CryptMethod::AesV2),
            "AESV3" => Ok(CryptMethod::AesV3),
            other => Err(Error::Unsupported(format!("crypt filter method {}", other))),
        }
    }

    /// Resolve the stream and string keys over file key `raw`.
    pub fn key_pair(&self, raw: &[u8]) -> Result<KeyPair> {
        Ok(KeyPair {
            stream: EncryptionKey::new(self.crypt_method(&self.stm_f)?, raw.to_vec()),
            string: EncryptionKey::new(self.crypt_method(&self.str_f)?, raw.to_vec()),
        })
    }
}

/// A `/CF` entry for a crypt filter.
pub(crate) fn crypt_filter(method: &str, length: i64, recipients: Option<Vec<Vec<u8>>>) -> Object {
    let mut dict = Dictionary::new();
    dict.insert("Type".to_string(), Object::name("CryptFilter"));
    dict.insert("CFM".to_string(), Object::name(method));
    dict.insert("AuthEvent".to_string(), Object::name("DocOpen"));
    dict.insert("Length".to_string(), Object::Integer(length));
    if let Some(recipients) = recipients {
        let blobs = recipients.into_iter().map(Object::string).collect();
        dict.insert("Recipients".to_string(), Object::Array(blobs));
    }
    Object::Dictionary(dict)
}

/// Fill a buffer of `len` bytes from the operating system RNG.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    getrandom::getrandom(&mut buf)
        .map_err(|e| Error::Encryption(format!("random generator failed: {}", e)))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permissions_p_value() {
        assert_eq!(Permissions::empty().to_p(), -3904);
        assert_eq!(Permissions::all().to_p(), -4);
        assert_eq!(Permissions::from_p(-3392), Permissions::EXTRACT_ACCESSIBILITY);
        let p = (Permissions::PRINT | Permissions::COPY).to_p();
        assert_eq!(Permissions::from_p(p), Permissions::PRINT | Permissions::COPY);
    }

    #[test]
    fn test_parse_v4_dictionary() {
        let mut std_cf = Dictionary::new();
        std_cf.insert("CFM".to_string(), Object::name("AESV2"));
        let mut cf = Dictionary::new();
        cf.insert("StdCF".to_string(), Object::Dictionary(std_cf));

        let mut dict = Dictionary::new();
        dict.insert("Filter".to_string(), Object::name("Standard"));
        dict.insert("V".to_string(), Object::Integer(4));
        dict.insert("R".to_string(), Object::Integer(4));
        dict.insert("P".to_string(), Object::Integer(-3904));
        dict.insert("CF".to_string(), Object::Dictionary(cf));
        dict.insert("StmF".to_string(), Object::name("StdCF"));
        dict.insert("StrF".to_string(), Object::name("Identity"));

        let parsed = EncryptDictionary::from_dict(&dict).unwrap();
        assert_eq!(parsed.length, 128);
        assert_eq!(parsed.key_length(), 16);
        assert_eq!(parsed.crypt_method("StdCF").unwrap(), CryptMethod::AesV2);
        let keys = parsed.key_pair(&[1u8; 16]).unwrap();
        assert_eq!(keys.stream.method, CryptMethod::AesV2);
        assert_eq!(keys.string.method, CryptMethod::None);
        assert!(parsed.crypt_method("Missing").is_err());

        let reparsed = EncryptDictionary::from_dict(&parsed.to_dict()).unwrap();
        assert_eq!(reparsed, parsed);
    }

    #[test]
    fn test_legacy_versions_use_rc4() {
        let mut dict = Dictionary::new();
        dict.insert("Filter".to_string(), Object::name("Standard"));
        dict.insert("V".to_string(), Object::Integer(1));
        let parsed = EncryptDictionary::from_dict(&dict).unwrap();
        assert_eq!(parsed.key_length(), 5);
        assert_eq!(parsed.crypt_method("Identity").unwrap(), CryptMethod::Rc4);
    }

    #[test]
    fn test_random_bytes() {
        let a = random_bytes(16).unwrap();
        let b = random_bytes(16).unwrap();
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }
}
