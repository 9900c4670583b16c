//! Standard (password based) security handler.

use super::algorithms::{self, AesKeyEntries, KeyParams};
use super::handler::{Authentication, SecurityHandler};
use super::{crypt_filter, random_bytes, EncryptDictionary, KeyPair, STANDARD_CRYPT_FILTER};
use crate::config::{CryptAlgorithm, StandardEncryptionOptions};
use crate::error::{Error, Result};
use crate::object::Dictionary;

/// Message for creation requests below `/V 4`.
pub const UNSUPPORTED_VERSION: &str = "Encrypt mechanisms with V less than 4 are not supported.";

/// Password-based security handler, revisions 2 to 6.
#[derive(Debug, Clone)]
pub struct StandardEncryptionHandler {
    dict: EncryptDictionary,
    file_id: Vec<u8>,
    keys: Option<KeyPair>,
    owner: bool,
}

impl StandardEncryptionHandler {
    /// Handler for an existing dictionary; call `authenticate` before use.
    pub fn new(dict: EncryptDictionary, file_id: Vec<u8>) -> Self {
        Self {
            dict,
            file_id,
            keys: None,
            owner: false,
        }
    }

    /// Build the dictionary and file key for a new document.
    pub fn create(options: &StandardEncryptionOptions, file_id: &[u8]) -> Result<Self> {
        let p = options.permissions.to_p();
        let user = options.user_password.as_str();
        let owner = if options.owner_password.is_empty() {
            user
        } else {
            options.owner_password.as_str()
        };

        let mut dict = EncryptDictionary {
            filter: Some("Standard".to_string()),
            p,
            encrypt_metadata: options.encrypt_metadata,
            stm_f: STANDARD_CRYPT_FILTER.to_string(),
            str_f: STANDARD_CRYPT_FILTER.to_string(),
            ..EncryptDictionary::default()
        };

        let file_key = match options.algorithm {
            CryptAlgorithm::Rc4_40 => return Err(Error::Encryption(UNSUPPORTED_VERSION.to_string())),
            CryptAlgorithm::Rc4_128 | CryptAlgorithm::Aes128 => {
                let method = if options.algorithm == CryptAlgorithm::Aes128 {
                    "AESV2"
                } else {
                    "V2"
                };
                dict.v = 4;
                dict.r = 4;
                dict.length = 128;
                dict.cf = cf(method, 16);
                dict.o = algorithms::algorithm3(owner.as_bytes(), user.as_bytes(), 4, 128)?;
                let params = KeyParams {
                    id: file_id,
                    length: 128,
                    o: &dict.o,
                    permissions: p,
                    revision: 4,
                    encrypt_metadata: options.encrypt_metadata,
                };
                let key = algorithms::algorithm2(user.as_bytes(), &params);
                dict.u = algorithms::algorithm5(&key, file_id)?;
                key
            },
            CryptAlgorithm::Aes256 => {
                dict.v = 5;
                dict.r = 6;
                dict.length = 256;
                dict.cf = cf("AESV3", 32);
                let key = random_bytes(32)?;
                let (u, ue) = algorithms::algorithm8(user, &key)?;
                let (o, oe) = algorithms::algorithm9(owner, &key, &u)?;
                dict.perms = Some(algorithms::algorithm10(&key, p, options.encrypt_metadata)?);
                dict.u = u;
                dict.ue = Some(ue);
                dict.o = o;
                dict.oe = Some(oe);
                key
            },
        };

        log::debug!("Created standard security handler V {} R {}", dict.v, dict.r);
        let keys = dict.key_pair(&file_key)?;
        Ok(Self {
            dict,
            file_id: file_id.to_vec(),
            keys: Some(keys),
            owner: true,
        })
    }

    /// Whether the owner password was used to authenticate.
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    fn authenticate_rc4(&self, password: &str) -> Result<(Vec<u8>, bool)> {
        let params = KeyParams {
            id: &self.file_id,
            length: self.dict.length,
            o: &self.dict.o,
            permissions: self.dict.p,
            revision: self.dict.r,
            encrypt_metadata: self.dict.encrypt_metadata,
        };
        if let Some(key) = algorithms::algorithm7(password.as_bytes(), &self.dict.u, &params)? {
            return Ok((key, true));
        }
        if let Some(key) = algorithms::algorithm6(password.as_bytes(), &self.dict.u, &params)? {
            return Ok((key, false));
        }
        Err(Error::InvalidPassword)
    }

    fn authenticate_aes(&self, password: &str) -> Result<(Vec<u8>, bool)> {
        let missing = |name: &str| Error::Encryption(format!("/{} is required for revision {}", name, self.dict.r));
        let oe = self.dict.oe.as_deref().ok_or_else(|| missing("OE"))?;
        let ue = self.dict.ue.as_deref().ok_or_else(|| missing("UE"))?;
        let perms = match self.dict.perms.as_deref() {
            Some(perms) => perms,
            None if self.dict.r >= 6 => return Err(missing("Perms")),
            None => &[][..],
        };
        let recovered = algorithms::algorithm2a(
            password,
            &AesKeyEntries {
                o: &self.dict.o,
                u: &self.dict.u,
                oe,
                ue,
                perms,
                permissions: self.dict.p,
                revision: self.dict.r,
            },
        )?;
        Ok((recovered.key, recovered.owner))
    }
}

fn cf(method: &str, length: i64) -> Dictionary {
    let mut cf = Dictionary::new();
    cf.insert(STANDARD_CRYPT_FILTER.to_string(), crypt_filter(method, length, None));
    cf
}

impl SecurityHandler for StandardEncryptionHandler {
    fn authenticate(&mut self, auth: &Authentication<'_>) -> Result<()> {
        let password = auth.password.unwrap_or("");
        let (key, owner) = match (self.dict.v, self.dict.r) {
            (1 | 2 | 4, 2..=4) => self.authenticate_rc4(password)?,
            (5, 5 | 6) => self.authenticate_aes(password)?,
            (v, r) => {
                return Err(Error::Unsupported(format!(
                    "standard security handler /V {} /R {}",
                    v, r
                )))
            },
        };
        log::info!(
            "Authenticated with the {} password",
            if owner { "owner" } else { "user" }
        );
        self.keys = Some(self.dict.key_pair(&key)?);
        self.owner = owner;
        Ok(())
    }

    fn keys(&self) -> Option<&KeyPair> {
        self.keys.as_ref()
    }

    fn encrypt_dictionary(&self) -> &EncryptDictionary {
        &self.dict
    }
}
