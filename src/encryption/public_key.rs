//! Public-key security handler (ISO 32000-1 section 7.6.4).
//!
//! `/Filter /Adobe.PubSec` documents carry one CMS `EnvelopedData` blob per
//! group of recipients. Each blob encrypts a 20-byte seed followed by the
//! 4-byte permission value; the file key is a hash over the seed and all
//! blobs:
//!
//! ```text
//! key = SHA-256(seed || blob_1 || ... || blob_n [|| FF FF FF FF])   (V 5, s5)
//! key = SHA-1(seed || blob_1 || ... || blob_n [|| FF FF FF FF])     (V 4, s4)
//! ```
//!
//! The trailing `FFFFFFFF` is present when metadata is left in clear.
//!
//! Recipients are resolved through a [`CertificateCallback`]: for every
//! key-transport recipient of a blob the callback receives the issuer and
//! serial number and may hand back the matching certificate and RSA key.

use super::aes::{cbc_decrypt, cbc_encrypt};
use super::handler::{Authentication, SecurityHandler};
use super::{crypt_filter, random_bytes, EncryptDictionary, KeyPair, Permissions, DEFAULT_CRYPT_FILTER};
use crate::config::PublicKeyEncryptionOptions;
use crate::error::{Error, Result};
use cms::cert::IssuerAndSerialNumber;
use cms::content_info::{CmsVersion, ContentInfo};
use cms::enveloped_data::{
    EncryptedContentInfo, EnvelopedData, KeyTransRecipientInfo, RecipientIdentifier,
    RecipientInfo, RecipientInfos,
};
use const_oid::ObjectIdentifier;
use der::asn1::{OctetString, SetOfVec};
use der::{Any, Decode, Encode};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::Certificate;

/// Raised when no recipient of any blob matches the offered credentials.
pub const NO_RECIPIENT: &str = "Can not find a recipient";
/// Raised when a public-key document is opened without a callback.
pub const NO_PRIVATE_KEY: &str = "Cannot get certificate private key";

const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
const ID_ENVELOPED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.3");
const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const AES128_CBC: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.1.2");
const AES256_CBC: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.1.42");

const SEED_LEN: usize = 20;

/// What the callback learns about one key-transport recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientQuery {
    /// Issuer distinguished name (RFC 4514)
    pub issuer: String,
    /// Certificate serial number, upper-case hex
    pub serial_number: String,
    /// Key-encryption algorithm OID, dotted
    pub key_encryption_algorithm: String,
}

/// Certificate and private key of a recipient.
#[derive(Debug, Clone)]
pub struct RecipientCredentials {
    /// The recipient's X.509 certificate
    pub certificate: Certificate,
    /// RSA private key matching the certificate
    pub private_key: RsaPrivateKey,
}

type ResolveFn = dyn Fn(&RecipientQuery) -> Option<RecipientCredentials> + Send + Sync;

/// Resolves recipient credentials while opening a public-key document.
#[derive(Clone)]
pub struct CertificateCallback(Arc<ResolveFn>);

impl CertificateCallback {
    /// Wrap a resolver function.
    pub fn new<F>(resolve: F) -> Self
    where
        F: Fn(&RecipientQuery) -> Option<RecipientCredentials> + Send + Sync + 'static,
    {
        Self(Arc::new(resolve))
    }

    /// Callback that always answers with `credentials`.
    pub fn from_credentials(credentials: RecipientCredentials) -> Self {
        Self::new(move |_| Some(credentials.clone()))
    }

    /// Ask for the credentials of one recipient.
    pub fn call(&self, query: &RecipientQuery) -> Option<RecipientCredentials> {
        (self.0)(query)
    }
}

impl fmt::Debug for CertificateCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CertificateCallback(..)")
    }
}

/// Certificate based security handler.
#[derive(Debug, Clone)]
pub struct PublicKeyEncryptionHandler {
    dict: EncryptDictionary,
    keys: Option<KeyPair>,
    permissions: Option<Permissions>,
}

impl PublicKeyEncryptionHandler {
    /// Handler for an existing dictionary; call `authenticate` before use.
    pub fn new(dict: EncryptDictionary) -> Self {
        Self {
            dict,
            keys: None,
            permissions: None,
        }
    }

    /// Envelope a fresh seed for every recipient (`adbe.pkcs7.s5`, AES-256).
    pub fn create(options: &PublicKeyEncryptionOptions) -> Result<Self> {
        if options.recipients.is_empty() {
            return Err(Error::Encryption(
                "public-key encryption needs at least one recipient".to_string(),
            ));
        }

        let p = options.permissions.to_p();
        let mut content = random_bytes(SEED_LEN)?;
        let seed = content.clone();
        content.extend_from_slice(&p.to_be_bytes());

        let recipients = options
            .recipients
            .iter()
            .map(|cert| envelope(&content, cert))
            .collect::<Result<Vec<_>>>()?;

        let mut cf = crate::object::Dictionary::new();
        cf.insert(
            DEFAULT_CRYPT_FILTER.to_string(),
            crypt_filter("AESV3", 32, Some(recipients.clone())),
        );
        let dict = EncryptDictionary {
            filter: Some("Adobe.PubSec".to_string()),
            sub_filter: Some("adbe.pkcs7.s5".to_string()),
            v: 5,
            length: 256,
            p,
            encrypt_metadata: options.encrypt_metadata,
            cf,
            stm_f: DEFAULT_CRYPT_FILTER.to_string(),
            str_f: DEFAULT_CRYPT_FILTER.to_string(),
            recipients,
            ..EncryptDictionary::default()
        };

        let key = derive_key(&dict, &seed);
        log::debug!(
            "Created public-key security handler for {} recipient(s)",
            dict.recipients.len()
        );
        Ok(Self {
            keys: Some(dict.key_pair(&key)?),
            permissions: Some(options.permissions),
            dict,
        })
    }

    /// Permissions granted by the matched recipient blob.
    pub fn permissions(&self) -> Option<Permissions> {
        self.permissions
    }

    fn open_seed(&self, callback: &CertificateCallback) -> Result<Vec<u8>> {
        for blob in &self.dict.recipients {
            let enveloped = parse_enveloped(blob)?;
            for info in enveloped.recip_infos.0.iter() {
                let RecipientInfo::Ktri(ktri) = info else {
                    continue;
                };
                let RecipientIdentifier::IssuerAndSerialNumber(id) = &ktri.rid else {
                    continue;
                };
                let query = RecipientQuery {
                    issuer: id.issuer.to_string(),
                    serial_number: hex_upper(id.serial_number.as_bytes()),
                    key_encryption_algorithm: ktri.key_enc_alg.oid.to_string(),
                };
                let Some(credentials) = callback.call(&query) else {
                    continue;
                };
                let tbs = &credentials.certificate.tbs_certificate;
                if tbs.issuer != id.issuer || tbs.serial_number != id.serial_number {
                    log::debug!("Credentials for {} do not match the recipient", query.issuer);
                    continue;
                }

                let cek = credentials
                    .private_key
                    .decrypt(Pkcs1v15Encrypt, ktri.enc_key.as_bytes())?;
                let content = open_content(&enveloped.encrypted_content, &cek)?;
                if content.len() < SEED_LEN {
                    return Err(Error::Encryption(format!(
                        "recipient content of {} bytes is shorter than the seed",
                        content.len()
                    )));
                }
                log::info!("Matched public-key recipient issued by {}", query.issuer);
                return Ok(content);
            }
        }
        Err(Error::Encryption(NO_RECIPIENT.to_string()))
    }
}

impl SecurityHandler for PublicKeyEncryptionHandler {
    fn authenticate(&mut self, auth: &Authentication<'_>) -> Result<()> {
        let callback = auth
            .on_certificate
            .ok_or_else(|| Error::Encryption(NO_PRIVATE_KEY.to_string()))?;
        if !matches!(self.dict.v, 4 | 5) {
            return Err(Error::Unsupported(format!("public-key security handler /V {}", self.dict.v)));
        }

        let content = self.open_seed(callback)?;
        let (seed, rest) = content.split_at(SEED_LEN);
        if let Some(p) = rest.get(..4) {
            let p = i32::from_be_bytes([p[0], p[1], p[2], p[3]]);
            self.permissions = Some(Permissions::from_p(p));
        }
        let key = derive_key(&self.dict, seed);
        self.keys = Some(self.dict.key_pair(&key)?);
        Ok(())
    }

    fn keys(&self) -> Option<&KeyPair> {
        self.keys.as_ref()
    }

    fn encrypt_dictionary(&self) -> &EncryptDictionary {
        &self.dict
    }
}

fn derive_key(dict: &EncryptDictionary, seed: &[u8]) -> Vec<u8> {
    fn hash<D: Digest>(dict: &EncryptDictionary, seed: &[u8]) -> Vec<u8> {
        let mut hasher = D::new();
        hasher.update(seed);
        for blob in &dict.recipients {
            hasher.update(blob);
        }
        if !dict.encrypt_metadata {
            hasher.update([0xFF; 4]);
        }
        hasher.finalize().to_vec()
    }

    if dict.v >= 5 {
        hash::<Sha256>(dict, seed)
    } else {
        let mut key = hash::<Sha1>(dict, seed);
        key.truncate(dict.key_length());
        key
    }
}

fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

fn parse_enveloped(blob: &[u8]) -> Result<EnvelopedData> {
    let info = ContentInfo::from_der(blob)?;
    if info.content_type != ID_ENVELOPED_DATA {
        return Err(Error::Encryption(format!(
            "recipient blob holds {} instead of enveloped data",
            info.content_type
        )));
    }
    Ok(EnvelopedData::from_der(&info.content.to_der()?)?)
}

fn open_content(content: &EncryptedContentInfo, cek: &[u8]) -> Result<Vec<u8>> {
    let alg = &content.content_enc_alg;
    if alg.oid != AES256_CBC && alg.oid != AES128_CBC {
        return Err(Error::Unsupported(format!("content encryption {}", alg.oid)));
    }
    let iv = alg
        .parameters
        .as_ref()
        .ok_or_else(|| Error::Encryption("content encryption without IV".to_string()))?;
    let iv = OctetString::from_der(&iv.to_der()?)?;
    let data = content
        .encrypted_content
        .as_ref()
        .ok_or_else(|| Error::Encryption("enveloped data without content".to_string()))?;
    cbc_decrypt(cek, iv.as_bytes(), data.as_bytes())
}

/// CMS `EnvelopedData` of `content` for one recipient certificate.
fn envelope(content: &[u8], cert: &Certificate) -> Result<Vec<u8>> {
    let tbs = &cert.tbs_certificate;
    let public_key = RsaPublicKey::from_public_key_der(&tbs.subject_public_key_info.to_der()?)
        .map_err(|e| Error::Encryption(format!("recipient key is not RSA: {}", e)))?;

    let cek = random_bytes(32)?;
    let iv = random_bytes(16)?;
    let encrypted_key = public_key.encrypt(&mut rsa::rand_core::OsRng, Pkcs1v15Encrypt, &cek)?;
    let ciphertext = cbc_encrypt(&cek, &iv, content)?;

    let recipient = RecipientInfo::Ktri(KeyTransRecipientInfo {
        version: CmsVersion::V0,
        rid: RecipientIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: tbs.issuer.clone(),
            serial_number: tbs.serial_number.clone(),
        }),
        key_enc_alg: AlgorithmIdentifierOwned {
            oid: RSA_ENCRYPTION,
            parameters: Some(Any::from_der(&der::asn1::Null.to_der()?)?),
        },
        enc_key: OctetString::new(encrypted_key)?,
    });

    let enveloped = EnvelopedData {
        version: CmsVersion::V0,
        originator_info: None,
        recip_infos: RecipientInfos(SetOfVec::try_from(vec![recipient])?),
        encrypted_content: EncryptedContentInfo {
            content_type: ID_DATA,
            content_enc_alg: AlgorithmIdentifierOwned {
                oid: AES256_CBC,
                parameters: Some(Any::from_der(&OctetString::new(iv)?.to_der()?)?),
            },
            encrypted_content: Some(OctetString::new(ciphertext)?),
        },
        unprotected_attrs: None,
    };

    let info = ContentInfo {
        content_type: ID_ENVELOPED_DATA,
        content: Any::from_der(&enveloped.to_der()?)?,
    };
    Ok(info.to_der()?)
}
