//! Options controlling how documents are read and written.
//!
//! # Example
//!
//! ```
//! use pdf_objstore::config::{DocumentOptions, XrefStyle};
//!
//! let options = DocumentOptions::default()
//!     .with_xref(XrefStyle::Stream)
//!     .with_object_streams(true)
//!     .with_password("secret");
//! assert!(options.compress_streams);
//! ```

use crate::encryption::public_key::CertificateCallback;
use crate::encryption::Permissions;
use serde::{Deserialize, Serialize};
use x509_cert::Certificate;

/// Default limit on the number of `/Prev` links followed while parsing.
pub const DEFAULT_MAX_UPDATE_DEPTH: usize = 1024;

/// Cross-reference section style used for newly written revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XrefStyle {
    /// Classic `xref` table followed by a `trailer` dictionary
    #[default]
    Table,
    /// Cross-reference stream (PDF 1.5+)
    Stream,
}

/// Document read/write options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentOptions {
    /// Cross-reference style for new revisions
    pub xref: XrefStyle,

    /// Flate-compress cross-reference and object streams
    pub compress_streams: bool,

    /// Pack eligible new objects into a shared object stream.
    ///
    /// Only honored when `xref` is [`XrefStyle::Stream`].
    pub object_streams: bool,

    /// Password tried when opening an encrypted file
    pub password: Option<String>,

    /// Decrypt automatically while opening
    pub decrypt_on_open: bool,

    /// Maximum number of revisions followed through `/Prev`
    pub max_update_depth: usize,

    /// Encryption applied to a newly created document
    #[serde(skip)]
    pub encryption: Option<EncryptionOptions>,

    /// Resolves recipient credentials for public-key encrypted files
    #[serde(skip)]
    pub on_certificate: Option<CertificateCallback>,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            xref: XrefStyle::Table,
            compress_streams: true,
            object_streams: false,
            password: None,
            decrypt_on_open: true,
            max_update_depth: DEFAULT_MAX_UPDATE_DEPTH,
            encryption: None,
            on_certificate: None,
        }
    }
}

impl DocumentOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cross-reference style.
    pub fn with_xref(mut self, xref: XrefStyle) -> Self {
        self.xref = xref;
        self
    }

    /// Enable or disable Flate compression of generated streams.
    pub fn with_compression(mut self, enable: bool) -> Self {
        self.compress_streams = enable;
        self
    }

    /// Enable or disable object stream packing.
    pub fn with_object_streams(mut self, enable: bool) -> Self {
        self.object_streams = enable;
        self
    }

    /// Password used to open an encrypted file.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Decrypt automatically on open.
    pub fn with_decrypt_on_open(mut self, enable: bool) -> Self {
        self.decrypt_on_open = enable;
        self
    }

    /// Limit the number of revisions followed.
    pub fn with_max_update_depth(mut self, depth: usize) -> Self {
        self.max_update_depth = depth;
        self
    }

    /// Encrypt newly created documents.
    pub fn with_encryption(mut self, encryption: EncryptionOptions) -> Self {
        self.encryption = Some(encryption);
        self
    }

    /// Certificate callback for public-key decryption.
    pub fn with_certificate_callback(mut self, callback: CertificateCallback) -> Self {
        self.on_certificate = Some(callback);
        self
    }

    /// Whether new revisions should pack objects into object streams.
    pub(crate) fn packs_object_streams(&self) -> bool {
        self.object_streams && self.xref == XrefStyle::Stream
    }
}

/// Cipher used by the standard security handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CryptAlgorithm {
    /// RC4 with a 40-bit key (V 1); readable but not creatable
    Rc4_40,
    /// RC4 with a 128-bit key (V 4, `/CFM /V2`)
    Rc4_128,
    /// AES-128-CBC (V 4, `/CFM /AESV2`)
    Aes128,
    /// AES-256-CBC (V 5 R 6, `/CFM /AESV3`)
    #[default]
    Aes256,
}

impl CryptAlgorithm {
    /// The `/V` value this algorithm is written with.
    pub fn version(self) -> i64 {
        match self {
            CryptAlgorithm::Rc4_40 => 1,
            CryptAlgorithm::Rc4_128 | CryptAlgorithm::Aes128 => 4,
            CryptAlgorithm::Aes256 => 5,
        }
    }
}

/// Password-based encryption settings.
#[derive(Debug, Clone)]
pub struct StandardEncryptionOptions {
    /// Password needed to open the document
    pub user_password: String,
    /// Password granting full access
    pub owner_password: String,
    /// Cipher
    pub algorithm: CryptAlgorithm,
    /// Permissions granted to the user password
    pub permissions: Permissions,
    /// Encrypt `/Type /Metadata` streams
    pub encrypt_metadata: bool,
}

impl Default for StandardEncryptionOptions {
    fn default() -> Self {
        Self {
            user_password: String::new(),
            owner_password: String::new(),
            algorithm: CryptAlgorithm::Aes256,
            permissions: Permissions::all(),
            encrypt_metadata: true,
        }
    }
}

impl StandardEncryptionOptions {
    /// Settings with the given passwords and defaults otherwise.
    pub fn new(user_password: impl Into<String>, owner_password: impl Into<String>) -> Self {
        Self {
            user_password: user_password.into(),
            owner_password: owner_password.into(),
            ..Self::default()
        }
    }

    /// Select the cipher.
    pub fn with_algorithm(mut self, algorithm: CryptAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the user permissions.
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Leave metadata streams in clear text.
    pub fn with_encrypt_metadata(mut self, enable: bool) -> Self {
        self.encrypt_metadata = enable;
        self
    }
}

/// Certificate-based encryption settings.
#[derive(Debug, Clone)]
pub struct PublicKeyEncryptionOptions {
    /// Recipient certificates (RSA keys)
    pub recipients: Vec<Certificate>,
    /// Permissions granted to every recipient
    pub permissions: Permissions,
    /// Encrypt `/Type /Metadata` streams
    pub encrypt_metadata: bool,
}

impl PublicKeyEncryptionOptions {
    /// Settings for the given recipients.
    pub fn new(recipients: Vec<Certificate>) -> Self {
        Self {
            recipients,
            permissions: Permissions::all(),
            encrypt_metadata: true,
        }
    }

    /// Set the recipient permissions.
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }
}

/// Encryption requested for a new document.
#[derive(Debug, Clone)]
pub enum EncryptionOptions {
    /// Standard (password) security handler
    Standard(StandardEncryptionOptions),
    /// Public-key security handler
    PublicKey(PublicKeyEncryptionOptions),
}
