#![allow(clippy::enum_variant_names)]
#![warn(missing_docs)]

//! # pdf_objstore
//!
//! A PDF object store: the layer below pages and content that reads, edits
//! and writes indirect objects.
//!
//! ## Features
//! - **Revisions**: every `/Prev`-linked cross-reference section becomes a
//!   revision; newer revisions hide older ones, and edits are saved as
//!   incremental updates that leave the original bytes untouched
//! - **Cross-reference tables and streams**, including hybrid files
//!   (`/XRefStm`) and lenient reading of damaged tables
//! - **Object streams**: lazy, memoized decoding on read and optional
//!   packing on write
//! - **Encryption**: the standard security handler (RC4 and AES, revisions
//!   2 to 6) and the public-key handler (`adbe.pkcs7.s4`/`s5`), applied on
//!   open and on write
//!
//! ## Quick Start
//!
//! ```
//! use pdf_objstore::config::{DocumentOptions, XrefStyle};
//! use pdf_objstore::{Dictionary, Document, Object};
//!
//! # fn main() -> pdf_objstore::Result<()> {
//! let options = DocumentOptions::default().with_xref(XrefStyle::Stream);
//! let mut doc = Document::with_options(options)?;
//!
//! let mut catalog = Dictionary::new();
//! catalog.insert("Type".to_string(), Object::name("Catalog"));
//! let root = doc.create_dictionary(catalog);
//! doc.set_root(root);
//! let first = doc.to_pdf()?;
//!
//! // Reopen and append an incremental update
//! let mut doc = Document::from_pdf(first.clone())?;
//! let note = doc.append(Object::string(b"hello".to_vec()));
//! doc.modify(root)?
//!     .as_dict_mut()
//!     .map(|dict| dict.insert("Note".to_string(), Object::Reference(note)));
//! let second = doc.to_pdf()?;
//!
//! assert!(second.starts_with(&first));
//! assert_eq!(Document::from_pdf(second)?.revision_count(), 2);
//! # Ok(())
//! # }
//! ```

// Error handling
pub mod error;

// Value model and syntax
pub mod lexer;
pub mod object;
pub mod parser;

// Byte cursors shared by the readers and writers
pub mod cursor;

// Stream filters
pub mod decoders;

// Serialization
pub mod writer;

// Options
pub mod config;

// Object store
pub mod document;
pub mod document_object;
pub mod objstm;
pub mod update;
pub mod xref;

// Security handlers
pub mod encryption;

pub use config::{DocumentOptions, EncryptionOptions, XrefStyle};
pub use document::{Document, PdfVersion, Revision};
pub use document_object::{DocumentObject, ObjectStatus};
pub use error::{Error, Result};
pub use object::{Dictionary, Object, ObjectRef};
pub use update::DocumentUpdate;

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with("0."));
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "pdf_objstore");
    }
}
