//! Cross-reference sections.
//!
//! A revision indexes its objects either with a classic `xref` table
//! followed by a `trailer` dictionary ([`CrossReferenceTable`]) or with a
//! `/Type /XRef` stream whose dictionary doubles as the trailer
//! ([`CrossReferenceStream`]). Both are handled through the
//! [`CrossReference`] trait; [`Xref`] holds either kind.
//!
//! Trailer entries shared by both forms:
//!
//! | Key       | Meaning                                        |
//! |-----------|------------------------------------------------|
//! | `Size`    | one past the highest object number in the file |
//! | `Prev`    | offset of the previous section                 |
//! | `Root`    | catalog reference                              |
//! | `Encrypt` | encryption dictionary (usually a reference)    |
//! | `ID`      | two-element file identifier                    |
//! | `Info`    | document information dictionary                |

pub mod grouper;
pub mod stream;
pub mod table;

pub use stream::CrossReferenceStream;
pub use table::CrossReferenceTable;

use crate::document_object::DocumentObject;
use crate::object::{Dictionary, Object, ObjectRef};

/// Trailer keys in the order they are written.
pub(crate) const TRAILER_KEYS: [&str; 6] = ["Size", "Prev", "Root", "Encrypt", "ID", "Info"];

/// Common view of a cross-reference section and its trailer.
pub trait CrossReference {
    /// Trailer dictionary (the stream dictionary for xref streams).
    fn trailer(&self) -> &Dictionary;

    /// Mutable trailer dictionary.
    fn trailer_mut(&mut self) -> &mut Dictionary;

    /// Slots listed by this section.
    fn objects(&self) -> &[DocumentObject];

    /// Mutable slot list.
    fn objects_mut(&mut self) -> &mut Vec<DocumentObject>;

    /// `/Size`, or 0 when absent.
    fn size(&self) -> u32 {
        self.trailer()
            .get("Size")
            .and_then(Object::as_integer)
            .and_then(|size| u32::try_from(size).ok())
            .unwrap_or(0)
    }

    /// Set `/Size`.
    fn set_size(&mut self, size: u32) {
        self.trailer_mut()
            .insert("Size".to_string(), Object::Integer(size as i64));
    }

    /// `/Prev` offset.
    fn prev(&self) -> Option<u64> {
        self.trailer()
            .get("Prev")
            .and_then(Object::as_integer)
            .and_then(|prev| u64::try_from(prev).ok())
    }

    /// Set or clear `/Prev`.
    fn set_prev(&mut self, prev: Option<u64>) {
        set_or_remove(self.trailer_mut(), "Prev", prev.map(|p| Object::Integer(p as i64)));
    }

    /// `/Root` reference.
    fn root(&self) -> Option<ObjectRef> {
        self.trailer().get("Root").and_then(Object::as_reference)
    }

    /// Set or clear `/Root`.
    fn set_root(&mut self, root: Option<ObjectRef>) {
        set_or_remove(self.trailer_mut(), "Root", root.map(Object::Reference));
    }

    /// `/Encrypt` entry as stored.
    fn encrypt(&self) -> Option<&Object> {
        self.trailer().get("Encrypt")
    }

    /// Set or clear `/Encrypt`.
    fn set_encrypt(&mut self, encrypt: Option<Object>) {
        set_or_remove(self.trailer_mut(), "Encrypt", encrypt);
    }

    /// The two `/ID` strings.
    fn id(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        match self.trailer().get("ID").and_then(Object::as_array)?.as_slice() {
            [Object::String(first), Object::String(second), ..] => Some((first.clone(), second.clone())),
            _ => None,
        }
    }

    /// Set or clear `/ID`.
    fn set_id(&mut self, id: Option<(Vec<u8>, Vec<u8>)>) {
        let value = id.map(|(first, second)| Object::Array(vec![Object::String(first), Object::String(second)]));
        set_or_remove(self.trailer_mut(), "ID", value);
    }

    /// `/Info` reference.
    fn info(&self) -> Option<ObjectRef> {
        self.trailer().get("Info").and_then(Object::as_reference)
    }

    /// Set or clear `/Info`.
    fn set_info(&mut self, info: Option<ObjectRef>) {
        set_or_remove(self.trailer_mut(), "Info", info.map(Object::Reference));
    }

    /// Highest object number listed, if any.
    fn max_id(&self) -> Option<u32> {
        self.objects().iter().map(|obj| obj.id).max()
    }
}

fn set_or_remove(dict: &mut Dictionary, key: &str, value: Option<Object>) {
    match value {
        Some(value) => {
            dict.insert(key.to_string(), value);
        },
        None => {
            dict.shift_remove(key);
        },
    }
}

/// Trailer entries in writing order: the standard keys first, the rest as
/// they were inserted. Keys in `skip` are dropped.
pub(crate) fn ordered_trailer(trailer: &Dictionary, skip: &[&str]) -> Dictionary {
    let mut out = Dictionary::new();
    for key in TRAILER_KEYS {
        if let Some(value) = trailer.get(key) {
            out.insert(key.to_string(), value.clone());
        }
    }
    for (key, value) in trailer {
        if !out.contains_key(key) && !skip.contains(&key.as_str()) {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

/// A cross-reference section of either kind.
#[derive(Debug)]
pub enum Xref {
    /// Classic table
    Table(CrossReferenceTable),
    /// Cross-reference stream
    Stream(CrossReferenceStream),
}

impl Xref {
    /// Whether this is a cross-reference stream.
    pub fn is_stream(&self) -> bool {
        matches!(self, Xref::Stream(_))
    }
}

impl CrossReference for Xref {
    fn trailer(&self) -> &Dictionary {
        match self {
            Xref::Table(t) => t.trailer(),
            Xref::Stream(s) => s.trailer(),
        }
    }

    fn trailer_mut(&mut self) -> &mut Dictionary {
        match self {
            Xref::Table(t) => t.trailer_mut(),
            Xref::Stream(s) => s.trailer_mut(),
        }
    }

    fn objects(&self) -> &[DocumentObject] {
        match self {
            Xref::Table(t) => t.objects(),
            Xref::Stream(s) => s.objects(),
        }
    }

    fn objects_mut(&mut self) -> &mut Vec<DocumentObject> {
        match self {
            Xref::Table(t) => t.objects_mut(),
            Xref::Stream(s) => s.objects_mut(),
        }
    }
}
