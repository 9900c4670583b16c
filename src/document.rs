//! The object store.
//!
//! A [`Document`] is an arena of revisions ([`DocumentUpdate`]) over the
//! bytes it was parsed from. Revision 0 is the oldest; the last one is the
//! head. Lookups go through the head's merged index, so newer revisions hide
//! older ones and deleted objects disappear.
//!
//! Mutations never touch a revision that has already been written. The
//! first change after a save (or after parsing) opens a new head revision,
//! which is appended as an incremental update by [`Document::to_pdf`].
//!
//! ```
//! use pdf_objstore::{Dictionary, Document, Object};
//!
//! # fn main() -> pdf_objstore::Result<()> {
//! let mut doc = Document::new();
//! let mut catalog = Dictionary::new();
//! catalog.insert("Type".to_string(), Object::name("Catalog"));
//! let root = doc.create_dictionary(catalog);
//! doc.set_root(root);
//!
//! let bytes = doc.to_pdf()?;
//! let reopened = Document::from_pdf(bytes)?;
//! assert_eq!(reopened.catalog()?.type_entry(), Some("Catalog"));
//! # Ok(())
//! # }
//! ```

use crate::config::{DocumentOptions, EncryptionOptions, XrefStyle};
use crate::cursor::ByteReader;
use crate::document_object::{DocumentObject, ObjectStatus, FREE_GENERATION};
use crate::encryption::{
    random_bytes, traverse, Authentication, EncryptDictionary, EncryptionFactory,
    EncryptionHandler, PublicKeyEncryptionHandler, SecurityHandler, StandardEncryptionHandler,
};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::objstm::CompressedObject;
use crate::parser::parse_indirect_at;
use crate::update::{self, DocumentUpdate, SlotIndex, WriteContext};
use crate::xref::CrossReference;
use bytes::Bytes;
use std::fmt;
use std::path::Path;

/// The header must start within this many bytes.
const HEADER_SEARCH_LEN: usize = 1024;

/// Maximum reference hops while resolving a value.
const MAX_RESOLVE_DEPTH: u32 = 32;

/// Length of each generated `/ID` string.
const FILE_ID_LEN: usize = 16;

/// Trailer entries carried into a new revision.
const INHERITED_TRAILER_KEYS: [&str; 4] = ["Root", "Encrypt", "ID", "Info"];

/// PDF version from the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PdfVersion {
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
}

impl PdfVersion {
    /// Create a version.
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Whether cross-reference and object streams may appear (1.5+).
    pub fn supports_xref_streams(self) -> bool {
        self >= PdfVersion::new(1, 5)
    }

    /// Read the version from a `%PDF-x.y` header within the first 1024 bytes.
    pub fn from_header(data: &[u8]) -> Result<Self> {
        let window = &data[..data.len().min(HEADER_SEARCH_LEN)];
        let pos = ByteReader::new(window, 0).find(b"%PDF-").ok_or_else(|| {
            let shown = &window[..window.len().min(8)];
            Error::InvalidHeader(String::from_utf8_lossy(shown).into_owned())
        })?;
        if pos > 0 {
            log::warn!("Skipping {} bytes before the PDF header", pos);
        }

        let mut reader = ByteReader::new(data, pos + 5);
        let invalid = || Error::InvalidHeader(String::from_utf8_lossy(&data[pos..(pos + 8).min(data.len())]).into_owned());
        let major = reader.read_uint().map_err(|_| invalid())?;
        reader.expect_keyword(b".").map_err(|_| invalid())?;
        let minor = reader.read_uint().map_err(|_| invalid())?;
        match (u8::try_from(major), u8::try_from(minor)) {
            (Ok(major), Ok(minor)) => Ok(PdfVersion::new(major, minor)),
            _ => Err(invalid()),
        }
    }
}

impl Default for PdfVersion {
    fn default() -> Self {
        PdfVersion::new(1, 7)
    }
}

impl fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Offset named by the last `startxref` in the file.
fn find_startxref(data: &[u8]) -> Result<u64> {
    let pos = ByteReader::new(data, data.len())
        .find_backward(b"startxref")
        .ok_or_else(|| Error::InvalidXref("startxref not found".to_string()))?;
    let mut reader = ByteReader::new(data, pos + b"startxref".len());
    reader.skip_whitespace();
    reader.read_uint()
}

/// A PDF file as a store of indirect objects across revisions.
#[derive(Debug)]
pub struct Document {
    version: PdfVersion,
    source: Bytes,
    updates: Vec<DocumentUpdate>,
    options: DocumentOptions,
    factory: EncryptionFactory,
    handler: Option<EncryptionHandler>,
    decrypted: bool,
    wrong_structure: bool,
    view: Option<Bytes>,
}

impl Default for Document {
    fn default() -> Self {
        Self::empty(DocumentOptions::default())
    }
}

impl Document {
    /// An empty PDF 1.7 document with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty document. Encryption named in `options` is applied right away.
    pub fn with_options(options: DocumentOptions) -> Result<Self> {
        let encryption = options.encryption.clone();
        let mut doc = Self::empty(options);
        if let Some(encryption) = encryption {
            doc.encrypt(encryption)?;
        }
        Ok(doc)
    }

    fn empty(options: DocumentOptions) -> Self {
        let stream = options.xref == XrefStyle::Stream;
        Self {
            version: PdfVersion::default(),
            source: Bytes::new(),
            updates: vec![DocumentUpdate::new(stream, None)],
            options,
            factory: EncryptionFactory::new(),
            handler: None,
            decrypted: false,
            wrong_structure: false,
            view: None,
        }
    }

    /// Parse a document with default options.
    pub fn from_pdf(data: impl Into<Bytes>) -> Result<Self> {
        Self::from_pdf_with_options(data, DocumentOptions::default())
    }

    /// Parse a document: header, the revision chain from the last
    /// `startxref`, and (when enabled and needed) decryption.
    pub fn from_pdf_with_options(data: impl Into<Bytes>, options: DocumentOptions) -> Result<Self> {
        Self::parse(data.into(), options, EncryptionFactory::new())
    }

    /// Like [`Document::from_pdf_with_options`] with a custom handler registry.
    pub fn from_pdf_with_factory(
        data: impl Into<Bytes>,
        options: DocumentOptions,
        factory: EncryptionFactory,
    ) -> Result<Self> {
        Self::parse(data.into(), options, factory)
    }

    fn parse(source: Bytes, options: DocumentOptions, factory: EncryptionFactory) -> Result<Self> {
        let version = PdfVersion::from_header(&source)?;
        let start = find_startxref(&source)?;
        let chain = update::parse_chain(&source, start, version, options.max_update_depth)?;

        let mut doc = Self {
            version,
            view: Some(source.clone()),
            source,
            updates: chain.updates,
            options,
            factory,
            handler: None,
            decrypted: false,
            wrong_structure: chain.wrong_structure,
        };
        if doc.options.decrypt_on_open && doc.is_encrypted() {
            doc.decrypt()?;
        }
        Ok(doc)
    }

    /// Read and parse a file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_pdf(std::fs::read(path)?)
    }

    /// Serialize and write to `path`.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.to_pdf()?;
        std::fs::write(path, &bytes)?;
        Ok(())
    }

    /// Header version.
    pub fn version(&self) -> PdfVersion {
        self.version
    }

    /// Change the header version written for a new document.
    pub fn set_version(&mut self, version: PdfVersion) {
        self.version = version;
        self.view = None;
    }

    /// Options in effect.
    pub fn options(&self) -> &DocumentOptions {
        &self.options
    }

    /// Handler registry used when binding a security handler.
    pub fn encryption_factory_mut(&mut self) -> &mut EncryptionFactory {
        &mut self.factory
    }

    /// Whether parsing found revisions out of order or objects past their
    /// own cross-reference section.
    pub fn wrong_structure(&self) -> bool {
        self.wrong_structure
    }

    /// Bytes the document was parsed from (empty for new documents).
    pub fn source(&self) -> &Bytes {
        &self.source
    }

    fn head(&self) -> usize {
        self.updates.len() - 1
    }

    /// Index of a head revision that may be changed, opening a new one when
    /// the current head has been written.
    fn head_mut(&mut self) -> usize {
        if self.updates[self.head()].written {
            self.create_update();
        }
        self.view = None;
        self.head()
    }

    /// Open a new head revision chained to the current one. The new
    /// revision inherits `/Root`, `/Encrypt`, `/ID` and `/Info`.
    pub fn create_update(&mut self) -> usize {
        let previous = self.head();
        let mut update = DocumentUpdate::new(self.options.xref == XrefStyle::Stream, Some(previous));
        let trailer = self.updates[previous].xref.trailer();
        for key in INHERITED_TRAILER_KEYS {
            if let Some(value) = trailer.get(key) {
                update.xref.trailer_mut().insert(key.to_string(), value.clone());
            }
        }
        self.updates.push(update);
        self.view = None;
        log::debug!("Opened revision {}", self.head());
        self.head()
    }

    /// Number of revisions.
    pub fn revision_count(&self) -> usize {
        self.updates.len()
    }

    /// Revision `index` (0 is the oldest).
    pub fn revision(&self, index: usize) -> Option<Revision<'_>> {
        (index < self.updates.len()).then_some(Revision {
            document: self,
            index,
        })
    }

    /// The newest revision.
    pub fn head_revision(&self) -> Revision<'_> {
        Revision {
            document: self,
            index: self.head(),
        }
    }

    /// All revisions, oldest first.
    pub fn revisions(&self) -> impl Iterator<Item = Revision<'_>> + '_ {
        (0..self.updates.len()).map(move |index| Revision {
            document: self,
            index,
        })
    }

    /// Trailer of the head revision.
    pub fn trailer(&self) -> &Dictionary {
        self.updates[self.head()].xref.trailer()
    }

    /// `/Root` of the head revision.
    pub fn root(&self) -> Option<ObjectRef> {
        self.updates[self.head()].xref.root()
    }

    /// Set `/Root`.
    pub fn set_root(&mut self, root: ObjectRef) {
        let head = self.head_mut();
        self.updates[head].xref.set_root(Some(root));
    }

    /// Set or clear `/Info`.
    pub fn set_info(&mut self, info: Option<ObjectRef>) {
        let head = self.head_mut();
        self.updates[head].xref.set_info(info);
    }

    /// The catalog dictionary.
    pub fn catalog(&self) -> Result<&Object> {
        let root = self
            .root()
            .ok_or_else(|| Error::InvalidXref("trailer has no /Root".to_string()))?;
        self.get_value(root)
    }

    /// Next unused object number.
    fn next_id(&self) -> u32 {
        self.updates
            .iter()
            .map(|update| {
                let listed = update.xref.max_id().map_or(0, |id| id.saturating_add(1));
                update.xref.size().max(listed)
            })
            .max()
            .unwrap_or(0)
            .max(1)
    }

    fn lookup(&self, head: usize, id: u32) -> Option<SlotIndex> {
        update::merged_index(&self.updates, head).get(&id).copied()
    }

    fn slot(&self, (update, slot): SlotIndex) -> &DocumentObject {
        &self.updates[update].xref.objects()[slot]
    }

    /// Slot of `reference` seen from revision `head`, checking the generation.
    ///
    /// Modified objects carry a higher generation than the copies they
    /// replace, so a reference to an older generation of the live object
    /// resolves to it. A newer generation than the live one is not found.
    fn locate_in(&self, head: usize, reference: ObjectRef) -> Result<SlotIndex> {
        let not_found = Error::ObjectNotFound(reference.id, reference.gen);
        let at = self.lookup(head, reference.id).ok_or(not_found)?;
        let generation = self.slot(at).generation;
        if generation < reference.gen {
            log::debug!("{} requested but object {} has generation {}", reference, reference.id, generation);
            return Err(Error::ObjectNotFound(reference.id, reference.gen));
        }
        Ok(at)
    }

    /// Live slot for object number `id`.
    pub fn get_object(&self, id: u32) -> Option<&DocumentObject> {
        self.lookup(self.head(), id).map(|at| self.slot(at))
    }

    /// All live slots of the head, ordered by object number.
    pub fn objects(&self) -> Vec<&DocumentObject> {
        update::merged_index(&self.updates, self.head())
            .values()
            .map(|&at| self.slot(at))
            .collect()
    }

    /// Value of `reference`, loading it on first access.
    pub fn get_value(&self, reference: ObjectRef) -> Result<&Object> {
        self.value_in(self.head(), reference)
    }

    fn value_in(&self, head: usize, reference: ObjectRef) -> Result<&Object> {
        let at = self.locate_in(head, reference)?;
        self.load(at, 0)
    }

    /// Follow references until a direct value is reached.
    pub fn resolve<'a>(&'a self, object: &'a Object) -> Result<&'a Object> {
        let mut current = object;
        let mut hops = 0;
        while let Object::Reference(reference) = current {
            hops += 1;
            if hops > MAX_RESOLVE_DEPTH {
                return Err(Error::CircularReference(format!("reference chain through {}", reference)));
            }
            current = self.get_value(*reference)?;
        }
        Ok(current)
    }

    fn load(&self, at: SlotIndex, depth: u32) -> Result<&Object> {
        if depth > MAX_RESOLVE_DEPTH {
            return Err(Error::RecursionLimitExceeded(MAX_RESOLVE_DEPTH));
        }
        self.slot(at).get_or_load(|| self.read_slot(at, depth))
    }

    fn read_slot(&self, at: SlotIndex, depth: u32) -> Result<Object> {
        let slot = self.slot(at);
        match slot.status {
            ObjectStatus::InUse => {
                let (reference, mut value) = self.parse_at(slot.offset)?;
                if reference.id != slot.id {
                    return Err(Error::parse(
                        slot.offset as usize,
                        format!("expected object {} but found {}", slot.id, reference),
                    ));
                }
                self.fix_stream_length(at.0, &mut value);
                Ok(value)
            },
            ObjectStatus::Compressed => {
                let host_id = self.host_of(slot)?;
                let host_at = self
                    .lookup(at.0, host_id)
                    .ok_or(Error::ObjectNotFound(host_id, 0))?;
                let host = self.slot(host_at);
                if host.status != ObjectStatus::InUse {
                    return Err(Error::InvalidXref(format!(
                        "object stream {} holding object {} is not stored directly",
                        host_id, slot.id
                    )));
                }
                let host_value = self.load(host_at, depth + 1)?;
                let stream = host.object_stream(|| CompressedObject::from_stream(host_value))?;
                let index = slot.index as usize;
                let found = stream.id_at(index)?;
                if found != slot.id {
                    log::warn!(
                        "Object stream {} lists object {} at index {}, expected {}",
                        host_id,
                        found,
                        index,
                        slot.id
                    );
                }
                stream.get_value(index)
            },
            ObjectStatus::Free | ObjectStatus::Null => Err(Error::ObjectNotFound(slot.id, slot.generation)),
        }
    }

    fn host_of(&self, slot: &DocumentObject) -> Result<u32> {
        match u32::try_from(slot.offset) {
            Ok(host) if host != slot.id => Ok(host),
            _ => Err(Error::InvalidXref(format!(
                "object {} names object stream {}",
                slot.id, slot.offset
            ))),
        }
    }

    fn parse_at(&self, offset: u64) -> Result<(ObjectRef, Object)> {
        let at = usize::try_from(offset)
            .map_err(|_| Error::InvalidXref(format!("offset {} out of range", offset)))?;
        let (reference, value, _) = parse_indirect_at(&self.source, at)?;
        Ok((reference, value))
    }

    /// Cut stream data to an indirect `/Length`. Failures keep the data the
    /// parser found.
    fn fix_stream_length(&self, update: usize, value: &mut Object) {
        let Object::Stream { dict, data } = value else {
            return;
        };
        let Some(Object::Reference(length)) = dict.get("Length") else {
            return;
        };
        match self.raw_length(update, *length) {
            Ok(len) if len <= data.len() => *data = data.slice(..len),
            Ok(len) => log::warn!("/Length {} is longer than the {} bytes found", len, data.len()),
            Err(e) => log::warn!("Cannot resolve /Length {}: {}", length, e),
        }
    }

    /// Read an integer object without caching, so that resolving a length
    /// never re-enters a slot being loaded.
    fn raw_length(&self, update: usize, reference: ObjectRef) -> Result<usize> {
        let at = self.locate_in(update, reference)?;
        let slot = self.slot(at);
        let length = match (slot.value(), slot.status) {
            (Some(value), _) => value.as_integer(),
            (None, ObjectStatus::InUse) => self.parse_at(slot.offset)?.1.as_integer(),
            (None, ObjectStatus::Compressed) => {
                let host_id = self.host_of(slot)?;
                let host_at = self
                    .lookup(update, host_id)
                    .ok_or(Error::ObjectNotFound(host_id, 0))?;
                let host = self.slot(host_at);
                let host_value = match host.value() {
                    Some(value) => value.clone(),
                    None => self.parse_at(host.offset)?.1,
                };
                CompressedObject::from_stream(&host_value)?
                    .get_value(slot.index as usize)?
                    .as_integer()
            },
            (None, _) => None,
        };
        length
            .and_then(|len| usize::try_from(len).ok())
            .ok_or_else(|| Error::object_type("non-negative Integer", "other"))
    }

    /// Add `value` as a new object with generation 0.
    pub fn append(&mut self, value: Object) -> ObjectRef {
        let id = self.next_id();
        let head = self.head_mut();
        let update = &mut self.updates[head];
        update.xref.objects_mut().push(DocumentObject::with_value(id, 0, value));
        update.reset_index();
        ObjectRef::new(id, 0)
    }

    /// Add a dictionary object.
    pub fn create_dictionary(&mut self, dict: Dictionary) -> ObjectRef {
        self.append(Object::Dictionary(dict))
    }

    /// Add a stream object. `data` is stored as given (already encoded).
    pub fn create_stream(&mut self, dict: Dictionary, data: impl Into<Bytes>) -> ObjectRef {
        self.append(Object::stream(dict, data))
    }

    /// Mutable value of `reference` in the head revision.
    ///
    /// An object from an older revision is copied into the head with its
    /// generation bumped; `get_object(id)` gives the new reference.
    /// References to the previous generation keep resolving to the copy.
    pub fn modify(&mut self, reference: ObjectRef) -> Result<&mut Object> {
        let at = self.locate_in(self.head(), reference)?;
        self.load(at, 0)?;
        let head = self.head_mut();
        let slot = if at.0 == head {
            let obj = &mut self.updates[head].xref.objects_mut()[at.1];
            if obj.status == ObjectStatus::Compressed {
                obj.status = ObjectStatus::InUse;
            }
            at.1
        } else {
            let current = self.slot(at);
            let value = current
                .value()
                .cloned()
                .ok_or(Error::ObjectNotFound(reference.id, reference.gen))?;
            let successor = current.successor(value);
            log::debug!("Copied {} into revision {} as {}", current.reference(), head, successor.reference());
            self.push_slot(head, successor)
        };
        self.updates[head].xref.objects_mut()[slot]
            .value_mut()
            .ok_or(Error::ObjectNotFound(reference.id, reference.gen))
    }

    /// Replace the value of `reference`, returning the reference of the
    /// live object afterwards (generation bumped when copied into a new
    /// revision).
    pub fn set_value(&mut self, reference: ObjectRef, value: Object) -> Result<ObjectRef> {
        let at = self.locate_in(self.head(), reference)?;
        let head = self.head_mut();
        if at.0 == head {
            let obj = &mut self.updates[head].xref.objects_mut()[at.1];
            obj.status = ObjectStatus::InUse;
            obj.set_value(value);
            Ok(obj.reference())
        } else {
            let successor = self.slot(at).successor(value);
            let current = successor.reference();
            self.push_slot(head, successor);
            Ok(current)
        }
    }

    /// Delete `reference`: the head lists it as free with generation 65535,
    /// hiding every older copy.
    pub fn delete(&mut self, reference: ObjectRef) -> Result<()> {
        let at = self.locate_in(self.head(), reference)?;
        let head = self.head_mut();
        if at.0 == head {
            self.updates[head].xref.objects_mut()[at.1] = DocumentObject::free(reference.id, FREE_GENERATION);
            self.updates[head].reset_index();
        } else {
            self.push_slot(head, DocumentObject::free(reference.id, FREE_GENERATION));
        }
        log::debug!("Deleted {}", reference);
        Ok(())
    }

    fn push_slot(&mut self, head: usize, slot: DocumentObject) -> usize {
        let update = &mut self.updates[head];
        update.xref.objects_mut().push(slot);
        update.reset_index();
        update.xref.objects().len() - 1
    }

    /// Serialize: written revisions are replayed byte for byte, pending ones
    /// are appended as incremental updates.
    pub fn to_pdf(&mut self) -> Result<Bytes> {
        if let Some(view) = &self.view {
            return Ok(view.clone());
        }
        let pending = self.updates.iter().any(|update| !update.written);
        if pending && self.is_encrypted() {
            self.bind_handler()?;
        }

        let mut next_id = self.next_id();
        let encrypt_ref = self.encrypt_ref();
        let Document {
            updates,
            options,
            handler,
            version,
            ..
        } = self;

        let mut out: Vec<u8> = Vec::new();
        for index in 0..updates.len() {
            let previous = updates[index].previous;
            let ctx = WriteContext {
                base: out.len(),
                header: (index == 0 && out.is_empty()).then_some(*version),
                first_revision: previous.is_none(),
                prev_start_xref: previous.map(|p| updates[p].start_xref),
                size: chain_size(updates, index),
                options: &*options,
                handler: handler.as_ref(),
                encrypt_ref,
            };
            let bytes = updates[index].write_pdf(&ctx, &mut next_id)?;
            out.extend_from_slice(&bytes);
        }
        for update in updates.iter_mut() {
            update.reset_index();
        }

        let view = Bytes::from(out);
        self.view = Some(view.clone());
        Ok(view)
    }

    /// Whether the head trailer names an `/Encrypt` dictionary.
    pub fn is_encrypted(&self) -> bool {
        self.updates[self.head()].xref.encrypt().is_some()
    }

    fn encrypt_ref(&self) -> Option<ObjectRef> {
        self.updates[self.head()]
            .xref
            .encrypt()
            .and_then(Object::as_reference)
    }

    fn file_id(&self) -> Vec<u8> {
        self.updates[self.head()]
            .xref
            .id()
            .map(|(first, _)| first)
            .unwrap_or_default()
    }

    /// The parsed `/Encrypt` dictionary.
    pub fn encrypt_dictionary(&self) -> Result<EncryptDictionary> {
        let entry = self.updates[self.head()]
            .xref
            .encrypt()
            .ok_or_else(|| Error::Encryption("document is not encrypted".to_string()))?;
        EncryptDictionary::from_object(self.resolve(entry)?)
    }

    fn bind_handler(&mut self) -> Result<()> {
        if self.handler.is_some() {
            return Ok(());
        }
        let dict = self.encrypt_dictionary()?;
        let mut handler = self.factory.create(dict, &self.file_id());
        handler.authenticate(&Authentication {
            password: self.options.password.as_deref(),
            on_certificate: self.options.on_certificate.as_ref(),
        })?;
        log::info!("Authenticated with the {} security handler", handler.filter_name());
        self.handler = Some(handler);
        Ok(())
    }

    /// The security handler, bound and authenticated on first use.
    pub fn encryption_handler(&mut self) -> Result<Option<&EncryptionHandler>> {
        if self.handler.is_none() && !self.is_encrypted() {
            return Ok(None);
        }
        self.bind_handler()?;
        Ok(self.handler.as_ref())
    }

    /// Decrypt every parsed object in place.
    ///
    /// The `/Encrypt` dictionary, cross-reference streams and compressed
    /// objects are left alone; the last come out of their decrypted host.
    pub fn decrypt(&mut self) -> Result<()> {
        if self.decrypted || !self.is_encrypted() {
            return Ok(());
        }
        self.bind_handler()?;
        let encrypt_ref = self.encrypt_ref();

        let mut targets: Vec<(SlotIndex, ObjectRef)> = Vec::new();
        for (index, update) in self.updates.iter().enumerate() {
            if !update.written {
                continue;
            }
            for (slot, obj) in update.xref.objects().iter().enumerate() {
                if obj.status == ObjectStatus::InUse {
                    targets.push(((index, slot), obj.reference()));
                }
            }
        }

        let (slots, plain) = {
            let handler = self
                .handler
                .as_ref()
                .ok_or_else(|| Error::Encryption("no security handler".to_string()))?;
            let mut slots = Vec::with_capacity(targets.len());
            let mut items = Vec::with_capacity(targets.len());
            for (at, reference) in targets {
                let value = match self.load(at, 0) {
                    Ok(value) => value,
                    Err(e) => {
                        log::warn!("Skipping unreadable object {}: {}", reference, e);
                        continue;
                    },
                };
                if traverse::is_skipped(reference, value, encrypt_ref) {
                    continue;
                }
                slots.push(at);
                items.push((reference, value));
            }
            (slots, traverse::decrypt_all(handler, &items)?)
        };

        let count = slots.len();
        for ((update, slot), value) in slots.into_iter().zip(plain) {
            self.updates[update].xref.objects_mut()[slot].set_value(value);
        }
        self.decrypted = true;
        log::info!("Decrypted {} objects", count);
        Ok(())
    }

    /// Encrypt the document with a new security handler.
    ///
    /// Objects are ciphered when written. Revisions already written are
    /// serialized again so that every object is covered; an encrypted
    /// document is decrypted with its current credentials first.
    pub fn encrypt(&mut self, options: EncryptionOptions) -> Result<()> {
        if self.is_encrypted() {
            self.decrypt()?;
            if let Some(old) = self.encrypt_ref() {
                if self.locate_in(self.head(), old).is_ok() {
                    self.delete(old)?;
                }
            }
        }

        let id = match self.updates[self.head()].xref.id() {
            Some(id) => id,
            None => (random_bytes(FILE_ID_LEN)?, random_bytes(FILE_ID_LEN)?),
        };
        let handler = match &options {
            EncryptionOptions::Standard(standard) => {
                EncryptionHandler::Standard(StandardEncryptionHandler::create(standard, &id.0)?)
            },
            EncryptionOptions::PublicKey(public_key) => {
                EncryptionHandler::PublicKey(PublicKeyEncryptionHandler::create(public_key)?)
            },
        };

        if self.updates.iter().any(|update| update.written) {
            self.rewrite_all()?;
        }

        let dict = Object::Dictionary(handler.encrypt_dictionary().to_dict());
        let encrypt = self.append(dict);
        let head = self.head_mut();
        let xref = &mut self.updates[head].xref;
        xref.set_encrypt(Some(Object::Reference(encrypt)));
        xref.set_id(Some(id));

        log::info!("Encrypting with the {} security handler", handler.filter_name());
        self.handler = Some(handler);
        self.decrypted = true;
        Ok(())
    }

    /// Load every live value and mark all revisions unwritten.
    fn rewrite_all(&mut self) -> Result<()> {
        let mut unreadable = Vec::new();
        for index in 0..self.updates.len() {
            for slot in 0..self.updates[index].xref.objects().len() {
                let obj = self.slot((index, slot));
                if !obj.is_live() {
                    continue;
                }
                if let Err(e) = self.load((index, slot), 0) {
                    log::warn!("Dropping unreadable object {}: {}", obj.reference(), e);
                    unreadable.push((index, slot));
                }
            }
        }
        for (index, slot) in unreadable {
            let obj = &mut self.updates[index].xref.objects_mut()[slot];
            *obj = DocumentObject::free(obj.id, obj.generation);
        }
        for update in &mut self.updates {
            update.unwrite();
            update.xref.set_encrypt(None);
        }
        self.view = None;
        Ok(())
    }
}

/// Smallest `/Size` for revision `index`: one past every object number
/// listed by it or any older revision it links to.
fn chain_size(updates: &[DocumentUpdate], index: usize) -> u32 {
    let mut size = 0;
    let mut cursor = Some(index);
    let mut hops = 0;
    while let Some(current) = cursor {
        let xref = &updates[current].xref;
        let listed = xref.max_id().map_or(0, |id| id.saturating_add(1));
        size = size.max(xref.size()).max(listed);
        cursor = updates[current].previous;
        hops += 1;
        if hops > updates.len() {
            break;
        }
    }
    size
}

/// Read-only view of one revision.
#[derive(Debug, Clone, Copy)]
pub struct Revision<'a> {
    document: &'a Document,
    index: usize,
}

impl<'a> Revision<'a> {
    /// Position in the arena (0 is the oldest).
    pub fn index(&self) -> usize {
        self.index
    }

    /// The revision this one updates.
    pub fn previous(&self) -> Option<Revision<'a>> {
        self.update().previous.map(|index| Revision {
            document: self.document,
            index,
        })
    }

    /// The underlying revision.
    pub fn update(&self) -> &'a DocumentUpdate {
        &self.document.updates[self.index]
    }

    /// Trailer of this revision.
    pub fn trailer(&self) -> &'a Dictionary {
        self.update().xref.trailer()
    }

    /// Live slot for `id` as of this revision.
    pub fn get_object(&self, id: u32) -> Option<&'a DocumentObject> {
        self.document
            .lookup(self.index, id)
            .map(|at| self.document.slot(at))
    }

    /// Value of `reference` as of this revision.
    pub fn get_value(&self, reference: ObjectRef) -> Result<&'a Object> {
        self.document.value_in(self.index, reference)
    }

    /// Live slots as of this revision, ordered by object number.
    pub fn objects(&self) -> Vec<&'a DocumentObject> {
        update::merged_index(&self.document.updates, self.index)
            .values()
            .map(|&at| self.document.slot(at))
            .collect()
    }
}
