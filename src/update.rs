//! One revision of a document: its cross-reference section, its link to the
//! previous revision, and its serialized bytes.
//!
//! Revisions live in an arena owned by [`crate::Document`]; `previous` is an
//! index into that arena, oldest revision first.

use crate::config::DocumentOptions;
use crate::cursor::{ByteReader, ByteWriter};
use crate::document::PdfVersion;
use crate::document_object::{DocumentObject, ObjectStatus};
use crate::encryption::{traverse, EncryptionHandler};
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::objstm::CompressedObject;
use crate::writer::ObjectSerializer;
use crate::xref::{CrossReference, CrossReferenceStream, CrossReferenceTable, Xref};
use bytes::Bytes;
use once_cell::sync::OnceCell;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Binary marker written on the second line of new files.
pub(crate) const BINARY_MARKER: &[u8] = b"%\xE2\xE3\xCF\xD3\n";

/// Position of a slot in the arena: (revision index, slot index).
pub type SlotIndex = (usize, usize);

/// A single revision.
#[derive(Debug)]
pub struct DocumentUpdate {
    pub(crate) xref: Xref,
    pub(crate) previous: Option<usize>,
    pub(crate) start_xref: u64,
    pub(crate) view: Bytes,
    pub(crate) written: bool,
    merged: OnceCell<BTreeMap<u32, SlotIndex>>,
}

/// Inputs for serializing one revision.
pub(crate) struct WriteContext<'a> {
    /// Absolute offset of the first byte of this revision
    pub base: usize,
    /// Write the `%PDF-x.y` header first
    pub header: Option<PdfVersion>,
    /// Whether this revision starts the chain (adds the object 0 record)
    pub first_revision: bool,
    /// `startxref` of the previous revision
    pub prev_start_xref: Option<u64>,
    /// Smallest acceptable `/Size`
    pub size: u32,
    /// Document options
    pub options: &'a DocumentOptions,
    /// Handler used to encrypt written objects
    pub handler: Option<&'a EncryptionHandler>,
    /// The `/Encrypt` dictionary, never encrypted itself
    pub encrypt_ref: Option<ObjectRef>,
}

impl DocumentUpdate {
    /// A new, empty revision.
    pub fn new(stream_xref: bool, previous: Option<usize>) -> Self {
        let xref = if stream_xref {
            Xref::Stream(CrossReferenceStream::new())
        } else {
            Xref::Table(CrossReferenceTable::new())
        };
        Self {
            xref,
            previous,
            start_xref: 0,
            view: Bytes::new(),
            written: false,
            merged: OnceCell::new(),
        }
    }

    /// Parse the cross-reference section at `offset`.
    ///
    /// A section whose first byte is not `x` is read as a cross-reference
    /// stream when `version` allows streams; a table that fails to parse at
    /// an offset without `xref` is retried as a stream regardless of
    /// version. Hybrid tables have their `/XRefStm` entries merged in.
    pub fn from_pdf(source: &[u8], offset: u64, version: PdfVersion) -> Result<Self> {
        let at = usize::try_from(offset)
            .ok()
            .filter(|&at| at < source.len())
            .ok_or_else(|| Error::InvalidXref(format!("offset {} beyond end of file", offset)))?;
        let mut reader = ByteReader::new(source, at);
        reader.skip_whitespace();
        let looks_like_table = reader.starts_with(b"xref");

        let mut xref = if reader.peek() != Some(b'x') && version.supports_xref_streams() {
            Xref::Stream(CrossReferenceStream::parse(source, at)?.1)
        } else {
            match CrossReferenceTable::parse(source, at) {
                Ok(table) => Xref::Table(merge_hybrid(source, table)),
                Err(e) if !looks_like_table => {
                    log::debug!("No xref table at {} ({}), trying a stream", offset, e);
                    Xref::Stream(CrossReferenceStream::parse(source, at)?.1)
                },
                Err(e) => return Err(e),
            }
        };

        if let Some(max) = xref.max_id() {
            let needed = max.saturating_add(1);
            if xref.size() < needed {
                log::warn!(
                    "Trailer /Size {} at {} is below the highest object number {}; using {}",
                    xref.size(),
                    offset,
                    max,
                    needed
                );
                xref.set_size(needed);
            }
        }

        let mut update = Self::new(false, None);
        update.xref = xref;
        update.start_xref = offset;
        update.written = true;
        Ok(update)
    }

    /// The cross-reference section.
    pub fn xref(&self) -> &Xref {
        &self.xref
    }

    /// Index of the previous revision in the arena.
    pub fn previous(&self) -> Option<usize> {
        self.previous
    }

    /// Offset of this revision's cross-reference section.
    pub fn start_xref(&self) -> u64 {
        self.start_xref
    }

    /// Bytes of this revision; empty until written.
    pub fn view(&self) -> &Bytes {
        &self.view
    }

    /// Whether this revision has been serialized (or was parsed).
    pub fn is_written(&self) -> bool {
        self.written
    }

    /// Forget the memoized merged index after a slot change.
    pub(crate) fn reset_index(&mut self) {
        self.merged = OnceCell::new();
    }

    /// Make the revision serializable again: drop its cross-reference stream
    /// object and forget the cached bytes. Every live value must be loaded.
    pub(crate) fn unwrite(&mut self) {
        self.xref
            .objects_mut()
            .retain(|obj| !(obj.status == ObjectStatus::InUse && obj.value().map_or(false, is_xref_stream)));
        let has_compressed = self
            .xref
            .objects()
            .iter()
            .any(|obj| obj.status == ObjectStatus::Compressed);
        if has_compressed && !self.xref.is_stream() {
            let mut stream = CrossReferenceStream::new();
            *stream.trailer_mut() = std::mem::take(self.xref.trailer_mut());
            *stream.objects_mut() = std::mem::take(self.xref.objects_mut());
            self.xref = Xref::Stream(stream);
        }
        self.view = Bytes::new();
        self.written = false;
        self.reset_index();
    }

    /// Serialize this revision, or replay it if already written.
    ///
    /// `next_id` is the next free object number of the whole document; it
    /// is advanced for the object stream and cross-reference stream objects
    /// created here.
    pub(crate) fn write_pdf(&mut self, ctx: &WriteContext<'_>, next_id: &mut u32) -> Result<Bytes> {
        if self.written {
            return Ok(self.view.clone());
        }

        if ctx.options.packs_object_streams() && self.xref.is_stream() {
            self.pack_object_stream(ctx, next_id)?;
        }

        let mut writer = ByteWriter::new(ctx.base);
        if let Some(version) = ctx.header {
            writer.write_str(&format!("%PDF-{}\n", version));
            writer.write(BINARY_MARKER);
        }

        let offsets = self.write_objects(ctx, &mut writer)?;
        for (slot, offset) in offsets {
            self.xref.objects_mut()[slot].offset = offset;
        }

        let max_id = self.xref.max_id().map_or(0, |id| id.saturating_add(1));
        let mut size = ctx.size.max(max_id);
        let start = writer.position();
        self.xref.set_prev(ctx.prev_start_xref);
        let serializer = ObjectSerializer::new();
        match &mut self.xref {
            Xref::Table(table) => {
                table.set_size(size);
                table.write(&mut writer, ctx.first_revision)?;
            },
            Xref::Stream(stream) => {
                let id = (*next_id).max(size);
                *next_id = id + 1;
                size = size.max(id + 1);
                stream
                    .objects_mut()
                    .push(DocumentObject::in_use(id, 0, start as u64));
                stream.set_size(size);
                let object = stream.prepare(ctx.first_revision, ctx.options.compress_streams)?;
                serializer.write_indirect(writer.buffer_mut(), ObjectRef::new(id, 0), &object)?;
                if let Some(slot) = stream.objects_mut().last_mut() {
                    slot.set_value(object);
                }
            },
        }
        writer.write_str(&format!("startxref\n{}\n%%EOF\n", start));

        self.start_xref = start as u64;
        self.view = writer.into_bytes();
        self.written = true;
        self.reset_index();
        log::debug!(
            "Wrote revision: {} objects, xref at {}",
            self.xref.objects().len(),
            start
        );
        Ok(self.view.clone())
    }

    /// Move eligible objects into one new object stream of this revision.
    fn pack_object_stream(&mut self, ctx: &WriteContext<'_>, next_id: &mut u32) -> Result<()> {
        let root = self.xref.root();
        let eligible: Vec<usize> = self
            .xref
            .objects()
            .iter()
            .enumerate()
            .filter(|(_, obj)| {
                let id = Some(obj.id);
                obj.status == ObjectStatus::InUse
                    && obj.generation == 0
                    && obj.value().map_or(false, |value| !value.is_stream())
                    && ctx.encrypt_ref.map(|r| r.id) != id
                    && !(ctx.handler.is_some() && root.map(|r| r.id) == id)
            })
            .map(|(slot, _)| slot)
            .collect();
        if eligible.is_empty() {
            return Ok(());
        }

        let host = *next_id;
        *next_id += 1;
        let stream = {
            let objects = self.xref.objects();
            let pairs: Vec<(u32, &Object)> = eligible
                .iter()
                .filter_map(|&slot| objects[slot].value().map(|value| (objects[slot].id, value)))
                .collect();
            CompressedObject::encode(&pairs, ctx.options.compress_streams)?
        };

        let objects = self.xref.objects_mut();
        for (index, &slot) in eligible.iter().enumerate() {
            let obj = &mut objects[slot];
            obj.status = ObjectStatus::Compressed;
            obj.offset = host as u64;
            obj.index = index as u32;
        }
        objects.push(DocumentObject::with_value(host, 0, stream));
        log::debug!("Packed {} objects into object stream {}", eligible.len(), host);
        Ok(())
    }

    /// Write every in-use object, encrypted when a handler is attached.
    /// Returns (slot, offset) pairs.
    fn write_objects(&self, ctx: &WriteContext<'_>, writer: &mut ByteWriter) -> Result<Vec<(usize, u64)>> {
        let mut live: Vec<(usize, ObjectRef, &Object)> = Vec::new();
        for (slot, obj) in self.xref.objects().iter().enumerate() {
            if obj.status != ObjectStatus::InUse {
                continue;
            }
            let value = obj
                .value()
                .ok_or(Error::ObjectNotFound(obj.id, obj.generation))?;
            live.push((slot, obj.reference(), value));
        }

        let mut encrypted: HashMap<usize, Object> = HashMap::new();
        if let Some(handler) = ctx.handler {
            let (slots, items): (Vec<usize>, Vec<(ObjectRef, &Object)>) = live
                .iter()
                .filter(|(_, reference, value)| !traverse::is_skipped(*reference, value, ctx.encrypt_ref))
                .map(|(slot, reference, value)| (*slot, (*reference, *value)))
                .unzip();
            for (slot, result) in slots.into_iter().zip(traverse::encrypt_all(handler, &items)) {
                if let Some(value) = result {
                    encrypted.insert(slot, value);
                }
            }
        }

        let serializer = ObjectSerializer::new();
        let mut offsets = Vec::with_capacity(live.len());
        for (slot, reference, value) in live {
            offsets.push((slot, writer.position() as u64));
            let value = encrypted.get(&slot).unwrap_or(value);
            serializer.write_indirect(writer.buffer_mut(), reference, value)?;
        }
        Ok(offsets)
    }
}

fn is_xref_stream(value: &Object) -> bool {
    value.is_stream() && value.type_entry() == Some("XRef")
}

fn merge_hybrid(source: &[u8], mut table: CrossReferenceTable) -> CrossReferenceTable {
    let Some(offset) = table.trailer().get("XRefStm").and_then(Object::as_integer) else {
        return table;
    };
    match usize::try_from(offset)
        .map_err(|_| Error::InvalidXref(format!("bad /XRefStm {}", offset)))
        .and_then(|at| CrossReferenceStream::parse(source, at))
    {
        Ok((_, mut stream)) => {
            log::debug!("Merging hybrid /XRefStm at {}", offset);
            table.merge_stream_entries(std::mem::take(stream.objects_mut()));
        },
        Err(e) => log::warn!("Ignoring unreadable /XRefStm at {}: {}", offset, e),
    }
    table
}

/// The merged object index seen from revision `head`: object number to the
/// slot holding its current value.
///
/// Newer revisions hide older ones; a free entry hides the id from every
/// older revision. Within one revision a live entry beats a free one.
pub(crate) fn merged_index(arena: &[DocumentUpdate], head: usize) -> &BTreeMap<u32, SlotIndex> {
    arena[head].merged.get_or_init(|| {
        let mut merged = BTreeMap::new();
        let mut hidden = HashSet::new();
        let mut visited = HashSet::new();
        let mut cursor = Some(head);
        while let Some(index) = cursor {
            if !visited.insert(index) {
                break;
            }
            let objects = arena[index].xref.objects();
            let mut local: HashMap<u32, usize> = HashMap::new();
            for (slot, obj) in objects.iter().enumerate() {
                if obj.id == 0 {
                    continue;
                }
                match local.get(&obj.id) {
                    Some(&kept) if objects[kept].is_live() || !obj.is_live() => {},
                    _ => {
                        local.insert(obj.id, slot);
                    },
                }
            }
            for (id, slot) in local {
                if hidden.insert(id) && objects[slot].is_live() {
                    merged.insert(id, (index, slot));
                }
            }
            cursor = arena[index].previous;
        }
        merged
    })
}

/// Result of parsing the revision chain of a file.
pub(crate) struct ParsedChain {
    /// Revisions, oldest first
    pub updates: Vec<DocumentUpdate>,
    /// Whether the layout looked inconsistent
    pub wrong_structure: bool,
}

/// Parse the newest section at `start` and every section reachable through
/// `/Prev`, then assign each revision its byte range of `source`.
pub(crate) fn parse_chain(
    source: &Bytes,
    start: u64,
    version: PdfVersion,
    max_depth: usize,
) -> Result<ParsedChain> {
    let mut seen = HashSet::new();
    let mut newest_first: Vec<DocumentUpdate> = Vec::new();
    let mut wrong_structure = false;
    let mut next = Some(start);

    while let Some(offset) = next {
        if !seen.insert(offset) {
            log::warn!("/Prev chain loops back to offset {}; stopping", offset);
            wrong_structure = true;
            break;
        }
        if newest_first.len() >= max_depth {
            return Err(Error::RecursionLimitExceeded(max_depth as u32));
        }
        let update = DocumentUpdate::from_pdf(source, offset, version)?;
        next = update.xref.prev();
        newest_first.push(update);
    }

    let mut updates = newest_first;
    updates.reverse();
    for (index, update) in updates.iter_mut().enumerate() {
        update.previous = index.checked_sub(1);
    }

    wrong_structure |= detect_wrong_structure(&updates);
    assign_views(source, &mut updates);
    log::info!("Parsed {} revision(s)", updates.len());
    Ok(ParsedChain {
        updates,
        wrong_structure,
    })
}

fn detect_wrong_structure(updates: &[DocumentUpdate]) -> bool {
    let unordered = updates
        .windows(2)
        .any(|pair| pair[0].start_xref >= pair[1].start_xref);
    if unordered {
        log::warn!("Revision offsets are not increasing");
        return true;
    }
    for update in updates {
        let misplaced = update
            .xref
            .objects()
            .iter()
            .find(|obj| obj.status == ObjectStatus::InUse && obj.offset > update.start_xref);
        if let Some(obj) = misplaced {
            log::warn!(
                "Object {} at {} lies after its xref section at {}",
                obj.id,
                obj.offset,
                update.start_xref
            );
            return true;
        }
    }
    false
}

/// End of the revision whose xref section starts at `start_xref`: just past
/// the `%%EOF` that follows it and its line ending.
fn revision_end(source: &[u8], start_xref: u64) -> usize {
    let mut reader = ByteReader::new(source, start_xref as usize);
    match reader.find(b"%%EOF") {
        Some(pos) => {
            reader.seek(pos + 5);
            reader.skip_eol();
            reader.position()
        },
        None => source.len(),
    }
}

fn assign_views(source: &Bytes, updates: &mut [DocumentUpdate]) {
    let count = updates.len();
    let mut ends: Vec<usize> = updates
        .iter()
        .map(|update| revision_end(source, update.start_xref))
        .collect();
    if let Some(last) = ends.last_mut() {
        *last = source.len();
    }

    let monotonic = ends.windows(2).all(|pair| pair[0] <= pair[1]);
    if !monotonic {
        for (index, update) in updates.iter_mut().enumerate() {
            update.view = if index == 0 { source.clone() } else { Bytes::new() };
        }
        return;
    }

    let mut begin = 0;
    for (index, update) in updates.iter_mut().enumerate() {
        let end = if index + 1 == count { source.len() } else { ends[index] };
        update.view = source.slice(begin..end);
        begin = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V17: PdfVersion = PdfVersion::new(1, 7);

    fn with_slots(previous: Option<usize>, slots: Vec<DocumentObject>) -> DocumentUpdate {
        let mut update = DocumentUpdate::new(false, previous);
        *update.xref.objects_mut() = slots;
        update
    }

    #[test]
    fn test_merged_index_newer_hides_older() {
        let arena = vec![
            with_slots(None, vec![DocumentObject::in_use(1, 0, 10), DocumentObject::in_use(2, 0, 20)]),
            with_slots(Some(0), vec![DocumentObject::in_use(2, 0, 99), DocumentObject::free(1, 65535)]),
        ];
        let head = merged_index(&arena, 1);
        assert_eq!(head.get(&2), Some(&(1, 0)));
        assert!(head.get(&1).is_none());

        let old = merged_index(&arena, 0);
        assert_eq!(old.get(&1), Some(&(0, 0)));
        assert_eq!(old.get(&2), Some(&(0, 1)));
    }

    #[test]
    fn test_live_beats_free_within_revision() {
        let arena = vec![with_slots(
            None,
            vec![DocumentObject::free(3, 1), DocumentObject::in_use(3, 0, 40), DocumentObject::free(3, 2)],
        )];
        assert_eq!(merged_index(&arena, 0).get(&3), Some(&(0, 1)));
    }

    #[test]
    fn test_parse_table_revision_and_size_correction() {
        let data = b"%PDF-1.4\nxref\n0 1\n0000000000 65535 f\r\n3 1\n0000000009 00000 n\r\ntrailer\n<< /Size 2 >>\nstartxref\n9\n%%EOF\n";
        let update = DocumentUpdate::from_pdf(data, 9, PdfVersion::new(1, 4)).unwrap();
        assert!(!update.xref().is_stream());
        assert_eq!(update.xref().size(), 4);
        assert!(update.is_written());
    }

    #[test]
    fn test_offset_beyond_file() {
        assert!(matches!(
            DocumentUpdate::from_pdf(b"%PDF-1.7\n", 500, V17),
            Err(Error::InvalidXref(_))
        ));
    }

    #[test]
    fn test_revision_end() {
        let data = b"xref...startxref\n5\n%%EOF\r\nnext";
        assert_eq!(revision_end(data, 0), 26);
        assert_eq!(revision_end(b"no marker", 0), 9);
    }

    #[test]
    fn test_wrong_structure_detection() {
        let mut first = with_slots(None, vec![DocumentObject::in_use(1, 0, 10)]);
        first.start_xref = 100;
        let mut second = with_slots(Some(0), vec![DocumentObject::in_use(2, 0, 150)]);
        second.start_xref = 200;
        assert!(!detect_wrong_structure(&[first, second]));

        let mut first = with_slots(None, vec![DocumentObject::in_use(1, 0, 10)]);
        first.start_xref = 300;
        let mut second = with_slots(Some(0), vec![]);
        second.start_xref = 200;
        assert!(detect_wrong_structure(&[first, second]));

        let mut only = with_slots(None, vec![DocumentObject::in_use(1, 0, 500)]);
        only.start_xref = 100;
        assert!(detect_wrong_structure(&[only]));
    }
}
