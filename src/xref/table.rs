//! Classic cross-reference tables.
//!
//! ```text
//! xref
//! 0 6                      % subsection: first object number, count
//! 0000000000 65535 f\r\n   % 20-byte records: offset, generation, n/f
//! 0000000018 00000 n\r\n
//! ...
//! trailer
//! << /Size 6 /Root 1 0 R >>
//! ```

use super::grouper;
use super::{ordered_trailer, CrossReference};
use crate::cursor::{ByteReader, ByteWriter};
use crate::document_object::{DocumentObject, ObjectStatus, FREE_GENERATION};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use crate::parser::parse_object;
use crate::writer::ObjectSerializer;

/// Upper bound on the entries of one subsection.
const MAX_SUBSECTION_ENTRIES: u64 = 10_000_000;

/// A parsed or to-be-written `xref` table with its trailer.
#[derive(Debug, Default)]
pub struct CrossReferenceTable {
    trailer: Dictionary,
    objects: Vec<DocumentObject>,
}

impl CrossReferenceTable {
    /// Empty table with an empty trailer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the table and trailer starting at `offset` (leading whitespace
    /// allowed). Object 0, the head of the free list, is not kept.
    pub fn parse(data: &[u8], offset: usize) -> Result<Self> {
        let mut reader = ByteReader::new(data, offset);
        reader.skip_whitespace();
        reader.expect_keyword(b"xref")?;

        let mut table = CrossReferenceTable::new();
        loop {
            reader.skip_whitespace();
            if reader.is_eof() {
                return Err(Error::InvalidXref(format!(
                    "table at {} has no trailer",
                    offset
                )));
            }
            if reader.starts_with(b"trailer") {
                break;
            }

            let header_at = reader.position();
            let header = String::from_utf8_lossy(reader.read_line()).into_owned();
            let parts: Vec<&str> = header.split_whitespace().collect();
            let (start, count) = match parts.as_slice() {
                [start, count] => match (start.parse::<u32>(), count.parse::<u64>()) {
                    (Ok(start), Ok(count)) => (start, count),
                    _ => return Err(Error::parse(header_at, format!("bad subsection header {:?}", header))),
                },
                _ => return Err(Error::parse(header_at, format!("bad subsection header {:?}", header))),
            };
            if count > MAX_SUBSECTION_ENTRIES {
                return Err(Error::InvalidXref(format!("subsection of {} entries", count)));
            }

            for i in 0..count {
                reader.skip_whitespace();
                if reader.starts_with(b"trailer") {
                    log::warn!("Expected {} entries but only found {} before trailer", count, i);
                    break;
                }
                let id = start
                    .checked_add(i as u32)
                    .ok_or_else(|| Error::InvalidXref("object number overflow".to_string()))?;
                let line = String::from_utf8_lossy(reader.read_line()).into_owned();
                if let Some(entry) = parse_record(id, &line) {
                    if id != 0 {
                        table.objects.push(entry);
                    }
                }
            }
        }

        reader.expect_keyword(b"trailer")?;
        let trailer_at = reader.position();
        table.trailer = match parse_object(reader.remaining()) {
            Ok((_, Object::Dictionary(dict))) => dict,
            Ok((_, other)) => return Err(Error::object_type("trailer Dictionary", other.type_name())),
            Err(e) => return Err(Error::parse(trailer_at, format!("invalid trailer: {:?}", e))),
        };

        log::debug!("Parsed xref table at {} with {} entries", offset, table.objects.len());
        Ok(table)
    }

    /// Merge the entries of a hybrid file's `/XRefStm` stream: an entry with
    /// the same (id, generation) is replaced, anything else is appended.
    pub fn merge_stream_entries(&mut self, entries: Vec<DocumentObject>) {
        for entry in entries {
            let existing = self
                .objects
                .iter()
                .position(|obj| obj.id == entry.id && obj.generation == entry.generation);
            match existing {
                Some(pos) => self.objects[pos] = entry,
                None => self.objects.push(entry),
            }
        }
    }

    /// Write `xref`, the subsections and the trailer.
    ///
    /// `first_revision` adds the `0 65535 f` record for object 0.
    pub fn write(&self, writer: &mut ByteWriter, first_revision: bool) -> Result<()> {
        let mut records: Vec<(u32, u64, u16, char)> = Vec::with_capacity(self.objects.len() + 1);
        if first_revision {
            records.push((0, 0, FREE_GENERATION, 'f'));
        }
        for obj in &self.objects {
            let record = match obj.status {
                ObjectStatus::InUse => (obj.id, obj.offset, obj.generation, 'n'),
                ObjectStatus::Free | ObjectStatus::Null => (obj.id, 0, obj.generation, 'f'),
                ObjectStatus::Compressed => {
                    return Err(Error::InvalidXref(format!(
                        "compressed object {} cannot be listed in an xref table",
                        obj.id
                    )))
                },
            };
            records.push(record);
        }

        writer.write_str("xref\n");
        for run in grouper::group(records, |record| record.0) {
            writer.write_str(&format!("{} {}\n", run[0].0, run.len()));
            for (_, offset, generation, flag) in run {
                writer.write_str(&format!("{:010} {:05} {}\r\n", offset, generation, flag));
            }
        }

        writer.write_str("trailer\n");
        let trailer = Object::Dictionary(ordered_trailer(&self.trailer, &["XRefStm"]));
        writer.write(&ObjectSerializer::new().serialize(&trailer)?);
        writer.write_str("\n");
        Ok(())
    }
}

/// One 20-byte record. Malformed records are logged and skipped; an
/// unknown flag is read as free, like other lenient readers do.
fn parse_record(id: u32, line: &str) -> Option<DocumentObject> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 3 {
        log::warn!("Malformed xref entry for object {}: {:?}", id, line);
        return None;
    }
    let (offset, generation) = match (parts[0].parse::<u64>(), parts[1].parse::<u16>()) {
        (Ok(offset), Ok(generation)) => (offset, generation),
        _ => {
            log::warn!("Unreadable xref entry for object {}: {:?}", id, line);
            return None;
        },
    };
    match parts[2].chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('n') => Some(DocumentObject::in_use(id, generation, offset)),
        Some('f') => Some(DocumentObject::free(id, generation)),
        _ => {
            log::warn!("Invalid type flag for object {}: {:?}, treating as free", id, parts[2]);
            Some(DocumentObject::free(id, generation))
        },
    }
}

impl CrossReference for CrossReferenceTable {
    fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    fn trailer_mut(&mut self) -> &mut Dictionary {
        &mut self.trailer
    }

    fn objects(&self) -> &[DocumentObject] {
        &self.objects
    }

    fn objects_mut(&mut self) -> &mut Vec<DocumentObject> {
        &mut self.objects
    }
}
