//! Cross-reference streams (PDF 1.5+).
//!
//! The stream dictionary carries the trailer keys plus:
//! - `/W [w1 w2 w3]`: byte widths of the three big-endian fields;
//! - `/Index [first count ...]`: subsections, `[0 Size]` when absent.
//!
//! Each record holds a type (0 free, 1 in use, 2 compressed), then the
//! offset or host object stream number, then the generation or index in
//! the host. A zero-width type field means type 1.

use super::grouper;
use super::{ordered_trailer, CrossReference};
use crate::decoders::{decode_stream, encode_flate};
use crate::document_object::{DocumentObject, ObjectStatus, FREE_GENERATION};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::parser::parse_indirect_at;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Keys of the stream dictionary that describe the encoding, not the trailer.
const ENCODING_KEYS: [&str; 7] = ["Type", "W", "Index", "Filter", "DecodeParms", "Length", "XRefStm"];

/// A cross-reference stream: its dictionary and the slots it lists.
#[derive(Debug, Default)]
pub struct CrossReferenceStream {
    dict: Dictionary,
    objects: Vec<DocumentObject>,
}

impl CrossReferenceStream {
    /// Empty section; the dictionary is filled while writing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the indirect `/Type /XRef` stream object starting at `offset`
    /// (leading whitespace allowed).
    pub fn parse(data: &[u8], offset: usize) -> Result<(ObjectRef, Self)> {
        let start = offset
            + data
                .get(offset..)
                .ok_or(Error::UnexpectedEof)?
                .iter()
                .take_while(|&&b| crate::lexer::is_whitespace(b))
                .count();
        let (reference, object, _) = parse_indirect_at(data, start)?;
        let stream = Self::from_object(&object)?;
        log::debug!(
            "Parsed xref stream {} at {} with {} entries",
            reference,
            offset,
            stream.objects.len()
        );
        Ok((reference, stream))
    }

    /// Decode the entries of an xref stream object. Free entries for object
    /// 0 are dropped.
    pub fn from_object(object: &Object) -> Result<Self> {
        let (dict, data) = match object {
            Object::Stream { dict, data } => (dict, data),
            other => return Err(Error::object_type("XRef Stream", other.type_name())),
        };
        match dict.get("Type").and_then(Object::as_name) {
            Some("XRef") => {},
            other => {
                return Err(Error::object_type(
                    "/Type /XRef",
                    format!("/Type {}", other.unwrap_or("(none)")),
                ))
            },
        }

        let widths = read_widths(dict)?;
        let size = dict
            .get("Size")
            .and_then(Object::as_integer)
            .ok_or_else(|| Error::InvalidXref("xref stream without /Size".to_string()))?;
        let ranges = read_index(dict, size)?;
        let decoded = decode_stream(dict, data)?;

        let record_len: usize = widths.iter().sum();
        let mut cursor = Cursor::new(decoded.as_slice());
        let mut objects = Vec::new();
        for (first, count) in ranges {
            for i in 0..count {
                if (cursor.position() as usize) + record_len > decoded.len() {
                    return Err(Error::InvalidXref(format!(
                        "xref stream data ends before entry {} of subsection {}",
                        i, first
                    )));
                }
                let kind = read_field(&mut cursor, widths[0], 1)?;
                let second = read_field(&mut cursor, widths[1], 0)?;
                let third = read_field(&mut cursor, widths[2], 0)?;
                let id = first
                    .checked_add(i)
                    .ok_or_else(|| Error::InvalidXref("object number overflow".to_string()))?;

                let entry = match ObjectStatus::from_code(kind) {
                    ObjectStatus::Free if id == 0 => continue,
                    ObjectStatus::Free => DocumentObject::free(id, third as u16),
                    ObjectStatus::InUse => DocumentObject::in_use(id, third as u16, second),
                    ObjectStatus::Compressed => DocumentObject::compressed(id, second as u32, third as u32),
                    ObjectStatus::Null => DocumentObject::null(id, 0),
                };
                objects.push(entry);
            }
        }

        Ok(Self {
            dict: dict.clone(),
            objects,
        })
    }

    /// Minimum widths for `rows` of (type, field 2, field 3).
    ///
    /// The type takes 1 byte and field 2 at least 1 byte; field 3 may be
    /// 0 bytes wide when every value is zero.
    pub fn compute_widths(rows: &[[u64; 3]]) -> [usize; 3] {
        let max = |i: usize| rows.iter().map(|row| row[i]).max().unwrap_or(0);
        [1, byte_width(max(1)).max(1), byte_width(max(2))]
    }

    /// Build the stream object listing every slot of this section.
    ///
    /// `first_revision` adds the free head record for object 0.
    pub fn prepare(&self, first_revision: bool, compress: bool) -> Result<Object> {
        let mut rows: Vec<(u32, [u64; 3])> = Vec::with_capacity(self.objects.len() + 1);
        if first_revision {
            rows.push((0, [0, 0, FREE_GENERATION as u64]));
        }
        rows.extend(self.objects.iter().map(|obj| (obj.id, fields(obj))));

        let groups = grouper::group(rows, |row| row.0);
        let flat: Vec<[u64; 3]> = groups.iter().flatten().map(|row| row.1).collect();
        let widths = Self::compute_widths(&flat);

        let mut data = Vec::with_capacity(flat.len() * widths.iter().sum::<usize>());
        for row in &flat {
            for (value, &width) in row.iter().zip(widths.iter()) {
                if width > 0 {
                    data.write_uint::<BigEndian>(*value, width)?;
                }
            }
        }

        let index = grouper::ranges(&groups, |row| row.0)
            .into_iter()
            .flat_map(|(first, count)| [Object::Integer(first as i64), Object::Integer(count as i64)])
            .collect();

        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::name("XRef"));
        dict.extend(ordered_trailer(&self.dict, &ENCODING_KEYS));
        dict.insert("Index".to_string(), Object::Array(index));
        dict.insert(
            "W".to_string(),
            Object::Array(widths.iter().map(|&w| Object::Integer(w as i64)).collect()),
        );
        let data = if compress {
            dict.insert("Filter".to_string(), Object::name("FlateDecode"));
            encode_flate(&data)?
        } else {
            data
        };
        Ok(Object::stream(dict, data))
    }
}

fn fields(obj: &DocumentObject) -> [u64; 3] {
    match obj.status {
        ObjectStatus::Free | ObjectStatus::Null => [0, 0, obj.generation as u64],
        ObjectStatus::InUse => [1, obj.offset, obj.generation as u64],
        ObjectStatus::Compressed => [2, obj.offset, obj.index as u64],
    }
}

fn byte_width(value: u64) -> usize {
    ((64 - value.leading_zeros() as usize) + 7) / 8
}

fn read_field(cursor: &mut Cursor<&[u8]>, width: usize, default: u64) -> Result<u64> {
    if width == 0 {
        return Ok(default);
    }
    Ok(cursor.read_uint::<BigEndian>(width)?)
}

fn read_widths(dict: &Dictionary) -> Result<[usize; 3]> {
    let w = dict
        .get("W")
        .and_then(Object::as_array)
        .ok_or_else(|| Error::InvalidXref("xref stream without /W".to_string()))?;
    if w.len() != 3 {
        return Err(Error::InvalidXref(format!("/W has {} entries", w.len())));
    }
    let mut widths = [0usize; 3];
    for (slot, value) in widths.iter_mut().zip(w) {
        *slot = match value.as_integer() {
            Some(width @ 0..=8) => width as usize,
            _ => return Err(Error::InvalidXref(format!("invalid /W entry {:?}", value))),
        };
    }
    Ok(widths)
}

fn read_index(dict: &Dictionary, size: i64) -> Result<Vec<(u32, u32)>> {
    let to_u32 = |value: &Object| {
        value
            .as_integer()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| Error::InvalidXref(format!("invalid /Index entry {:?}", value)))
    };
    match dict.get("Index").and_then(Object::as_array) {
        Some(index) => {
            if index.len() % 2 != 0 {
                return Err(Error::InvalidXref("odd-length /Index".to_string()));
            }
            index
                .chunks(2)
                .map(|pair| Ok((to_u32(&pair[0])?, to_u32(&pair[1])?)))
                .collect()
        },
        None => Ok(vec![(0, to_u32(&Object::Integer(size))?)]),
    }
}

impl CrossReference for CrossReferenceStream {
    fn trailer(&self) -> &Dictionary {
        &self.dict
    }

    fn trailer_mut(&mut self) -> &mut Dictionary {
        &mut self.dict
    }

    fn objects(&self) -> &[DocumentObject] {
        &self.objects
    }

    fn objects_mut(&mut self) -> &mut Vec<DocumentObject> {
        &mut self.objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::ObjectSerializer;

    fn xref_stream(w: [i64; 3], index: Option<Vec<i64>>, size: i64, data: Vec<u8>) -> Object {
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::name("XRef"));
        dict.insert("Size".to_string(), Object::Integer(size));
        dict.insert("W".to_string(), Object::Array(w.iter().map(|&v| Object::Integer(v)).collect()));
        if let Some(index) = index {
            dict.insert("Index".to_string(), Object::Array(index.into_iter().map(Object::Integer).collect()));
        }
        Object::stream(dict, data)
    }

    #[test]
    fn test_compute_widths() {
        assert_eq!(CrossReferenceStream::compute_widths(&[]), [1, 1, 0]);
        assert_eq!(CrossReferenceStream::compute_widths(&[[1, 15, 0], [1, 300, 0]]), [1, 2, 0]);
        assert_eq!(CrossReferenceStream::compute_widths(&[[2, 5, 255], [1, 70_000, 0]]), [1, 3, 1]);
        assert_eq!(CrossReferenceStream::compute_widths(&[[0, 0, 65535]]), [1, 1, 2]);
    }

    #[test]
    fn test_decode_entries() {
        let data = vec![
            0, 0, 0, 0xFF, // object 0, free
            1, 0, 15, 0, // object 1 at 15
            2, 0, 9, 3, // object 2 in stream 9 at index 3
            7, 0, 0, 0, // object 3, unknown type
        ];
        let xref = CrossReferenceStream::from_object(&xref_stream([1, 2, 1], None, 4, data)).unwrap();
        let objects = xref.objects();
        assert_eq!(objects.len(), 3);
        assert_eq!((objects[0].id, objects[0].offset), (1, 15));
        assert_eq!(objects[1].status, ObjectStatus::Compressed);
        assert_eq!((objects[1].offset, objects[1].index), (9, 3));
        assert_eq!(objects[2].status, ObjectStatus::Null);
    }

    #[test]
    fn test_zero_width_type_defaults_to_in_use() {
        let xref = CrossReferenceStream::from_object(&xref_stream([0, 1, 0], Some(vec![5, 2]), 7, vec![10, 20])).unwrap();
        let ids: Vec<(u32, u64, ObjectStatus)> = xref.objects().iter().map(|o| (o.id, o.offset, o.status)).collect();
        assert_eq!(ids, vec![(5, 10, ObjectStatus::InUse), (6, 20, ObjectStatus::InUse)]);
    }

    #[test]
    fn test_truncated_data() {
        let result = CrossReferenceStream::from_object(&xref_stream([1, 2, 1], None, 3, vec![1, 0, 15, 0]));
        assert!(matches!(result, Err(Error::InvalidXref(_))));
    }

    #[test]
    fn test_rejects_other_types() {
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::name("ObjStm"));
        assert!(CrossReferenceStream::from_object(&Object::stream(dict, Vec::new())).is_err());
    }

    #[test]
    fn test_prepare_then_parse() {
        let mut xref = CrossReferenceStream::new();
        xref.objects_mut().push(DocumentObject::in_use(1, 0, 15));
        xref.objects_mut().push(DocumentObject::in_use(2, 0, 300));
        xref.objects_mut().push(DocumentObject::compressed(4, 3, 1));
        xref.objects_mut().push(DocumentObject::free(7, FREE_GENERATION));
        xref.set_size(8);
        xref.set_root(Some(ObjectRef::new(1, 0)));

        for compress in [false, true] {
            let stream = xref.prepare(true, compress).unwrap();
            let dict = stream.as_dict().unwrap();
            let keys: Vec<&str> = dict.keys().map(String::as_str).take(3).collect();
            assert_eq!(keys, vec!["Type", "Size", "Root"]);
            assert_eq!(
                dict.get("Index"),
                Some(&Object::Array(
                    [0, 3, 4, 1, 7, 1].iter().map(|&v| Object::Integer(v)).collect()
                ))
            );
            assert_eq!(
                dict.get("W"),
                Some(&Object::Array(vec![Object::Integer(1), Object::Integer(2), Object::Integer(2)]))
            );

            let parsed = CrossReferenceStream::from_object(&stream).unwrap();
            let entries: Vec<(u32, ObjectStatus, u64)> =
                parsed.objects().iter().map(|o| (o.id, o.status, o.offset)).collect();
            assert_eq!(
                entries,
                vec![
                    (1, ObjectStatus::InUse, 15),
                    (2, ObjectStatus::InUse, 300),
                    (4, ObjectStatus::Compressed, 3),
                    (7, ObjectStatus::Free, 0),
                ]
            );
            assert_eq!(parsed.root(), Some(ObjectRef::new(1, 0)));
        }
    }

    #[test]
    fn test_parse_indirect() {
        let mut xref = CrossReferenceStream::new();
        xref.objects_mut().push(DocumentObject::in_use(1, 0, 9));
        xref.set_size(3);
        let stream = xref.prepare(false, true).unwrap();

        let mut data = b"garbage\n".to_vec();
        let offset = data.len();
        data.extend_from_slice(b"\r\n");
        ObjectSerializer::new()
            .write_indirect(&mut data, ObjectRef::new(2, 0), &stream)
            .unwrap();

        let (reference, parsed) = CrossReferenceStream::parse(&data, offset).unwrap();
        assert_eq!(reference, ObjectRef::new(2, 0));
        assert_eq!(parsed.objects().len(), 1);
        assert_eq!(parsed.size(), 3);
    }
}
