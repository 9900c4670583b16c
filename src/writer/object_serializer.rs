//! PDF object serialization.
//!
//! Serializes PDF objects to their byte representation according to
//! ISO 32000-1:2008, section 7.3. Dictionaries are written in insertion
//! order so that re-serializing a parsed object is byte-stable.

use crate::error::Result;
use crate::object::{Dictionary, Object, ObjectRef};
use std::io::Write;

/// Serializer for PDF objects.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer {
    /// Put each dictionary entry on its own line
    pretty: bool,
}

impl ObjectSerializer {
    /// Create a serializer producing compact, single-line output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a serializer that writes one dictionary entry per line.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj)?;
        Ok(buf)
    }

    /// Serialize an object to a string (for debugging and tests).
    pub fn serialize_to_string(&self, obj: &Object) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.serialize(obj)?).into_owned())
    }

    /// Append an indirect object definition: `{id} {gen} obj\n{object}\nendobj\n`.
    pub fn write_indirect(&self, buf: &mut Vec<u8>, reference: ObjectRef, obj: &Object) -> Result<()> {
        writeln!(buf, "{} {} obj", reference.id, reference.gen)?;
        self.write_object(buf, obj)?;
        buf.extend_from_slice(b"\nendobj\n");
        Ok(())
    }

    /// Serialize an indirect object definition.
    pub fn serialize_indirect(&self, reference: ObjectRef, obj: &Object) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_indirect(&mut buf, reference, obj)?;
        Ok(buf)
    }

    fn write_object<W: Write>(&self, w: &mut W, obj: &Object) -> std::io::Result<()> {
        match obj {
            Object::Null => write!(w, "null"),
            Object::Boolean(b) => write!(w, "{}", b),
            Object::Integer(i) => write!(w, "{}", i),
            Object::Real(r) => write_real(w, *r),
            Object::String(s) => write_string(w, s),
            Object::Name(n) => write_name(w, n),
            Object::Array(arr) => {
                w.write_all(b"[")?;
                for (i, item) in arr.iter().enumerate() {
                    if i > 0 {
                        w.write_all(b" ")?;
                    }
                    self.write_object(w, item)?;
                }
                w.write_all(b"]")
            },
            Object::Dictionary(dict) => self.write_dictionary(w, dict),
            Object::Stream { dict, data } => {
                let mut dict = dict.clone();
                dict.insert("Length".to_string(), Object::Integer(data.len() as i64));
                self.write_dictionary(w, &dict)?;
                w.write_all(b"\nstream\n")?;
                w.write_all(data)?;
                w.write_all(b"\nendstream")
            },
            Object::Reference(r) => write!(w, "{} {} R", r.id, r.gen),
        }
    }

    fn write_dictionary<W: Write>(&self, w: &mut W, dict: &Dictionary) -> std::io::Result<()> {
        w.write_all(b"<<")?;
        for (i, (key, value)) in dict.iter().enumerate() {
            if self.pretty {
                w.write_all(b"\n")?;
            } else if i > 0 {
                w.write_all(b" ")?;
            }
            write_name(w, key)?;
            w.write_all(b" ")?;
            self.write_object(w, value)?;
        }
        if self.pretty && !dict.is_empty() {
            w.write_all(b"\n")?;
        }
        w.write_all(b">>")
    }
}

fn write_real<W: Write>(w: &mut W, value: f64) -> std::io::Result<()> {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        return write!(w, "{}", value as i64);
    }
    let formatted = format!("{:.6}", value);
    write!(w, "{}", formatted.trim_end_matches('0').trim_end_matches('.'))
}

/// Literal syntax for printable text, hex syntax for anything binary.
fn write_string<W: Write>(w: &mut W, data: &[u8]) -> std::io::Result<()> {
    let printable = data
        .iter()
        .all(|&b| matches!(b, b'\n' | b'\r' | b'\t') || (0x20..=0x7E).contains(&b));

    if !printable {
        w.write_all(b"<")?;
        for byte in data {
            write!(w, "{:02X}", byte)?;
        }
        return w.write_all(b">");
    }

    w.write_all(b"(")?;
    for &byte in data {
        match byte {
            b'(' | b')' | b'\\' => w.write_all(&[b'\\', byte])?,
            b'\n' => w.write_all(b"\\n")?,
            b'\r' => w.write_all(b"\\r")?,
            b'\t' => w.write_all(b"\\t")?,
            _ => w.write_all(&[byte])?,
        }
    }
    w.write_all(b")")
}

/// Names escape `#`, delimiters, whitespace and non-printable bytes as `#XX`.
fn write_name<W: Write>(w: &mut W, name: &str) -> std::io::Result<()> {
    w.write_all(b"/")?;
    for byte in name.bytes() {
        let regular = (0x21..=0x7E).contains(&byte)
            && byte != b'#'
            && !crate::lexer::is_delimiter(byte);
        if regular {
            w.write_all(&[byte])?;
        } else {
            write!(w, "#{:02X}", byte)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_object;

    fn ser(obj: &Object) -> String {
        ObjectSerializer::new().serialize_to_string(obj).unwrap()
    }

    #[test]
    fn test_serialize_primitives() {
        assert_eq!(ser(&Object::Null), "null");
        assert_eq!(ser(&Object::Boolean(true)), "true");
        assert_eq!(ser(&Object::Integer(-123)), "-123");
        assert_eq!(ser(&Object::Real(3.14258)), "3.14258");
        assert_eq!(ser(&Object::Real(1.0)), "1");
        assert_eq!(ser(&Object::Real(0.5)), "0.5");
        assert_eq!(ser(&Object::Reference(ObjectRef::new(10, 0))), "10 0 R");
    }

    #[test]
    fn test_serialize_strings() {
        assert_eq!(ser(&Object::string(b"Test (parens)".to_vec())), "(Test \\(parens\\))");
        assert_eq!(ser(&Object::string(vec![0x00, 0xFF, 0x80])), "<00FF80>");
    }

    #[test]
    fn test_serialize_names() {
        assert_eq!(ser(&Object::name("Type")), "/Type");
        assert_eq!(ser(&Object::name("Name With Space")), "/Name#20With#20Space");
        assert_eq!(ser(&Object::name("A#B(C)")), "/A#23B#28C#29");
    }

    #[test]
    fn test_serialize_dictionary_in_insertion_order() {
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::name("Page"));
        dict.insert("Count".to_string(), Object::Integer(1));
        dict.insert("Kids".to_string(), Object::Array(vec![Object::Integer(1), Object::Integer(2)]));
        assert_eq!(ser(&Object::Dictionary(dict)), "<</Type /Page /Count 1 /Kids [1 2]>>");
    }

    #[test]
    fn test_serialize_stream_sets_length() {
        let mut dict = Dictionary::new();
        dict.insert("Length".to_string(), Object::Integer(999));
        let stream = Object::stream(dict, b"stream data".to_vec());
        assert_eq!(ser(&stream), "<</Length 11>>\nstream\nstream data\nendstream");
    }

    #[test]
    fn test_serialize_indirect() {
        let bytes = ObjectSerializer::new()
            .serialize_indirect(ObjectRef::new(1, 0), &Object::Integer(42))
            .unwrap();
        assert_eq!(bytes, b"1 0 obj\n42\nendobj\n");
    }

    #[test]
    fn test_pretty_dictionary() {
        let mut dict = Dictionary::new();
        dict.insert("A".to_string(), Object::Integer(1));
        let out = ObjectSerializer::pretty()
            .serialize_to_string(&Object::Dictionary(dict))
            .unwrap();
        assert_eq!(out, "<<\n/A 1\n>>");
    }

    #[test]
    fn test_parse_serialize_is_stable() {
        let source = b"<</Type /Catalog /Names <</Dests 4 0 R>> /Title (Caf\\351) /V [0.25 -3 /N#23]>>";
        let (_, parsed) = parse_object(source).unwrap();
        let written = ObjectSerializer::new().serialize(&parsed).unwrap();
        let (_, reparsed) = parse_object(&written).unwrap();
        assert_eq!(parsed, reparsed);
    }
}
