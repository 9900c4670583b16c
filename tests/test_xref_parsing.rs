//! Parsing hand-assembled files: classic tables, xref streams, hybrid files
//! and damaged layouts.

use pdf_objstore::config::DocumentOptions;
use pdf_objstore::{Document, Error, Object, ObjectRef, ObjectStatus};
use std::collections::BTreeMap;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Assembles a file byte by byte, remembering object offsets.
struct RawPdf {
    buf: Vec<u8>,
    offsets: BTreeMap<u32, usize>,
}

impl RawPdf {
    fn new(version: &str) -> Self {
        Self {
            buf: format!("%PDF-{}\n", version).into_bytes(),
            offsets: BTreeMap::new(),
        }
    }

    fn object(&mut self, id: u32, body: &str) -> &mut Self {
        self.offsets.insert(id, self.buf.len());
        self.buf
            .extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", id, body).as_bytes());
        self
    }

    fn stream(&mut self, id: u32, dict: &str, data: &[u8]) -> usize {
        let at = self.buf.len();
        self.offsets.insert(id, at);
        self.buf.extend_from_slice(
            format!("{} 0 obj\n<< {} /Length {} >>\nstream\n", id, dict, data.len()).as_bytes(),
        );
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
        at
    }

    /// Classic table listing `ids` (one subsection each) plus object 0.
    fn table(&mut self, ids: &[u32], trailer: &str) -> usize {
        let at = self.buf.len();
        let mut text = String::from("xref\n0 1\n0000000000 65535 f\r\n");
        for id in ids {
            text.push_str(&format!("{} 1\n{:010} 00000 n\r\n", id, self.offsets[id]));
        }
        text.push_str(&format!("trailer\n{}\n", trailer));
        self.buf.extend_from_slice(text.as_bytes());
        at
    }

    fn finish(&mut self, startxref: usize) -> Vec<u8> {
        self.buf
            .extend_from_slice(format!("startxref\n{}\n%%EOF\n", startxref).as_bytes());
        self.buf.clone()
    }
}

/// Object stream holding 4 (`42`) and 5 (`(hi)`).
const OBJSTM: &[u8] = b"4 0 5 3 42 (hi)";

fn objstm_dict() -> &'static str {
    "/Type /ObjStm /N 2 /First 8"
}

/// One xref stream row with widths [1 2 1].
fn row(kind: u8, field: usize, extra: u8) -> [u8; 4] {
    [kind, (field >> 8) as u8, field as u8, extra]
}

#[test]
fn test_classic_table() {
    init();
    let mut pdf = RawPdf::new("1.4");
    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .object(3, "(plain)");
    let xref = pdf.table(&[1, 2, 3], "<< /Size 4 /Root 1 0 R >>");
    let doc = Document::from_pdf(pdf.finish(xref)).unwrap();

    assert_eq!(doc.version().to_string(), "1.4");
    assert_eq!(doc.catalog().unwrap().type_entry(), Some("Catalog"));
    assert_eq!(
        doc.get_value(ObjectRef::new(3, 0)).unwrap().as_string(),
        Some(&b"plain"[..])
    );
    assert!(!doc.wrong_structure());
}

#[test]
fn test_lf_only_records_and_indirect_length() {
    init();
    let mut pdf = RawPdf::new("1.4");
    pdf.object(1, "<< /Type /Catalog >>");
    pdf.object(2, "5");
    pdf.offsets.insert(3, pdf.buf.len());
    pdf.buf
        .extend_from_slice(b"3 0 obj\n<< /Length 2 0 R >>\nstream\nhello\nendstream\nendobj\n");

    let xref = pdf.buf.len();
    let mut text = String::from("xref\n0 4\n0000000000 65535 f \n");
    for id in 1..=3 {
        text.push_str(&format!("{:010} 00000 n \n", pdf.offsets[&id]));
    }
    text.push_str("trailer\n<< /Size 4 /Root 1 0 R >>\n");
    pdf.buf.extend_from_slice(text.as_bytes());
    let doc = Document::from_pdf(pdf.finish(xref)).unwrap();

    let stream = doc.get_value(ObjectRef::new(3, 0)).unwrap();
    assert_eq!(stream.as_stream_data().unwrap().as_ref(), b"hello");
}

#[test]
fn test_xref_stream_with_object_stream() {
    init();
    let mut pdf = RawPdf::new("1.5");
    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>");
    pdf.stream(3, objstm_dict(), OBJSTM);
    let xref = pdf.buf.len();

    let mut data = Vec::new();
    data.extend_from_slice(&row(0, 0, 0));
    data.extend_from_slice(&row(1, pdf.offsets[&1], 0));
    data.extend_from_slice(&row(1, pdf.offsets[&2], 0));
    data.extend_from_slice(&row(1, pdf.offsets[&3], 0));
    data.extend_from_slice(&row(2, 3, 0));
    data.extend_from_slice(&row(2, 3, 1));
    data.extend_from_slice(&row(1, xref, 0));
    pdf.stream(
        6,
        "/Type /XRef /Size 7 /W [1 2 1] /Index [0 7] /Root 1 0 R",
        &data,
    );
    let doc = Document::from_pdf(pdf.finish(xref)).unwrap();

    assert!(doc.head_revision().update().xref().is_stream());
    assert_eq!(doc.get_value(ObjectRef::new(4, 0)).unwrap(), &Object::Integer(42));
    assert_eq!(
        doc.get_value(ObjectRef::new(5, 0)).unwrap().as_string(),
        Some(&b"hi"[..])
    );
    assert_eq!(doc.get_object(4).unwrap().status, ObjectStatus::Compressed);

    let host = doc.get_object(3).unwrap();
    assert_eq!(host.object_stream(|| unreachable!()).unwrap().decode_count(), 1);
    assert!(!doc.wrong_structure());
}

#[test]
fn test_hybrid_file() {
    init();
    let mut pdf = RawPdf::new("1.5");
    pdf.object(1, "<< /Type /Catalog /Extra 4 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>");
    pdf.stream(3, objstm_dict(), OBJSTM);

    let stm_at = pdf.buf.len();
    let mut data = Vec::new();
    data.extend_from_slice(&row(2, 3, 0));
    data.extend_from_slice(&row(2, 3, 1));
    pdf.stream(6, "/Type /XRef /Size 7 /W [1 2 1] /Index [4 2]", &data);

    let xref = pdf.table(
        &[1, 2, 3],
        &format!("<< /Size 7 /Root 1 0 R /XRefStm {} >>", stm_at),
    );
    let doc = Document::from_pdf(pdf.finish(xref)).unwrap();

    assert!(!doc.head_revision().update().xref().is_stream());
    let extra = doc.catalog().unwrap().get("Extra").unwrap();
    assert_eq!(doc.resolve(extra).unwrap(), &Object::Integer(42));
    assert_eq!(
        doc.get_value(ObjectRef::new(5, 0)).unwrap().as_string(),
        Some(&b"hi"[..])
    );
}

#[test]
fn test_objects_after_xref_flag_wrong_structure() {
    init();
    let mut pdf = RawPdf::new("1.4");
    let header_len = pdf.buf.len();
    // The table comes first and names offsets that follow it.
    let body = "1 0 obj\n<< /Type /Catalog >>\nendobj\n";
    let table_len = "xref\n0 2\n0000000000 65535 f\r\n0000000000 00000 n\r\ntrailer\n<< /Size 2 /Root 1 0 R >>\n".len();
    let object_at = header_len + table_len;
    let table = format!(
        "xref\n0 2\n0000000000 65535 f\r\n{:010} 00000 n\r\ntrailer\n<< /Size 2 /Root 1 0 R >>\n",
        object_at
    );
    pdf.buf.extend_from_slice(table.as_bytes());
    pdf.buf.extend_from_slice(body.as_bytes());
    let doc = Document::from_pdf(pdf.finish(header_len)).unwrap();

    assert!(doc.wrong_structure());
    assert_eq!(doc.catalog().unwrap().type_entry(), Some("Catalog"));
}

#[test]
fn test_prev_loop_is_cut() {
    init();
    let mut pdf = RawPdf::new("1.4");
    pdf.object(1, "<< /Type /Catalog >>");
    let xref = pdf.buf.len();
    pdf.table(&[1], &format!("<< /Size 2 /Root 1 0 R /Prev {} >>", xref));
    let doc = Document::from_pdf(pdf.finish(xref)).unwrap();

    assert_eq!(doc.revision_count(), 1);
    assert!(doc.wrong_structure());
}

#[test]
fn test_update_depth_limit() {
    init();
    let mut doc = Document::new();
    let a = doc.append(Object::Integer(1));
    doc.to_pdf().unwrap();
    doc.set_value(a, Object::Integer(2)).unwrap();
    let bytes = doc.to_pdf().unwrap();

    let options = DocumentOptions::default().with_max_update_depth(1);
    assert!(matches!(
        Document::from_pdf_with_options(bytes.clone(), options),
        Err(Error::RecursionLimitExceeded(1))
    ));
    assert_eq!(Document::from_pdf(bytes).unwrap().revision_count(), 2);
}

#[test]
fn test_size_below_highest_id_is_corrected() {
    init();
    let mut pdf = RawPdf::new("1.4");
    pdf.object(1, "<< /Type /Catalog >>").object(7, "true");
    let xref = pdf.table(&[1, 7], "<< /Size 2 /Root 1 0 R >>");
    let mut doc = Document::from_pdf(pdf.finish(xref)).unwrap();

    assert_eq!(doc.get_value(ObjectRef::new(7, 0)).unwrap(), &Object::Boolean(true));
    assert_eq!(doc.append(Object::Null).id, 8);
}

#[test]
fn test_garbage_before_header() {
    init();
    let mut pdf = RawPdf::new("1.4");
    pdf.buf.splice(0..0, b"GARBAGE".iter().copied());
    pdf.object(1, "<< /Type /Catalog >>");
    let xref = pdf.table(&[1], "<< /Size 2 /Root 1 0 R >>");
    let doc = Document::from_pdf(pdf.finish(xref)).unwrap();
    assert_eq!(doc.version().to_string(), "1.4");
    assert_eq!(doc.catalog().unwrap().type_entry(), Some("Catalog"));
}

#[test]
fn test_invalid_inputs() {
    init();
    assert!(matches!(
        Document::from_pdf(&b"plain text"[..]),
        Err(Error::InvalidHeader(_))
    ));
    assert!(matches!(
        Document::from_pdf(&b"%PDF-1.7\n1 0 obj null endobj\n"[..]),
        Err(Error::InvalidXref(_))
    ));
    assert!(Document::from_pdf(&b"%PDF-1.7\nstartxref\n9999\n%%EOF\n"[..]).is_err());
}
