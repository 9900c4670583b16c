//! Loading options from JSON and applying them to documents.

use pdf_objstore::config::{DocumentOptions, XrefStyle, DEFAULT_MAX_UPDATE_DEPTH};
use pdf_objstore::{Document, Object};

#[test]
fn test_partial_json_keeps_defaults() {
    let options: DocumentOptions =
        serde_json::from_str(r#"{"xref":"stream","object_streams":true}"#).unwrap();
    assert_eq!(options.xref, XrefStyle::Stream);
    assert!(options.object_streams);
    assert!(options.compress_streams);
    assert!(options.decrypt_on_open);
    assert_eq!(options.max_update_depth, DEFAULT_MAX_UPDATE_DEPTH);
    assert!(options.password.is_none());
    assert!(options.encryption.is_none());
}

#[test]
fn test_empty_json_is_default() {
    let options: DocumentOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(options.xref, XrefStyle::Table);
    assert!(!options.object_streams);
}

#[test]
fn test_serialized_options_skip_callbacks() {
    let options = DocumentOptions::default()
        .with_password("secret")
        .with_max_update_depth(8);
    let value = serde_json::to_value(&options).unwrap();
    assert_eq!(value["xref"], "table");
    assert_eq!(value["password"], "secret");
    assert_eq!(value["max_update_depth"], 8);
    assert!(value.get("encryption").is_none());
    assert!(value.get("on_certificate").is_none());
}

#[test]
fn test_unknown_xref_style_is_rejected() {
    assert!(serde_json::from_str::<DocumentOptions>(r#"{"xref":"binary"}"#).is_err());
}

#[test]
fn test_options_from_json_drive_writing() {
    let options: DocumentOptions =
        serde_json::from_str(r#"{"xref":"stream","compress_streams":false}"#).unwrap();
    let mut doc = Document::with_options(options).unwrap();
    doc.append(Object::Integer(5));
    let bytes = doc.to_pdf().unwrap();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("/Type /XRef"));
    assert!(!text.contains("/FlateDecode"));
}
