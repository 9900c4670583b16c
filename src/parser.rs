//! PDF object parser.
//!
//! Recursive descent over [`crate::lexer`] tokens: primitives, arrays,
//! dictionaries, indirect references, streams and `N G obj ... endobj`
//! wrappers. All entry points are nom parsers over byte slices, with
//! [`parse_indirect_at`] as the offset-based convenience the object store
//! uses.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Dictionary, Object, ObjectRef};
use nom::IResult;

fn fail<T>(input: &[u8], kind: nom::error::ErrorKind) -> IResult<&[u8], T> {
    Err(nom::Err::Error(nom::error::Error::new(input, kind)))
}

/// Decode escape sequences in PDF literal strings (ISO 32000-1, 7.3.4.2).
///
/// ```
/// # use pdf_objstore::parser::decode_literal_string_escapes;
/// assert_eq!(decode_literal_string_escapes(b"Section \\247 \\(1\\)"), b"Section \xa7 (1)");
/// ```
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        let c = raw[i];
        if c != b'\\' || i + 1 >= raw.len() {
            // A bare CR or CRLF inside a literal string reads as LF.
            if c == b'\r' {
                result.push(b'\n');
                if raw.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
            } else if c != b'\\' {
                result.push(c);
            }
            i += 1;
            continue;
        }

        let next = raw[i + 1];
        i += 2;
        match next {
            b'n' => result.push(b'\n'),
            b'r' => result.push(b'\r'),
            b't' => result.push(b'\t'),
            b'b' => result.push(0x08),
            b'f' => result.push(0x0C),
            b'(' | b')' | b'\\' => result.push(next),
            b'\n' => {},
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let mut octal = (next - b'0') as u32;
                for _ in 0..2 {
                    match raw.get(i) {
                        Some(d @ b'0'..=b'7') => {
                            octal = octal * 8 + (d - b'0') as u32;
                            i += 1;
                        },
                        _ => break,
                    }
                }
                result.push((octal & 0xFF) as u8);
            },
            // Unknown escape: the backslash is dropped.
            other => result.push(other),
        }
    }

    result
}

/// Decode a hex string body to bytes; an odd final digit is padded with 0.
///
/// ```
/// # use pdf_objstore::parser::decode_hex;
/// assert_eq!(decode_hex(b"48 65 6C 6C 6F").unwrap(), b"Hello");
/// assert_eq!(decode_hex(b"901FA").unwrap(), vec![0x90, 0x1F, 0xA0]);
/// ```
pub fn decode_hex(hex_bytes: &[u8]) -> Result<Vec<u8>> {
    let digits: Vec<u8> = hex_bytes
        .iter()
        .copied()
        .filter(|c| !c.is_ascii_whitespace() && *c != 0)
        .collect();

    let nibble = |c: u8| -> Result<u8> {
        (c as char)
            .to_digit(16)
            .map(|d| d as u8)
            .ok_or_else(|| Error::parse(0, format!("Invalid hex digit '{}'", c as char)))
    };

    digits
        .chunks(2)
        .map(|pair| {
            let hi = nibble(pair[0])?;
            let lo = match pair.get(1) {
                Some(&c) => nibble(c)?,
                None => 0,
            };
            Ok(hi << 4 | lo)
        })
        .collect()
}

/// Parse a PDF object from input bytes.
///
/// ```
/// use pdf_objstore::parser::parse_object;
///
/// let (_, obj) = parse_object(b"<< /Kids [ 3 0 R 4 0 R ] /Count 2 >>").unwrap();
/// assert_eq!(obj.get("Count").and_then(|c| c.as_integer()), Some(2));
/// ```
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let (rest, tok) = token(input)?;

    match tok {
        Token::Null => Ok((rest, Object::Null)),
        Token::True => Ok((rest, Object::Boolean(true))),
        Token::False => Ok((rest, Object::Boolean(false))),
        Token::Integer(i) => {
            // `id gen R` is a reference; anything else leaves a plain integer.
            if let Ok((after_gen, Token::Integer(gen))) = token(rest) {
                if let Ok((after_r, Token::R)) = token(after_gen) {
                    if (0..=u32::MAX as i64).contains(&i) && (0..=u16::MAX as i64).contains(&gen) {
                        return Ok((after_r, Object::Reference(ObjectRef::new(i as u32, gen as u16))));
                    }
                }
            }
            Ok((rest, Object::Integer(i)))
        },
        Token::Real(r) => Ok((rest, Object::Real(r))),
        Token::LiteralString(raw) => Ok((rest, Object::String(decode_literal_string_escapes(raw)))),
        Token::HexString(raw) => match decode_hex(raw) {
            Ok(bytes) => Ok((rest, Object::String(bytes))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::HexDigit,
            ))),
        },
        Token::Name(name) => Ok((rest, Object::Name(name))),
        Token::ArrayStart => parse_array(rest),
        Token::DictStart => {
            let (rest, dict) = parse_dictionary(rest)?;
            match token(rest) {
                Ok((after_kw, Token::StreamStart)) => {
                    let (rest, data) = parse_stream_data(after_kw, &dict)?;
                    Ok((rest, Object::Stream { dict, data: bytes::Bytes::from(data) }))
                },
                _ => Ok((rest, Object::Dictionary(dict))),
            }
        },
        _ => fail(input, nom::error::ErrorKind::Tag),
    }
}

fn parse_array(mut input: &[u8]) -> IResult<&[u8], Object> {
    let mut items = Vec::new();
    loop {
        if let Ok((rest, Token::ArrayEnd)) = token(input) {
            return Ok((rest, Object::Array(items)));
        }
        let (rest, item) = parse_object(input)?;
        items.push(item);
        input = rest;
    }
}

fn parse_dictionary(mut input: &[u8]) -> IResult<&[u8], Dictionary> {
    let mut dict = Dictionary::new();
    loop {
        let (rest, tok) = token(input)?;
        match tok {
            Token::DictEnd => return Ok((rest, dict)),
            Token::Name(key) => {
                let (rest, value) = parse_object(rest)?;
                // A null value is equivalent to an absent entry.
                if !value.is_null() {
                    dict.insert(key, value);
                }
                input = rest;
            },
            _ => return fail(input, nom::error::ErrorKind::Tag),
        }
    }
}

/// Position of the next `endstream` keyword.
pub fn find_endstream(input: &[u8]) -> Option<usize> {
    input.windows(9).position(|w| w == b"endstream")
}

fn strip_trailing_eol(data: &[u8]) -> &[u8] {
    let data = data.strip_suffix(b"\n").unwrap_or(data);
    data.strip_suffix(b"\r").unwrap_or(data)
}

fn parse_stream_data<'a>(input: &'a [u8], dict: &Dictionary) -> IResult<&'a [u8], Vec<u8>> {
    // `stream` is followed by CRLF or LF; a lone CR is tolerated.
    let input = if let Some(rest) = input.strip_prefix(b"\r\n") {
        rest
    } else if let Some(rest) = input.strip_prefix(b"\n").or_else(|| input.strip_prefix(b"\r")) {
        rest
    } else {
        log::warn!("No end-of-line after stream keyword");
        input
    };

    if let Some(length) = dict.get("Length").and_then(Object::as_integer) {
        let length = length.max(0) as usize;
        if length <= input.len() {
            if let Ok((rest, Token::StreamEnd)) = token(&input[length..]) {
                return Ok((rest, input[..length].to_vec()));
            }
            log::debug!("/Length {} does not end at endstream, scanning", length);
        }
    }

    match find_endstream(input) {
        Some(pos) => {
            let data = strip_trailing_eol(&input[..pos]).to_vec();
            Ok((&input[pos + 9..], data))
        },
        None => fail(input, nom::error::ErrorKind::Eof),
    }
}

/// Parse `id gen obj <object> endobj`.
///
/// A missing `endobj` is tolerated since some writers omit it before
/// `xref` or the next object.
pub fn parse_indirect_object(input: &[u8]) -> IResult<&[u8], (ObjectRef, Object)> {
    let (rest, id) = token(input)?;
    let (rest, gen) = token(rest)?;
    let (rest, kw) = token(rest)?;
    let reference = match (id, gen, kw) {
        (Token::Integer(id), Token::Integer(gen), Token::ObjStart)
            if (0..=u32::MAX as i64).contains(&id) && (0..=u16::MAX as i64).contains(&gen) =>
        {
            ObjectRef::new(id as u32, gen as u16)
        },
        _ => return fail(input, nom::error::ErrorKind::Tag),
    };

    let (rest, object) = parse_object(rest)?;
    match token(rest) {
        Ok((after, Token::ObjEnd)) => Ok((after, (reference, object))),
        _ => {
            log::debug!("Object {} has no endobj", reference);
            Ok((rest, (reference, object)))
        },
    }
}

/// Parse the indirect object starting at `offset` in `data`.
///
/// Returns the reference, the value and the offset just past the object.
pub fn parse_indirect_at(data: &[u8], offset: usize) -> Result<(ObjectRef, Object, usize)> {
    let input = data.get(offset..).ok_or(Error::UnexpectedEof)?;
    match parse_indirect_object(input) {
        Ok((rest, (reference, object))) => Ok((reference, object, data.len() - rest.len())),
        Err(e) => Err(Error::parse(offset, format!("invalid indirect object: {:?}", e))),
    }
}
