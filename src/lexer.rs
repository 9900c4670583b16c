//! PDF lexer (tokenizer).
//!
//! Recognizes numbers, literal and hex strings, names, keywords and
//! delimiters. Whitespace (space, \t, \r, \n, \0, \f) and comments
//! (% to EOL) between tokens are skipped.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{char, digit0, digit1, one_of},
    combinator::{map, opt, recognize, value},
    sequence::{pair, preceded, tuple},
    IResult,
};

/// Token types recognized by the PDF lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g., 42, -123)
    Integer(i64),
    /// Real number (e.g., 3.14, -.5)
    Real(f64),
    /// Raw bytes between `(` and `)`, escapes not yet decoded
    LiteralString(&'a [u8]),
    /// Raw bytes between `<` and `>`
    HexString(&'a [u8]),
    /// Name without the leading `/`, `#XX` escapes decoded
    Name(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// `<<`
    DictStart,
    /// `>>`
    DictEnd,
    /// `obj`
    ObjStart,
    /// `endobj`
    ObjEnd,
    /// `stream`
    StreamStart,
    /// `endstream`
    StreamEnd,
    /// `R`
    R,
}

/// PDF whitespace characters (ISO 32000-1, Table 1).
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// PDF delimiter characters (ISO 32000-1, Table 2).
pub fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip all whitespace and comments.
pub fn skip_ws(input: &[u8]) -> IResult<&[u8], ()> {
    let mut remaining = input;
    loop {
        let (rest, _) = take_while(is_whitespace)(remaining)?;
        remaining = rest;
        match comment(remaining) {
            Ok((rest, _)) => remaining = rest,
            Err(_) => return Ok((remaining, ())),
        }
    }
}

fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, text) = recognize(tuple((
        opt(one_of("+-")),
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
    )))(input)?;

    // Sign and digits are ASCII, so this cannot fail.
    let text = std::str::from_utf8(text).unwrap_or("0");
    let bad = || nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit));

    if text.contains('.') {
        text.parse().map(|r| (rest, Token::Real(r))).map_err(|_| bad())
    } else {
        match text.parse::<i64>() {
            Ok(i) => Ok((rest, Token::Integer(i))),
            // Out-of-range integers degrade to reals.
            Err(_) => text.parse().map(|r| (rest, Token::Real(r))).map_err(|_| bad()),
        }
    }
}

fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (body, _) = char('(')(input)?;
    let mut depth = 1usize;
    let mut pos = 0;

    while pos < body.len() {
        match body[pos] {
            b'\\' => pos += 2,
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[pos + 1..], Token::LiteralString(&body[..pos])));
                }
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Char)))
}

fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }
    let (rest, body) = preceded(
        char('<'),
        take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c)),
    )(input)?;
    let (rest, _) = char('>')(rest)?;
    Ok((rest, Token::HexString(body)))
}

/// Decode `#XX` escape sequences in a raw name.
///
/// ```
/// # use pdf_objstore::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes(b"A#20B#23C"), "A B#C");
/// assert_eq!(decode_name_escapes(b"A#"), "A#");
/// ```
pub fn decode_name_escapes(raw: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            let hex = std::str::from_utf8(&raw[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                bytes.push(byte);
                i += 3;
                continue;
            }
        }
        bytes.push(raw[i]);
        i += 1;
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    map(preceded(char('/'), take_while(is_regular)), |raw: &[u8]| {
        Token::Name(decode_name_escapes(raw))
    })(input)
}

fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, word) = alt((
        tag(b"<<"),
        tag(b">>"),
        tag(b"["),
        tag(b"]"),
        take_while1(|c: u8| c.is_ascii_alphabetic()),
    ))(input)?;

    let tok = match word {
        b"<<" => Token::DictStart,
        b">>" => Token::DictEnd,
        b"[" => Token::ArrayStart,
        b"]" => Token::ArrayEnd,
        b"true" => Token::True,
        b"false" => Token::False,
        b"null" => Token::Null,
        b"obj" => Token::ObjStart,
        b"endobj" => Token::ObjEnd,
        b"stream" => Token::StreamStart,
        b"endstream" => Token::StreamEnd,
        b"R" => Token::R,
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )));
        },
    };
    Ok((rest, tok))
}

/// Parse a single PDF token after skipping whitespace and comments.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, _) = skip_ws(input)?;
    alt((
        parse_keyword,
        parse_name,
        parse_number,
        parse_literal_string,
        parse_hex_string,
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(input: &[u8]) -> Token<'_> {
        token(input).unwrap().1
    }

    #[test]
    fn test_numbers() {
        assert_eq!(tok(b"42"), Token::Integer(42));
        assert_eq!(tok(b"-17"), Token::Integer(-17));
        assert_eq!(tok(b"+5"), Token::Integer(5));
        assert_eq!(tok(b"3.5"), Token::Real(3.5));
        assert_eq!(tok(b"-.25"), Token::Real(-0.25));
        assert_eq!(tok(b"4."), Token::Real(4.0));
    }

    #[test]
    fn test_keywords_need_word_boundary() {
        assert_eq!(tok(b"obj"), Token::ObjStart);
        assert_eq!(tok(b"endobj"), Token::ObjEnd);
        assert_eq!(tok(b"endstream"), Token::StreamEnd);
        assert_eq!(tok(b"R "), Token::R);
        assert!(token(b"trailer").is_err());
        assert!(token(b"xref").is_err());
    }

    #[test]
    fn test_strings() {
        assert_eq!(tok(b"(a (nested) \\) str)"), Token::LiteralString(b"a (nested) \\) str"));
        assert_eq!(tok(b"<48 65>"), Token::HexString(b"48 65"));
        assert_eq!(tok(b"<<"), Token::DictStart);
        assert!(token(b"(unterminated").is_err());
    }

    #[test]
    fn test_names() {
        assert_eq!(tok(b"/Type/Catalog"), Token::Name("Type".to_string()));
        assert_eq!(tok(b"/A#20B"), Token::Name("A B".to_string()));
        assert_eq!(tok(b"/"), Token::Name(String::new()));
    }

    #[test]
    fn test_skips_comments() {
        assert_eq!(tok(b"% comment\r\n  % another\n 7"), Token::Integer(7));
    }

    #[test]
    fn test_decode_name_escapes_invalid_sequence() {
        assert_eq!(decode_name_escapes(b"A#ZZ"), "A#ZZ");
        assert_eq!(decode_name_escapes(b"Plain"), "Plain");
    }
}
