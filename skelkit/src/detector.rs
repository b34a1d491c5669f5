//! Byte-order-mark, encoding and line-break detection.
//!
//! The detector looks at a bounded prefix of the input only. The prefix is
//! handed back chained in front of the remaining stream, positioned past
//! any byte-order mark, so nothing has to be rewound.

use std::io::{Chain, Cursor, Read};

use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};
use lazy_static::lazy_static;
use log::debug;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// How many bytes are inspected before giving up on finding a line break.
pub const LOOKAHEAD: usize = 8 * 1024;

lazy_static! {
    static ref DECL_ENCODING: Regex =
        Regex::new(r#"^\s*<\?xml[^>]*?\sencoding\s*=\s*["']([A-Za-z0-9._:\-]+)["']"#).unwrap();
}

/// Line-break style of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineBreak {
    #[default]
    Lf,
    Cr,
    CrLf,
}

impl LineBreak {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineBreak::Lf => "\n",
            LineBreak::Cr => "\r",
            LineBreak::CrLf => "\r\n",
        }
    }
}

/// Byte-order marks recognised at the start of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bom {
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
}

impl Bom {
    pub fn sniff(bytes: &[u8]) -> Option<Bom> {
        match bytes {
            [0x00, 0x00, 0xFE, 0xFF, ..] => Some(Bom::Utf32Be),
            [0xFF, 0xFE, 0x00, 0x00, ..] => Some(Bom::Utf32Le),
            [0xEF, 0xBB, 0xBF, ..] => Some(Bom::Utf8),
            [0xFE, 0xFF, ..] => Some(Bom::Utf16Be),
            [0xFF, 0xFE, ..] => Some(Bom::Utf16Le),
            _ => None,
        }
    }

    pub fn byte_len(&self) -> usize {
        match self {
            Bom::Utf8 => 3,
            Bom::Utf16Le | Bom::Utf16Be => 2,
            Bom::Utf32Le | Bom::Utf32Be => 4,
        }
    }

    /// The bytes of the mark for an output encoding, if it has one.
    pub fn bytes_for(encoding: &'static Encoding) -> Option<&'static [u8]> {
        if encoding == UTF_8 {
            Some(&[0xEF, 0xBB, 0xBF])
        } else if encoding == UTF_16LE {
            Some(&[0xFF, 0xFE])
        } else if encoding == UTF_16BE {
            Some(&[0xFE, 0xFF])
        } else {
            None
        }
    }
}

/// Result of a detection pass.
pub struct Detection<R: Read> {
    pub encoding: &'static Encoding,
    pub has_bom: bool,
    pub bom_len: usize,
    pub line_break: LineBreak,
    /// The input positioned just past the byte-order mark.
    pub reader: Chain<Cursor<Vec<u8>>, R>,
}

impl<R: Read> std::fmt::Debug for Detection<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detection")
            .field("encoding", &self.encoding.name())
            .field("has_bom", &self.has_bom)
            .field("bom_len", &self.bom_len)
            .field("line_break", &self.line_break)
            .finish()
    }
}

/// Detects encoding and line-break style from a stream prefix.
///
/// Precedence for the encoding: byte-order mark, then the `encoding`
/// pseudo-attribute of an XML declaration, then the caller's default, then
/// UTF-8.
pub struct BomNewlineDetector;

impl BomNewlineDetector {
    pub fn detect<R: Read>(
        mut reader: R,
        default_encoding: Option<&str>,
    ) -> Result<Detection<R>, Error> {
        let prefix = read_prefix(&mut reader, LOOKAHEAD)?;

        let bom = Bom::sniff(&prefix);
        let (encoding, bom_len) = match bom {
            Some(Bom::Utf32Le) | Some(Bom::Utf32Be) => {
                return Err(Error::UnsupportedEncoding("UTF-32".to_string()));
            }
            Some(Bom::Utf8) => (UTF_8, 3),
            Some(Bom::Utf16Le) => (UTF_16LE, 2),
            Some(Bom::Utf16Be) => (UTF_16BE, 2),
            None => (resolve_without_bom(&prefix, default_encoding)?, 0),
        };

        let body = &prefix[bom_len..];
        let (decoded, _) = encoding.decode_without_bom_handling(body);
        let line_break = first_line_break(&decoded).unwrap_or_else(|| {
            debug!("No line break in the first {} bytes, assuming LF", LOOKAHEAD);
            LineBreak::Lf
        });

        let remainder = prefix[bom_len..].to_vec();
        Ok(Detection {
            encoding,
            has_bom: bom.is_some(),
            bom_len,
            line_break,
            reader: Cursor::new(remainder).chain(reader),
        })
    }
}

/// Encoding label from an XML declaration at the very start of `bytes`.
pub fn declared_encoding(bytes: &[u8]) -> Option<String> {
    DECL_ENCODING
        .captures(bytes)
        .and_then(|caps| caps.get(1))
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
}

/// Resolves an encoding label, rejecting labels `encoding_rs` does not know.
pub fn encoding_for_label(label: &str) -> Result<&'static Encoding, Error> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| Error::UnsupportedEncoding(label.to_string()))
}

/// First line terminator in `text`.
pub fn first_line_break(text: &str) -> Option<LineBreak> {
    let bytes = text.as_bytes();
    let pos = bytes.iter().position(|b| *b == b'\n' || *b == b'\r')?;
    Some(match bytes[pos] {
        b'\n' => LineBreak::Lf,
        _ if bytes.get(pos + 1) == Some(&b'\n') => LineBreak::CrLf,
        _ => LineBreak::Cr,
    })
}

fn resolve_without_bom(
    prefix: &[u8],
    default_encoding: Option<&str>,
) -> Result<&'static Encoding, Error> {
    if let Some(label) = declared_encoding(prefix) {
        match Encoding::for_label(label.as_bytes()) {
            Some(encoding) => return Ok(encoding),
            None => debug!("Ignoring unknown declared encoding `{}`", label),
        }
    }
    match default_encoding {
        Some(label) => encoding_for_label(label),
        None => {
            debug!("No byte-order mark or declared encoding, falling back to UTF-8");
            Ok(UTF_8)
        }
    }
}

fn read_prefix<R: Read>(reader: &mut R, limit: usize) -> Result<Vec<u8>, Error> {
    let mut prefix = Vec::with_capacity(limit);
    reader.by_ref().take(limit as u64).read_to_end(&mut prefix)?;
    Ok(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect<'a>(bytes: &'a [u8], default: Option<&str>) -> Detection<&'a [u8]> {
        BomNewlineDetector::detect(bytes, default).unwrap()
    }

    #[test]
    fn test_utf16le_bom_wins_over_declared_utf8() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\r\n<a/>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let detection = detect(&bytes, Some("UTF-8"));
        assert_eq!(detection.encoding, UTF_16LE);
        assert!(detection.has_bom);
        assert_eq!(detection.bom_len, 2);
        assert_eq!(detection.line_break, LineBreak::CrLf);
    }

    #[test]
    fn test_utf8_bom_is_consumed() {
        let bytes = b"\xEF\xBB\xBF<a/>\n";
        let mut detection = detect(bytes, None);
        assert_eq!(detection.encoding, UTF_8);
        let mut rest = String::new();
        detection.reader.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "<a/>\n");
    }

    #[test]
    fn test_utf16be_bom() {
        let detection = detect(&[0xFE, 0xFF, 0x00, b'<'], None);
        assert_eq!(detection.encoding, UTF_16BE);
    }

    #[test]
    fn test_utf32_is_rejected() {
        let result = BomNewlineDetector::detect(&[0xFF, 0xFE, 0x00, 0x00][..], None);
        assert!(matches!(result, Err(Error::UnsupportedEncoding(_))));
    }

    #[test]
    fn test_declaration_beats_default() {
        let bytes = b"<?xml version='1.0' encoding='ISO-8859-1'?><a/>";
        let detection = detect(bytes, Some("UTF-8"));
        assert_eq!(detection.encoding.name(), "windows-1252");
        assert!(!detection.has_bom);
    }

    #[test]
    fn test_default_then_utf8_fallback() {
        assert_eq!(detect(b"<a/>", Some("shift_jis")).encoding.name(), "Shift_JIS");
        assert_eq!(detect(b"<a/>", None).encoding, UTF_8);
    }

    #[test]
    fn test_unknown_default_is_an_error() {
        let result = BomNewlineDetector::detect(&b"<a/>"[..], Some("no-such-charset"));
        assert!(matches!(result, Err(Error::UnsupportedEncoding(_))));
    }

    #[test]
    fn test_line_break_styles() {
        assert_eq!(detect(b"a\nb", None).line_break, LineBreak::Lf);
        assert_eq!(detect(b"a\r\nb", None).line_break, LineBreak::CrLf);
        assert_eq!(detect(b"a\rb", None).line_break, LineBreak::Cr);
        assert_eq!(detect(b"ab", None).line_break, LineBreak::Lf);
    }

    #[test]
    fn test_reader_replays_whole_stream_past_lookahead() {
        let mut input = vec![b'x'; LOOKAHEAD + 10];
        input.extend_from_slice(b"\n");
        let mut detection = detect(&input, None);
        assert_eq!(detection.line_break, LineBreak::Lf);
        let mut rest = Vec::new();
        detection.reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, input);
    }
}
