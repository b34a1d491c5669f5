//! Output escaping for XML-family content.

use quick_xml::escape::{minimal_escape, partial_escape};
use serde::{Deserialize, Serialize};

use crate::{
    container::TextContainer,
    detector::LineBreak,
    fragment::{Piece, TextFragment},
};

/// Escapes extracted text when it is written back into markup.
///
/// `&` and `<` are always escaped, `>` only on request. Quotes are left
/// alone since content never lands inside an attribute. Line feeds become
/// the document's line break.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlEncoder {
    pub escape_gt: bool,
    pub line_break: LineBreak,
}

impl XmlEncoder {
    pub fn new(escape_gt: bool, line_break: LineBreak) -> Self {
        XmlEncoder {
            escape_gt,
            line_break,
        }
    }

    pub fn encode_text(&self, text: &str) -> String {
        let escaped = if self.escape_gt {
            partial_escape(text)
        } else {
            minimal_escape(text)
        };
        match self.line_break {
            LineBreak::Lf => escaped.into_owned(),
            other => escaped.replace('\n', other.as_str()),
        }
    }

    /// Encodes a fragment. Unchanged fragments are written from their
    /// original markup.
    pub fn encode_fragment(&self, fragment: &TextFragment) -> String {
        if let Some(original) = fragment.original_markup() {
            return original.to_string();
        }
        let mut out = String::new();
        for piece in fragment.pieces() {
            match piece {
                Piece::Text(text) => out.push_str(&self.encode_text(text)),
                Piece::Code { code, .. } => out.push_str(code.output()),
            }
        }
        out
    }

    pub fn encode_container(&self, container: &TextContainer) -> String {
        container
            .segments()
            .iter()
            .map(|segment| self.encode_fragment(&segment.content))
            .collect()
    }
}
