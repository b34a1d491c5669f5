//! All supported document formats.
//!
//! This module re-exports the filter of each format and provides the
//! [`FormatType`] enum for generic handling, plus the event-queue and
//! start-document plumbing the filters share.

pub mod tmx;
pub(crate) mod tmx_unit;
pub mod tokens;
pub mod xml;

use std::{
    collections::VecDeque,
    fmt::{Display, Formatter},
    str::FromStr,
};

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};
use lazy_static::lazy_static;
use regex::Regex;

// Reexporting the filters for easier access
pub use tmx::{SegType, TmxFilter, TmxParameters};
pub use xml::{XmlFilter, XmlParameters};

use crate::{
    Error,
    encoder::XmlEncoder,
    raw_document::DecodedDocument,
    resource::{Event, Properties, StartDocument},
    skeleton::{Placeholder, Skeleton},
    traits::{CancelHandle, FilterState},
};

use self::tokens::{Token, Tokenizer};

lazy_static! {
    static ref DECL_ENCODING_VALUE: Regex =
        Regex::new(r#"(?s)^(.*?\sencoding\s*=\s*["'])([^"']*)(["'].*)$"#).unwrap();
}

/// Represents all supported document formats for generic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatType {
    /// Translation Memory eXchange, bilingual.
    Tmx,
    /// Generic XML, monolingual, driven by element rules.
    Xml,
}

/// Implements [`std::fmt::Display`] for [`FormatType`].
///
/// # Example
/// ```rust
/// use skelkit::formats::FormatType;
/// assert_eq!(FormatType::Tmx.to_string(), "tmx");
/// assert_eq!(FormatType::Xml.to_string(), "xml");
/// ```
impl Display for FormatType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatType::Tmx => write!(f, "tmx"),
            FormatType::Xml => write!(f, "xml"),
        }
    }
}

/// Implements [`std::str::FromStr`] for [`FormatType`].
///
/// Accepts `tmx` and `xml`, case-insensitively. Returns
/// [`crate::error::Error::UnknownFormat`] for anything else.
///
/// # Example
/// ```rust
/// use skelkit::formats::FormatType;
/// use std::str::FromStr;
/// assert_eq!(FormatType::from_str("TMX").unwrap(), FormatType::Tmx);
/// assert!(FormatType::from_str("xliff").is_err());
/// ```
impl FromStr for FormatType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "tmx" => Ok(FormatType::Tmx),
            "xml" => Ok(FormatType::Xml),
            other => Err(Error::UnknownFormat(other.to_string())),
        }
    }
}

impl FormatType {
    /// Returns the typical file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            FormatType::Tmx => "tmx",
            FormatType::Xml => "xml",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            FormatType::Tmx => tmx::MIME_TYPE,
            FormatType::Xml => xml::MIME_TYPE,
        }
    }

    /// True for formats that carry source and targets side by side.
    pub fn is_multilingual(&self) -> bool {
        matches!(self, FormatType::Tmx)
    }
}

/// Event queue and lifecycle shared by the filters.
#[derive(Debug, Default)]
pub(crate) struct EventStream {
    pub state: FilterState,
    pub cancel: CancelHandle,
    pub queue: VecDeque<Event>,
}

impl EventStream {
    pub fn start(&mut self, start_document: StartDocument) {
        self.queue.clear();
        self.cancel.reset();
        self.queue.push_back(Event::StartDocument(start_document));
        self.state = FilterState::Parsing;
    }

    pub fn has_next(&self) -> bool {
        self.state == FilterState::Parsing
    }

    /// Dequeues the next event, calling `pump` until something is queued.
    pub fn next_with<F>(&mut self, mut pump: F) -> Result<Event, Error>
    where
        F: FnMut(&mut VecDeque<Event>) -> Result<(), Error>,
    {
        match self.state {
            FilterState::Unopened => return Err(Error::invalid_state("filter is not open")),
            FilterState::Finished => return Err(Error::invalid_state("no more events")),
            FilterState::Parsing => {}
        }
        if self.cancel.is_cancelled() {
            self.queue.clear();
            self.state = FilterState::Finished;
            return Ok(Event::Cancelled);
        }
        while self.queue.is_empty() {
            if let Err(err) = pump(&mut self.queue) {
                self.queue.clear();
                self.state = FilterState::Finished;
                return Err(err);
            }
        }
        match self.queue.pop_front() {
            Some(event) => {
                if event.is_terminal() {
                    self.state = FilterState::Finished;
                }
                Ok(event)
            }
            None => Err(Error::invalid_state("event queue drained unexpectedly")),
        }
    }

    pub fn finish(&mut self) {
        self.queue.clear();
        if self.state == FilterState::Parsing {
            self.state = FilterState::Finished;
        }
    }
}

/// Monotonic resource ids: `1, 2, ...` for text units, `d1, d2, ...` for
/// document parts.
#[derive(Debug, Default)]
pub(crate) struct IdGenerator {
    units: u64,
    parts: u64,
}

impl IdGenerator {
    pub fn next_unit(&mut self) -> String {
        self.units += 1;
        self.units.to_string()
    }

    pub fn next_part(&mut self) -> String {
        self.parts += 1;
        format!("d{}", self.parts)
    }
}

pub(crate) const START_DOCUMENT_ID: &str = "sd1";
pub(crate) const ENDING_ID: &str = "ed1";

/// Splits an XML declaration around its encoding value so the value can be
/// replaced on output. Returns the skeleton and the declared label.
pub(crate) fn declaration_skeleton(raw: &str, resource_id: &str) -> (Skeleton, Option<String>) {
    match DECL_ENCODING_VALUE.captures(raw) {
        Some(caps) => {
            let mut skeleton = Skeleton::from_literal(&caps[1]);
            skeleton.add_placeholder(Placeholder::named(resource_id, "encoding"));
            skeleton.append_literal(&caps[3]);
            (skeleton, Some(caps[2].to_string()))
        }
        None => (Skeleton::from_literal(raw), None),
    }
}

/// Label the output declaration should carry: the declared one when it
/// names the encoding actually used, else the detected encoding's name.
pub(crate) fn output_label(declared: Option<&str>, detected: &'static Encoding) -> String {
    if let Some(label) = declared {
        let generic_utf16 = label.trim().eq_ignore_ascii_case("utf-16")
            && (detected == UTF_16LE || detected == UTF_16BE);
        if generic_utf16 || Encoding::for_label(label.trim().as_bytes()) == Some(detected) {
            return label.to_string();
        }
    }
    detected.name().to_string()
}

/// Content text uses `\n` only; the encoder writes the document's style.
pub(crate) fn normalize_line_breaks(text: &str) -> String {
    if text.contains('\r') {
        text.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        text.to_string()
    }
}

/// Consumes a leading XML declaration and builds the start-document
/// resource around it.
pub(crate) fn start_document(
    tokenizer: &mut Tokenizer,
    document: &DecodedDocument,
    mime_type: &str,
    multilingual: bool,
    escape_gt: bool,
) -> Result<StartDocument, Error> {
    let has_declaration = matches!(tokenizer.peek()?, Token::Declaration(_));
    let (skeleton, declared) = if has_declaration {
        let token = tokenizer.next_token()?;
        declaration_skeleton(token.raw(), START_DOCUMENT_ID)
    } else {
        (Skeleton::new(), None)
    };
    let locale = document
        .source_locale
        .clone()
        .ok_or(Error::MissingLocale("source"))?;
    Ok(StartDocument {
        id: START_DOCUMENT_ID.to_string(),
        name: document.name.clone(),
        encoding: output_label(declared.as_deref(), document.encoding),
        detected_encoding: document.encoding.name().to_string(),
        has_bom: document.has_bom,
        locale,
        target_locale: document.target_locale.clone(),
        line_break: document.line_break,
        mime_type: mime_type.to_string(),
        multilingual,
        encoder: XmlEncoder::new(escape_gt, document.line_break),
        properties: Properties::new(),
        skeleton,
    })
}
