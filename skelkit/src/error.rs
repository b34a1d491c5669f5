//! All error types for the skelkit crate.
//!
//! These are returned from every fallible operation: detection, opening a
//! filter, pulling events and writing output. Recoverable unit problems and
//! soft data-quality issues are logged instead and never surface here.

use std::io;

use thiserror::Error;

/// A byte sequence that is not valid in the document's encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed {encoding} byte sequence at offset {offset}")]
pub struct MalformedInput {
    pub encoding: &'static str,
    /// Offset of the first bad byte from the start of the input.
    pub offset: u64,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown format `{0}`")]
    UnknownFormat(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    XmlParse(quick_xml::Error),

    #[error(transparent)]
    MalformedInput(#[from] MalformedInput),

    #[error("XML attribute error: {0}")]
    XmlAttribute(String),

    #[error("I/O error: {0}")]
    Io(io::Error),

    #[error("missing {0} locale")]
    MissingLocale(&'static str),

    #[error("invalid unit: {0}")]
    InvalidUnit(String),

    #[error("no source variant for locale `{locale}` in unit {unit}")]
    MissingSourceVariant { locale: String, unit: String },

    #[error("more than one source variant for locale `{locale}` in unit {unit}")]
    DuplicateSourceVariant { locale: String, unit: String },

    #[error("variant without locale in unit {0}")]
    MissingVariantLocale(String),

    #[error("unexpected end of document inside <{0}>")]
    UnexpectedEof(String),

    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("invalid filter state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Creates a new invalid-unit error
    pub fn invalid_unit(message: impl Into<String>) -> Self {
        Error::InvalidUnit(message.into())
    }

    /// Creates a new invalid-state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }

    /// True for errors raised by the structure of one unit, as opposed to
    /// a malformed byte stream or a misconfigured filter.
    pub fn is_unit_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidUnit(_)
                | Error::MissingSourceVariant { .. }
                | Error::DuplicateSourceVariant { .. }
        )
    }
}

/// Undecodable input surfaces as an I/O error carrying [`MalformedInput`].
fn malformed(error: &io::Error) -> Option<MalformedInput> {
    error.get_ref()?.downcast_ref::<MalformedInput>().cloned()
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        match malformed(&value) {
            Some(input) => Error::MalformedInput(input),
            None => Error::Io(value),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(value: quick_xml::Error) -> Self {
        if let quick_xml::Error::Io(cause) = &value {
            if let Some(input) = malformed(cause) {
                return Error::MalformedInput(input);
            }
        }
        Error::XmlParse(value)
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(value: quick_xml::events::attributes::AttrError) -> Self {
        Error::XmlAttribute(value.to_string())
    }
}
