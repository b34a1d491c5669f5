//! Locale identifiers as used by filters and text containers.

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use unic_langid::LanguageIdentifier;

use crate::error::Error;

/// A normalized locale tag.
///
/// Tags that parse as BCP-47 language identifiers are stored in canonical
/// form (`en_us` and `EN-US` both become `en-US`). Anything else is kept
/// lower-cased with `_` replaced by `-`, so private tags still compare
/// consistently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct LocaleId(String);

impl LocaleId {
    pub fn new(tag: &str) -> Self {
        let trimmed = tag.trim();
        match trimmed.parse::<LanguageIdentifier>() {
            Ok(langid) => LocaleId(langid.to_string()),
            Err(_) => LocaleId(trimmed.replace('_', "-").to_ascii_lowercase()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The primary language subtag, lower-cased.
    pub fn language(&self) -> String {
        self.0
            .split('-')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for LocaleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LocaleId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(Error::MissingLocale("requested"));
        }
        Ok(LocaleId::new(s))
    }
}

impl From<&str> for LocaleId {
    fn from(value: &str) -> Self {
        LocaleId::new(value)
    }
}

impl From<String> for LocaleId {
    fn from(value: String) -> Self {
        LocaleId::new(&value)
    }
}

impl From<LocaleId> for String {
    fn from(value: LocaleId) -> Self {
        value.0
    }
}
