//! Inline codes: markup that travels inside translatable text.

use std::collections::BTreeMap;

use serde::Serialize;

/// Id of a code whose id could not be determined.
pub const CODE_ID_UNSET: i32 = -1;

/// Role of a code within its fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TagType {
    Opening,
    Closing,
    Placeholder,
}

/// One inline code.
///
/// `data` is what editing tools show and may be shortened or unescaped;
/// `outer_data` is the literal original markup and is what gets written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Code {
    pub id: i32,
    pub tag_type: TagType,
    /// Logical kind used to pair openings with closings (`hi`, `Xpt`, an element name).
    pub code_type: String,
    pub data: String,
    pub outer_data: String,
    pub display_text: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Set when no partner exists in the fragment.
    pub isolated: bool,
}

impl Code {
    pub fn new(tag_type: TagType, code_type: impl Into<String>, data: impl Into<String>) -> Self {
        Code {
            id: CODE_ID_UNSET,
            tag_type,
            code_type: code_type.into(),
            data: data.into(),
            outer_data: String::new(),
            display_text: None,
            annotations: BTreeMap::new(),
            isolated: false,
        }
    }

    pub fn with_id(mut self, id: i32) -> Self {
        self.id = id;
        self
    }

    pub fn with_outer_data(mut self, outer_data: impl Into<String>) -> Self {
        self.outer_data = outer_data.into();
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn has_id(&self) -> bool {
        self.id != CODE_ID_UNSET
    }

    /// Markup to emit on output: the outer data when captured, else the data.
    pub fn output(&self) -> &str {
        if self.outer_data.is_empty() {
            &self.data
        } else {
            &self.outer_data
        }
    }
}

/// Derives a code id from the two id-bearing attributes of a tag.
///
/// The first non-empty attribute wins. Integers are used as-is; anything
/// else is hashed with [`string_hash`]. Returns [`CODE_ID_UNSET`] when both
/// are missing. The hash is stable across runs but not injective.
pub fn generate_code_id(primary: Option<&str>, secondary: Option<&str>) -> i32 {
    for candidate in [primary, secondary].into_iter().flatten() {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            continue;
        }
        return match candidate.parse::<i32>() {
            Ok(id) => id,
            Err(_) => match string_hash(candidate) {
                // keep the sentinel free
                CODE_ID_UNSET => i32::MIN,
                hash => hash,
            },
        };
    }
    CODE_ID_UNSET
}

/// 31-multiplier hash over UTF-16 code units with wrapping arithmetic.
pub fn string_hash(value: &str) -> i32 {
    value
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}
