//! Coded text: plain characters interleaved with inline codes.
//!
//! A [`TextFragment`] stores its content as a single string in which every
//! code is represented by two private-use characters: a marker telling the
//! role of the code and an index into the fragment's code list. Plain-text
//! length and code positions stay independently addressable, which is what
//! character-range annotations rely on.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::code::{CODE_ID_UNSET, Code, TagType};

/// Marker of an opening code with a partner in the same fragment.
pub const MARKER_OPENING: char = '\u{E101}';
/// Marker of a closing code with a partner in the same fragment.
pub const MARKER_CLOSING: char = '\u{E102}';
/// Marker of a placeholder, or of an opening/closing code without partner.
pub const MARKER_ISOLATED: char = '\u{E103}';

const INDEX_BASE: u32 = 0xE110;

pub fn is_marker(c: char) -> bool {
    matches!(c, MARKER_OPENING | MARKER_CLOSING | MARKER_ISOLATED)
}

/// Index character stored after a marker.
pub fn index_to_char(index: usize) -> char {
    char::from_u32(INDEX_BASE + index as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
}

/// Code index encoded by the character following a marker.
pub fn char_to_index(c: char) -> usize {
    (c as u32).saturating_sub(INDEX_BASE) as usize
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TextFragment {
    coded_text: String,
    codes: Vec<Code>,
    #[serde(skip)]
    last_code_id: i32,
    /// Verbatim source markup of this content, dropped on first mutation.
    #[serde(skip)]
    original: Option<String>,
}

impl PartialEq for TextFragment {
    fn eq(&self, other: &Self) -> bool {
        self.coded_text == other.coded_text && self.codes == other.codes
    }
}

impl Eq for TextFragment {}

impl TextFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        let mut fragment = Self::new();
        fragment.append_text(text);
        fragment
    }

    pub fn append_text(&mut self, text: &str) {
        self.original = None;
        self.coded_text.push_str(text);
    }

    /// Appends a code and returns its index in [`codes`](Self::codes).
    ///
    /// Opening codes and placeholders without an id get the next free id.
    /// Closing codes keep [`CODE_ID_UNSET`] so that
    /// [`balance_markers`](Self::balance_markers) can adopt the id of their
    /// opening partner.
    pub fn append_code(&mut self, mut code: Code) -> usize {
        self.original = None;
        if code.id == CODE_ID_UNSET && code.tag_type != TagType::Closing {
            self.last_code_id += 1;
            code.id = self.last_code_id;
        } else if code.id > self.last_code_id {
            self.last_code_id = code.id;
        }
        let marker = match code.tag_type {
            TagType::Opening => MARKER_OPENING,
            TagType::Closing => MARKER_CLOSING,
            TagType::Placeholder => MARKER_ISOLATED,
        };
        code.isolated = code.tag_type == TagType::Placeholder;
        let index = self.codes.len();
        self.coded_text.push(marker);
        self.coded_text.push(index_to_char(index));
        self.codes.push(code);
        index
    }

    /// Convenience for [`append_code`](Self::append_code).
    pub fn append(
        &mut self,
        tag_type: TagType,
        code_type: &str,
        data: &str,
        id: i32,
    ) -> usize {
        self.append_code(Code::new(tag_type, code_type, data).with_id(id))
    }

    /// Appends another fragment, re-indexing its codes.
    pub fn append_fragment(&mut self, other: &TextFragment) {
        self.original = None;
        let offset = self.codes.len();
        let mut chars = other.coded_text.chars();
        while let Some(c) = chars.next() {
            self.coded_text.push(c);
            if is_marker(c) {
                if let Some(index) = chars.next() {
                    self.coded_text
                        .push(index_to_char(char_to_index(index) + offset));
                }
            }
        }
        for code in &other.codes {
            if code.id > self.last_code_id {
                self.last_code_id = code.id;
            }
            self.codes.push(code.clone());
        }
    }

    pub fn coded_text(&self) -> &str {
        &self.coded_text
    }

    pub fn codes(&self) -> &[Code] {
        &self.codes
    }

    pub fn codes_mut(&mut self) -> &mut [Code] {
        self.original = None;
        &mut self.codes
    }

    pub fn code(&self, index: usize) -> Option<&Code> {
        self.codes.get(index)
    }

    pub fn has_code(&self) -> bool {
        !self.codes.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.coded_text.is_empty()
    }

    /// True when there is at least one non-whitespace plain character.
    pub fn has_text(&self) -> bool {
        self.pieces()
            .any(|piece| matches!(piece, Piece::Text(t) if !t.trim().is_empty()))
    }

    /// Plain text with all codes removed.
    pub fn text(&self) -> String {
        self.pieces()
            .filter_map(|piece| match piece {
                Piece::Text(t) => Some(t),
                Piece::Code { .. } => None,
            })
            .collect()
    }

    /// Number of plain characters.
    pub fn text_len(&self) -> usize {
        self.text().chars().count()
    }

    pub fn clear(&mut self) {
        self.original = None;
        self.coded_text.clear();
        self.codes.clear();
        self.last_code_id = 0;
    }

    /// Walks the coded text as plain runs and codes.
    pub fn pieces(&self) -> impl Iterator<Item = Piece<'_>> {
        Pieces {
            fragment: self,
            rest: &self.coded_text,
        }
    }

    /// Position of every code as `(coded character offset, code index)`.
    pub fn code_positions(&self) -> Vec<(usize, usize)> {
        let mut positions = Vec::new();
        let mut chars = self.coded_text.chars().enumerate();
        while let Some((offset, c)) = chars.next() {
            if is_marker(c) {
                if let Some((_, index)) = chars.next() {
                    positions.push((offset, char_to_index(index)));
                }
            }
        }
        positions
    }

    /// Maps a character offset in the plain text to one in the coded text.
    ///
    /// Codes sitting right before the addressed character are skipped, so
    /// the result always points at a plain character or the end.
    pub fn plain_to_coded_offset(&self, plain: usize) -> usize {
        let mut seen_plain = 0;
        let mut coded = 0;
        let mut chars = self.coded_text.chars();
        while let Some(c) = chars.next() {
            if is_marker(c) {
                chars.next();
                coded += 2;
                continue;
            }
            if seen_plain == plain {
                return coded;
            }
            seen_plain += 1;
            coded += 1;
        }
        coded
    }

    /// Maps a character offset in the coded text to one in the plain text.
    pub fn coded_to_plain_offset(&self, coded: usize) -> usize {
        let mut plain = 0;
        let mut chars = self.coded_text.chars().enumerate();
        while let Some((offset, c)) = chars.next() {
            if offset >= coded {
                break;
            }
            if is_marker(c) {
                chars.next();
            } else {
                plain += 1;
            }
        }
        plain
    }

    /// Re-marks codes so that every opening code with a later closing
    /// partner of the same id uses the paired markers, and every other
    /// opening or closing code is isolated.
    ///
    /// Closing codes without an id adopt the id of the opening code they
    /// pair with by type and nesting. Unmatched closing codes without an id
    /// get a fresh id.
    pub fn balance_markers(&mut self) {
        if self.codes.is_empty() {
            return;
        }
        self.last_code_id = self.codes.iter().map(|c| c.id).max().unwrap_or(0).max(0);
        let mut pairing: Vec<Pairing> = self.codes.iter().map(|c| Pairing::Free(c.id)).collect();

        let markers: Vec<(usize, usize)> = self.code_positions();
        let mut new_markers: Vec<(usize, char)> = Vec::with_capacity(markers.len());

        for (offset, index) in markers {
            let Some(code) = self.codes.get(index) else {
                continue;
            };
            let marker = match code.tag_type {
                TagType::Placeholder => MARKER_ISOLATED,
                TagType::Opening => {
                    let (id, code_type) = (code.id, code.code_type.clone());
                    if self.pair_by_id(index, id, &code_type, &mut pairing) {
                        MARKER_OPENING
                    } else {
                        match self.pair_by_nesting(index, &code_type, &pairing) {
                            NestingMatch::Found(j) => {
                                self.codes[j].id = id;
                                pairing[j] = Pairing::Matched;
                                MARKER_OPENING
                            }
                            NestingMatch::Candidate(j) => {
                                self.codes[j].id = id;
                                pairing[j] = Pairing::Adopted;
                                MARKER_ISOLATED
                            }
                            NestingMatch::None => MARKER_ISOLATED,
                        }
                    }
                }
                TagType::Closing => match pairing[index] {
                    Pairing::Matched => MARKER_CLOSING,
                    Pairing::Free(CODE_ID_UNSET) => {
                        self.last_code_id += 1;
                        self.codes[index].id = self.last_code_id;
                        MARKER_ISOLATED
                    }
                    _ => MARKER_ISOLATED,
                },
            };
            new_markers.push((offset, marker));
        }

        let mut chars: Vec<char> = self.coded_text.chars().collect();
        for (offset, marker) in new_markers {
            chars[offset] = marker;
        }
        for (offset, index) in self.code_positions() {
            if let Some(code) = self.codes.get_mut(index) {
                code.isolated = chars[offset] == MARKER_ISOLATED;
            }
        }
        let original = self.original.take();
        self.coded_text = chars.into_iter().collect();
        self.original = original;
    }

    fn pair_by_id(
        &self,
        index: usize,
        id: i32,
        code_type: &str,
        pairing: &mut [Pairing],
    ) -> bool {
        for j in index + 1..self.codes.len() {
            let other = &self.codes[j];
            if other.tag_type == TagType::Closing
                && other.code_type == code_type
                && other.id == id
                && pairing[j] != Pairing::Matched
            {
                pairing[j] = Pairing::Matched;
                return true;
            }
        }
        false
    }

    fn pair_by_nesting(&self, index: usize, code_type: &str, pairing: &[Pairing]) -> NestingMatch {
        let mut fixup = false;
        let mut candidate = None;
        let mut depth_all: i32 = 1;
        let mut depth_same: i32 = 1;
        let usable = |j: usize| pairing[j] != Pairing::Matched;

        for j in index + 1..self.codes.len() {
            let other = &self.codes[j];
            if other.code_type == code_type {
                match other.tag_type {
                    TagType::Opening => {
                        depth_all += 1;
                        depth_same += 1;
                    }
                    TagType::Closing => {
                        depth_all -= 1;
                        depth_same -= 1;
                        if fixup {
                            if depth_same == 0 && usable(j) {
                                candidate = Some(j);
                                break;
                            }
                            continue;
                        }
                        if depth_all == 0 {
                            if depth_same == 0 && usable(j) {
                                return NestingMatch::Found(j);
                            }
                            fixup = true;
                        } else if depth_all > 0 {
                            if depth_same == 0 && usable(j) {
                                candidate = Some(j);
                            }
                        } else {
                            if candidate.is_some() {
                                break;
                            }
                            if depth_same == 0 && usable(j) {
                                candidate = Some(j);
                                break;
                            }
                            fixup = true;
                        }
                    }
                    TagType::Placeholder => {}
                }
            } else {
                match other.tag_type {
                    TagType::Opening => depth_all += 1,
                    TagType::Closing => depth_all -= 1,
                    TagType::Placeholder => {}
                }
                if depth_all == 0 {
                    fixup = true;
                }
            }
        }
        match candidate {
            Some(j) => NestingMatch::Candidate(j),
            None => NestingMatch::None,
        }
    }

    /// Renders the content with generic inline tags: `<1>`/`</1>` for
    /// paired codes, `<2/>` for placeholders, `<b3/>`/`<e3/>` for isolated
    /// openings and closings.
    pub fn to_generic(&self) -> String {
        let mut out = String::new();
        let mut chars = self.coded_text.chars();
        while let Some(c) = chars.next() {
            if !is_marker(c) {
                out.push(c);
                continue;
            }
            let Some(code) = chars.next().and_then(|i| self.codes.get(char_to_index(i))) else {
                continue;
            };
            match (c, code.tag_type) {
                (MARKER_OPENING, _) => out.push_str(&format!("<{}>", code.id)),
                (MARKER_CLOSING, _) => out.push_str(&format!("</{}>", code.id)),
                (_, TagType::Opening) => out.push_str(&format!("<b{}/>", code.id)),
                (_, TagType::Closing) => out.push_str(&format!("<e{}/>", code.id)),
                (_, TagType::Placeholder) => out.push_str(&format!("<{}/>", code.id)),
            }
        }
        out
    }

    /// Records the verbatim markup this fragment was parsed from.
    pub fn set_original_markup(&mut self, markup: impl Into<String>) {
        self.original = Some(markup.into());
    }

    /// Verbatim source markup, if the fragment is unchanged since parsing.
    pub fn original_markup(&self) -> Option<&str> {
        self.original.as_deref()
    }
}

impl Display for TextFragment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_generic())
    }
}

impl From<&str> for TextFragment {
    fn from(value: &str) -> Self {
        TextFragment::from_text(value)
    }
}

/// One step of a walk over coded text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Piece<'a> {
    Text(&'a str),
    Code { marker: char, code: &'a Code },
}

struct Pieces<'a> {
    fragment: &'a TextFragment,
    rest: &'a str,
}

impl<'a> Iterator for Pieces<'a> {
    type Item = Piece<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut chars = self.rest.chars();
            let first = chars.next()?;
            if is_marker(first) {
                let index = chars.next().map(char_to_index);
                self.rest = chars.as_str();
                match index.and_then(|i| self.fragment.codes.get(i)) {
                    Some(code) => {
                        return Some(Piece::Code {
                            marker: first,
                            code,
                        });
                    }
                    None => continue,
                }
            }
            let end = self.rest.find(is_marker).unwrap_or(self.rest.len());
            let (text, rest) = self.rest.split_at(end);
            self.rest = rest;
            return Some(Piece::Text(text));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pairing {
    Free(i32),
    Matched,
    Adopted,
}

enum NestingMatch {
    Found(usize),
    Candidate(usize),
    None,
}
