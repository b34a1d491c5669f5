//! Support for TMX (Translation Memory eXchange) documents.
//!
//! Every `<tu>` becomes one primary text unit holding the source variant
//! and the first variant of each other locale, plus one secondary unit per
//! duplicate variant. Everything outside `<seg>` content is kept verbatim
//! in skeletons, so an unmodified document is written back byte for byte.

use std::collections::VecDeque;

use log::{error, warn};
use serde::{Deserialize, Serialize};

use crate::{
    code::{Code, TagType, generate_code_id},
    detector::LineBreak,
    error::Error,
    formats::{
        ENDING_ID, EventStream, IdGenerator, normalize_line_breaks, start_document,
        tmx_unit::{TuRecord, UnitContext, VariantRole},
        tokens::{Element, Token, Tokenizer},
    },
    fragment::TextFragment,
    locale::LocaleId,
    raw_document::RawDocument,
    resource::{DocumentPart, Ending, Event, Properties, join_property},
    skeleton::Skeleton,
    traits::{CancelHandle, Filter, FilterState},
};

pub const MIME_TYPE: &str = "application/x-tmx+xml";

const SEG_CHILDREN: &[&str] = &["bpt", "ept", "it", "ph", "hi", "ut"];
const CODE_CHILDREN: &[&str] = &["sub"];
const TU_CHILDREN: &[&str] = &["note", "prop", "tuv"];
const TUV_CHILDREN: &[&str] = &["note", "prop", "seg"];

/// Segmentation policy for extracted content.
///
/// `Sentence` and `Paragraph` are applied unconditionally. The `Or*`
/// variants use the unit's `segtype`, then the header's, and fall back to
/// the named level when neither is present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegType {
    Sentence,
    Paragraph,
    OrSentence,
    #[default]
    OrParagraph,
}

/// Options for [`TmxFilter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TmxParameters {
    /// Escape `>` as `&gt;` in written content.
    pub escape_gt: bool,
    /// Extract variants in locales other than source and target too.
    pub process_all_targets: bool,
    /// Abort on a unit with invalid content instead of skipping it.
    pub exit_on_invalid: bool,
    pub seg_type: SegType,
    /// Joins values of repeated properties.
    pub prop_value_sep: String,
    /// Batch structural markup into one document part per gap between
    /// units, rather than one part per element.
    pub consolidate_skeleton: bool,
}

impl Default for TmxParameters {
    fn default() -> Self {
        TmxParameters {
            escape_gt: false,
            process_all_targets: true,
            exit_on_invalid: false,
            seg_type: SegType::OrParagraph,
            prop_value_sep: ", ".to_string(),
            consolidate_skeleton: true,
        }
    }
}

impl TmxParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_escape_gt(mut self, escape_gt: bool) -> Self {
        self.escape_gt = escape_gt;
        self
    }

    pub fn with_process_all_targets(mut self, process_all_targets: bool) -> Self {
        self.process_all_targets = process_all_targets;
        self
    }

    pub fn with_exit_on_invalid(mut self, exit_on_invalid: bool) -> Self {
        self.exit_on_invalid = exit_on_invalid;
        self
    }

    pub fn with_seg_type(mut self, seg_type: SegType) -> Self {
        self.seg_type = seg_type;
        self
    }

    pub fn with_prop_value_sep(mut self, separator: impl Into<String>) -> Self {
        self.prop_value_sep = separator.into();
        self
    }

    pub fn with_consolidate_skeleton(mut self, consolidate: bool) -> Self {
        self.consolidate_skeleton = consolidate;
        self
    }
}

/// Pull filter for TMX documents.
#[derive(Default)]
pub struct TmxFilter {
    params: TmxParameters,
    stream: EventStream,
    parser: Option<TmxParser>,
}

impl TmxFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameters(params: TmxParameters) -> Self {
        TmxFilter {
            params,
            ..Default::default()
        }
    }

    pub fn parameters(&self) -> &TmxParameters {
        &self.params
    }

    /// Changes take effect on the next [`open`](Filter::open).
    pub fn parameters_mut(&mut self) -> &mut TmxParameters {
        &mut self.params
    }
}

impl Filter for TmxFilter {
    fn name(&self) -> &'static str {
        "tmx"
    }

    fn mime_type(&self) -> &'static str {
        MIME_TYPE
    }

    fn open(&mut self, document: RawDocument) -> Result<(), Error> {
        self.close();
        let source_locale = document
            .source_locale
            .clone()
            .ok_or(Error::MissingLocale("source"))?;
        let target_locale = document
            .target_locale
            .clone()
            .ok_or(Error::MissingLocale("target"))?;

        let (decoded, reader) = document.decode()?;
        let mut tokenizer = Tokenizer::new(reader);
        let start = start_document(
            &mut tokenizer,
            &decoded,
            MIME_TYPE,
            true,
            self.params.escape_gt,
        )?;

        self.parser = Some(TmxParser {
            tokenizer,
            params: self.params.clone(),
            source_locale,
            target_locale,
            line_break: decoded.line_break,
            ids: IdGenerator::default(),
            pending: String::new(),
            consumed: String::new(),
            header_seg_type: None,
            ut_warned: false,
            sub_warned: false,
        });
        self.stream.start(start);
        Ok(())
    }

    fn has_next(&self) -> bool {
        self.stream.has_next()
    }

    fn next(&mut self) -> Result<Event, Error> {
        let parser = &mut self.parser;
        self.stream.next_with(|queue| match parser.as_mut() {
            Some(parser) => parser.pump(queue),
            None => Err(Error::invalid_state("filter is not open")),
        })
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.stream.cancel.clone()
    }

    fn close(&mut self) {
        self.parser = None;
        self.stream.finish();
    }

    fn state(&self) -> FilterState {
        self.stream.state
    }
}

/// Parse state for one open document.
struct TmxParser {
    tokenizer: Tokenizer,
    params: TmxParameters,
    source_locale: LocaleId,
    target_locale: LocaleId,
    line_break: LineBreak,
    ids: IdGenerator,
    /// Structural markup not yet handed out in a resource.
    pending: String,
    /// Verbatim markup of the unit being read.
    consumed: String,
    header_seg_type: Option<String>,
    ut_warned: bool,
    sub_warned: bool,
}

impl TmxParser {
    /// Reads until at least one event is queued.
    fn pump(&mut self, queue: &mut VecDeque<Event>) -> Result<(), Error> {
        loop {
            let token = self.tokenizer.next_token()?;
            match token {
                Token::Start(e) if e.local_name() == "tu" => {
                    self.flush_part(queue);
                    return self.read_unit(e, queue);
                }
                Token::Empty(e) if e.local_name() == "tu" => {
                    self.flush_part(queue);
                    return self.emit_units(TuRecord::new(&e.raw), queue);
                }
                Token::Start(e) if e.local_name() == "header" => {
                    return self.read_header(e, false, queue);
                }
                Token::Empty(e) if e.local_name() == "header" => {
                    return self.read_header(e, true, queue);
                }
                Token::Eof => {
                    let skeleton = Skeleton::from_literal(std::mem::take(&mut self.pending));
                    queue.push_back(Event::Ending(Ending {
                        id: ENDING_ID.to_string(),
                        skeleton,
                    }));
                    return Ok(());
                }
                other => {
                    self.pending.push_str(other.raw());
                    if !self.params.consolidate_skeleton && !matches!(other, Token::Text { .. }) {
                        self.flush_part(queue);
                        return Ok(());
                    }
                }
            }
        }
    }

    fn flush_part(&mut self, queue: &mut VecDeque<Event>) {
        if self.pending.is_empty() {
            return;
        }
        let skeleton = Skeleton::from_literal(std::mem::take(&mut self.pending));
        queue.push_back(Event::DocumentPart(DocumentPart::new(
            self.ids.next_part(),
            skeleton,
        )));
    }

    /// Next token inside an element; running out of input is fatal.
    fn take(&mut self, inside: &str) -> Result<Token, Error> {
        let token = self.tokenizer.next_token()?;
        if token == Token::Eof {
            return Err(Error::UnexpectedEof(inside.to_string()));
        }
        self.consumed.push_str(token.raw());
        Ok(token)
    }

    fn read_header(
        &mut self,
        start: Element,
        empty: bool,
        queue: &mut VecDeque<Event>,
    ) -> Result<(), Error> {
        let separator = self.params.prop_value_sep.clone();
        let mut properties = Properties::new();
        for (name, value) in &start.attributes {
            join_property(&mut properties, name, value, &separator);
        }
        if let Some(seg_type) = start.attribute("segtype") {
            self.header_seg_type = Some(seg_type.trim().to_ascii_lowercase());
        }
        if let Some(srclang) = start.attribute("srclang") {
            if srclang != "*all*" && LocaleId::new(srclang) != self.source_locale {
                warn!(
                    "Header source language `{}` differs from the requested source locale `{}`",
                    srclang, self.source_locale
                );
            }
        }

        self.pending.push_str(&start.raw);
        if !empty {
            loop {
                let token = self.take("header")?;
                match token {
                    Token::Start(e) if matches!(e.local_name().as_str(), "prop" | "note") => {
                        let (inner, text) = self.read_simple(&e.local_name())?;
                        self.pending.push_str(&e.raw);
                        self.pending.push_str(&inner);
                        join_property(&mut properties, &property_key(&e), &text, &separator);
                    }
                    Token::End(e) if e.local_name() == "header" => {
                        self.pending.push_str(&e.raw);
                        break;
                    }
                    other => self.pending.push_str(other.raw()),
                }
            }
        }

        let skeleton = Skeleton::from_literal(std::mem::take(&mut self.pending));
        let mut part = DocumentPart::new(self.ids.next_part(), skeleton);
        part.properties = properties;
        queue.push_back(Event::DocumentPart(part));
        Ok(())
    }

    /// Reads an element with simple content up to its end tag. Returns the
    /// markup read and the unescaped text.
    fn read_simple(&mut self, name: &str) -> Result<(String, String), Error> {
        let mut raw = String::new();
        let mut text = String::new();
        let mut depth = 0usize;
        loop {
            let token = self.take(name)?;
            raw.push_str(token.raw());
            match token {
                Token::Start(_) => depth += 1,
                Token::End(_) if depth == 0 => return Ok((raw, text)),
                Token::End(_) => depth -= 1,
                Token::Text { text: t, .. } | Token::CData { text: t, .. } => text.push_str(&t),
                _ => {}
            }
        }
    }

    fn read_unit(&mut self, start: Element, queue: &mut VecDeque<Event>) -> Result<(), Error> {
        self.consumed = start.raw.clone();
        match self.parse_unit(&start) {
            Ok(record) => self.emit_units(record, queue),
            Err(err @ Error::InvalidUnit(_)) if !self.params.exit_on_invalid => {
                warn!("Skipping unit: {}", err);
                self.skip_to_unit_end()?;
                let skeleton = Skeleton::from_literal(std::mem::take(&mut self.consumed));
                queue.push_back(Event::DocumentPart(DocumentPart::new(
                    self.ids.next_part(),
                    skeleton,
                )));
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn skip_to_unit_end(&mut self) -> Result<(), Error> {
        loop {
            if let Token::End(e) = self.take("tu")? {
                if e.local_name() == "tu" {
                    return Ok(());
                }
            }
        }
    }

    fn emit_units(&mut self, record: TuRecord, queue: &mut VecDeque<Event>) -> Result<(), Error> {
        let sentence = self.is_sentence(&record.properties);
        let ctx = UnitContext {
            source_locale: &self.source_locale,
            target_locale: &self.target_locale,
            process_all_targets: self.params.process_all_targets,
            sentence,
            line_break: self.line_break.as_str(),
        };
        for unit in record.into_units(&ctx, &mut self.ids)? {
            queue.push_back(Event::TextUnit(unit));
        }
        Ok(())
    }

    fn is_sentence(&self, properties: &Properties) -> bool {
        match self.params.seg_type {
            SegType::Sentence => true,
            SegType::Paragraph => false,
            fallback => {
                let declared = properties
                    .get("segtype")
                    .map(|value| value.trim().to_ascii_lowercase())
                    .or_else(|| self.header_seg_type.clone());
                match declared {
                    Some(value) => value == "sentence",
                    None => fallback == SegType::OrSentence,
                }
            }
        }
    }

    fn parse_unit(&mut self, start: &Element) -> Result<TuRecord, Error> {
        let separator = self.params.prop_value_sep.clone();
        let mut record = TuRecord::new(&start.raw);
        for (name, value) in &start.attributes {
            record.add_property(name, value, &separator);
        }
        record.name = start.attribute("tuid").map(str::to_string);

        loop {
            match self.take("tu")? {
                Token::Start(e) => {
                    let local = e.local_name();
                    check_child("tu", &local)?;
                    if local == "tuv" {
                        self.parse_variant(&e, &mut record)?;
                    } else {
                        let (inner, text) = self.read_simple(&local)?;
                        record.append_skeleton(&e.raw);
                        record.append_skeleton(&inner);
                        record.add_property(&property_key(&e), &text, &separator);
                    }
                }
                Token::Empty(e) => {
                    let local = e.local_name();
                    check_child("tu", &local)?;
                    if local == "tuv" {
                        return Err(Error::invalid_unit("<tuv/> has no <seg>"));
                    }
                    record.append_skeleton(&e.raw);
                    record.add_property(&property_key(&e), "", &separator);
                }
                Token::End(e) => {
                    record.skel_after.push_str(&e.raw);
                    return Ok(record);
                }
                other => record.append_skeleton(other.raw()),
            }
        }
    }

    fn parse_variant(&mut self, start: &Element, record: &mut TuRecord) -> Result<(), Error> {
        let Some(lang) = start
            .attribute("xml:lang")
            .or_else(|| start.attribute("lang"))
        else {
            let label = record.name.clone().unwrap_or_else(|| "(unnamed)".to_string());
            return Err(Error::MissingVariantLocale(label));
        };
        let locale = LocaleId::new(lang);
        let role = if locale == self.source_locale {
            VariantRole::Source
        } else if locale == self.target_locale {
            VariantRole::Target
        } else {
            VariantRole::Other
        };
        let extract = role != VariantRole::Other || self.params.process_all_targets;
        let separator = self.params.prop_value_sep.clone();

        let variant = record.add_variant(locale, role);
        variant.skel_before.push_str(&start.raw);
        for (name, value) in &start.attributes {
            join_property(&mut variant.properties, name, value, &separator);
        }

        let mut seen_seg = false;
        loop {
            match self.take("tuv")? {
                Token::Start(e) => {
                    let local = e.local_name();
                    check_child("tuv", &local)?;
                    if local == "seg" {
                        variant.skel_before.push_str(&e.raw);
                        let (content, literal, closing) = self.parse_segment(extract)?;
                        variant.content = content;
                        variant.literal = literal;
                        variant.skel_after.push_str(&closing);
                        seen_seg = true;
                    } else {
                        let (inner, text) = self.read_simple(&local)?;
                        let skeleton = if seen_seg {
                            &mut variant.skel_after
                        } else {
                            &mut variant.skel_before
                        };
                        skeleton.push_str(&e.raw);
                        skeleton.push_str(&inner);
                        join_property(&mut variant.properties, &property_key(&e), &text, &separator);
                    }
                }
                Token::Empty(e) => {
                    let local = e.local_name();
                    check_child("tuv", &local)?;
                    if local == "seg" {
                        variant.empty_seg = Some(e);
                        seen_seg = true;
                    } else {
                        if seen_seg {
                            variant.skel_after.push_str(&e.raw);
                        } else {
                            variant.skel_before.push_str(&e.raw);
                        }
                        join_property(&mut variant.properties, &property_key(&e), "", &separator);
                    }
                }
                Token::End(e) => {
                    variant.skel_after.push_str(&e.raw);
                    break;
                }
                other => {
                    if seen_seg {
                        variant.skel_after.push_str(other.raw());
                    } else {
                        variant.skel_before.push_str(other.raw());
                    }
                }
            }
        }
        if !seen_seg {
            return Err(Error::invalid_unit("<tuv> without <seg>"));
        }
        Ok(())
    }

    /// Reads `<seg>` content up to and including `</seg>`. Returns the
    /// content, the verbatim inner markup and the closing tag.
    fn parse_segment(&mut self, extract: bool) -> Result<(TextFragment, String, String), Error> {
        let mut fragment = TextFragment::new();
        let mut literal = String::new();
        let mut stack: Vec<String> = vec!["seg".to_string()];
        let mut missing_ids = false;

        loop {
            match self.take("seg")? {
                Token::End(e) if stack.len() == 1 => {
                    if extract {
                        fragment.balance_markers();
                        if missing_ids && fragment.codes().len() > 1 {
                            warn!(
                                "The id attributes x and i are missing for some inline codes in `{}`. \
                                 Code alignment between source and target may be off.",
                                fragment.to_generic()
                            );
                        }
                        fragment.set_original_markup(literal.clone());
                    }
                    return Ok((fragment, literal, e.raw));
                }
                Token::End(e) => {
                    literal.push_str(&e.raw);
                    stack.pop();
                    if extract {
                        fragment.append_code(
                            Code::new(TagType::Closing, "hi", e.raw.as_str()).with_outer_data(e.raw),
                        );
                    }
                }
                Token::Start(e) => {
                    let local = e.local_name();
                    check_child(top(&stack), &local)?;
                    self.note_deprecated(&local);
                    literal.push_str(&e.raw);
                    if local == "hi" {
                        if extract {
                            missing_ids |= lacks_ids(&e);
                            let id = generate_code_id(e.attribute("x"), e.attribute("i"));
                            fragment.append_code(
                                Code::new(TagType::Opening, "hi", e.raw.as_str())
                                    .with_id(id)
                                    .with_outer_data(e.raw.as_str()),
                            );
                        }
                        stack.push(local);
                    } else {
                        let (inner, data) = self.read_code_body(&local)?;
                        literal.push_str(&inner);
                        if extract {
                            let outer = format!("{}{}", e.raw, inner);
                            let (code, missing) = self.inline_code(&e, &local, data, outer);
                            missing_ids |= missing;
                            fragment.append_code(code);
                        }
                    }
                }
                Token::Empty(e) => {
                    let local = e.local_name();
                    check_child(top(&stack), &local)?;
                    self.note_deprecated(&local);
                    literal.push_str(&e.raw);
                    if extract {
                        let (code, missing) = self.inline_code(&e, &local, String::new(), e.raw.clone());
                        missing_ids |= missing;
                        fragment.append_code(code);
                    }
                }
                Token::Text { raw, text } | Token::CData { raw, text } => {
                    literal.push_str(&raw);
                    if extract {
                        fragment.append_text(&normalize_line_breaks(&text));
                    }
                }
                other => {
                    literal.push_str(other.raw());
                    if extract {
                        let raw = other.raw().to_string();
                        fragment.append_code(
                            Code::new(TagType::Placeholder, "x-markup", raw.as_str()).with_outer_data(raw),
                        );
                    }
                }
            }
        }
    }

    /// Reads the body of `<bpt>`, `<ept>`, `<it>`, `<ph>` or `<ut>` up to
    /// and including its end tag. Returns that markup and the native code
    /// it carries.
    fn read_code_body(&mut self, name: &str) -> Result<(String, String), Error> {
        let mut raw = String::new();
        let mut data = String::new();
        let mut stack: Vec<String> = vec![name.to_string()];
        loop {
            let token = self.take(name)?;
            raw.push_str(token.raw());
            match token {
                Token::Start(e) => {
                    let local = e.local_name();
                    check_child(top(&stack), &local)?;
                    if local == "sub" && !self.sub_warned {
                        warn!("<sub> content is kept inside its parent inline code and is not extracted");
                        self.sub_warned = true;
                    }
                    self.note_deprecated(&local);
                    data.push_str(&e.raw);
                    stack.push(local);
                }
                Token::Empty(e) => {
                    check_child(top(&stack), &e.local_name())?;
                    data.push_str(&e.raw);
                }
                Token::End(e) => {
                    stack.pop();
                    if stack.is_empty() {
                        return Ok((raw, data));
                    }
                    data.push_str(&e.raw);
                }
                Token::Text { text, .. } | Token::CData { text, .. } => data.push_str(&text),
                other => data.push_str(other.raw()),
            }
        }
    }

    /// Builds the code for an inline element. The flag tells whether the
    /// element had neither `x` nor `i`.
    fn inline_code(&mut self, element: &Element, local: &str, data: String, outer: String) -> (Code, bool) {
        let missing = lacks_ids(element);
        let id = generate_code_id(element.attribute("x"), element.attribute("i"));

        let (tag_type, code_type) = match local {
            "bpt" => (TagType::Opening, "Xpt"),
            "ept" => (TagType::Closing, "Xpt"),
            "it" => match element.attribute("pos") {
                Some("begin") => (TagType::Opening, "it"),
                Some("end") => (TagType::Closing, "it"),
                Some(other) => {
                    error!("Invalid 'pos' value ('{}'). Will map the <it> code to <ph>.", other);
                    (TagType::Placeholder, "it")
                }
                None => {
                    error!("Attribute 'pos' is missing. Will map the <it> code to <ph>.");
                    (TagType::Placeholder, "it")
                }
            },
            "ut" => (TagType::Placeholder, "ut"),
            "hi" => (TagType::Placeholder, "hi"),
            _ => (TagType::Placeholder, "ph"),
        };
        let code = Code::new(tag_type, code_type, data)
            .with_id(id)
            .with_outer_data(outer);
        (code, missing)
    }

    fn note_deprecated(&mut self, local: &str) {
        if local == "ut" && !self.ut_warned {
            warn!("<ut> is deprecated in TMX 1.4.");
            self.ut_warned = true;
        }
    }
}

/// True when an inline element carries neither `x` nor `i`.
fn lacks_ids(element: &Element) -> bool {
    let blank = |name: &str| element.attribute(name).map_or(true, |v| v.trim().is_empty());
    blank("x") && blank("i")
}

fn top(stack: &[String]) -> &str {
    stack.last().map(String::as_str).unwrap_or("seg")
}

fn allowed_children(parent: &str) -> Option<&'static [&'static str]> {
    match parent {
        "seg" | "sub" | "hi" => Some(SEG_CHILDREN),
        "bpt" | "ept" | "it" | "ph" | "ut" => Some(CODE_CHILDREN),
        "tu" => Some(TU_CHILDREN),
        "tuv" => Some(TUV_CHILDREN),
        _ => None,
    }
}

fn check_child(parent: &str, child: &str) -> Result<(), Error> {
    match allowed_children(parent) {
        Some(allowed) if !allowed.contains(&child) => Err(Error::invalid_unit(format!(
            "<{}> not allowed in <{}>. Only {} allowed.",
            child,
            parent,
            allowed.join(", ")
        ))),
        _ => Ok(()),
    }
}

/// Property name of a `<prop>` (its `type`) or `<note>` element.
fn property_key(element: &Element) -> String {
    match element.local_name().as_str() {
        "prop" => element.attribute("type").unwrap_or("prop").to_string(),
        other => other.to_string(),
    }
}
