//! Monolingual filter for generic XML documents.
//!
//! Extraction is driven by a [`RuleOracle`]. Each run of text directly
//! inside a translatable element becomes one text unit; elements listed as
//! inline are kept inside the run as codes. All other markup is skeleton.

use std::{collections::VecDeque, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    code::{Code, TagType},
    container::TextContainer,
    error::Error,
    formats::{
        ENDING_ID, EventStream, IdGenerator, normalize_line_breaks, start_document,
        tokens::{Element, Token, Tokenizer},
    },
    fragment::TextFragment,
    locale::LocaleId,
    raw_document::RawDocument,
    resource::{DocumentPart, Ending, Event, TextUnit},
    rules::{ElementRules, NodeContext, RuleOracle},
    skeleton::Skeleton,
    traits::{CancelHandle, Filter, FilterState},
};

pub const MIME_TYPE: &str = "text/xml";

/// Unit property holding the rule's target pointer.
pub const TARGET_POINTER_PROPERTY: &str = "target-pointer";

/// Options for [`XmlFilter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XmlParameters {
    pub escape_gt: bool,
    /// Rules used when no custom oracle is set on the filter.
    pub rules: ElementRules,
    /// Elements that stay inside the surrounding text as inline codes.
    pub inline_elements: Vec<String>,
}

impl Default for XmlParameters {
    fn default() -> Self {
        XmlParameters {
            escape_gt: false,
            rules: ElementRules::default(),
            inline_elements: ["b", "i", "u", "em", "strong", "span", "br", "a", "code", "sub", "sup"]
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }
}

impl XmlParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_escape_gt(mut self, escape_gt: bool) -> Self {
        self.escape_gt = escape_gt;
        self
    }

    pub fn with_rules(mut self, rules: ElementRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_inline_elements<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inline_elements = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Pull filter for XML documents.
#[derive(Default)]
pub struct XmlFilter {
    params: XmlParameters,
    oracle: Option<Arc<dyn RuleOracle + Send + Sync>>,
    stream: EventStream,
    parser: Option<XmlParser>,
}

impl XmlFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameters(params: XmlParameters) -> Self {
        XmlFilter {
            params,
            ..Default::default()
        }
    }

    /// Replaces the name-based rules with a custom oracle.
    pub fn with_oracle(mut self, oracle: impl RuleOracle + Send + Sync + 'static) -> Self {
        self.oracle = Some(Arc::new(oracle));
        self
    }

    pub fn parameters(&self) -> &XmlParameters {
        &self.params
    }
}

impl Filter for XmlFilter {
    fn name(&self) -> &'static str {
        "xml"
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
        let rule_locale = document.target_locale.clone().unwrap_or(source_locale);

        let (decoded, reader) = document.decode()?;
        let mut tokenizer = Tokenizer::new(reader);
        let start = start_document(
            &mut tokenizer,
            &decoded,
            MIME_TYPE,
            false,
            self.params.escape_gt,
        )?;

        let oracle = match &self.oracle {
            Some(oracle) => Arc::clone(oracle),
            None => Arc::new(self.params.rules.clone()),
        };
        self.parser = Some(XmlParser {
            tokenizer,
            oracle,
            inline_elements: self.params.inline_elements.clone(),
            rule_locale,
            ids: IdGenerator::default(),
            path: Vec::new(),
            frames: Vec::new(),
            run: None,
            pending: String::new(),
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

/// An element the parser is inside of.
struct Frame {
    translatable: bool,
    target_pointer: Option<String>,
    unit_name: Option<String>,
}

/// Text being collected for the next unit.
#[derive(Default)]
struct Run {
    fragment: TextFragment,
    literal: String,
    /// Inline elements opened inside the run and not closed yet.
    open_inline: usize,
}

struct XmlParser {
    tokenizer: Tokenizer,
    oracle: Arc<dyn RuleOracle + Send + Sync>,
    inline_elements: Vec<String>,
    rule_locale: LocaleId,
    ids: IdGenerator,
    path: Vec<String>,
    frames: Vec<Frame>,
    run: Option<Run>,
    pending: String,
}

impl XmlParser {
    fn pump(&mut self, queue: &mut VecDeque<Event>) -> Result<(), Error> {
        while queue.is_empty() {
            let token = self.tokenizer.next_token()?;
            match token {
                Token::Eof => {
                    if let Some(name) = self.path.last() {
                        return Err(Error::UnexpectedEof(name.clone()));
                    }
                    self.close_run(queue);
                    let skeleton = Skeleton::from_literal(std::mem::take(&mut self.pending));
                    queue.push_back(Event::Ending(Ending {
                        id: ENDING_ID.to_string(),
                        skeleton,
                    }));
                }
                Token::Start(e) => {
                    if self.inside_inline() || self.starts_inline(&e) {
                        let run = self.run.get_or_insert_with(Run::default);
                        run.literal.push_str(&e.raw);
                        run.open_inline += 1;
                        run.fragment.append_code(
                            Code::new(TagType::Opening, e.local_name(), e.raw.as_str())
                                .with_outer_data(e.raw.as_str()),
                        );
                    } else {
                        self.close_run(queue);
                        self.enter(&e);
                        self.pending.push_str(&e.raw);
                    }
                }
                Token::End(e) => {
                    if self.inside_inline() {
                        if let Some(run) = self.run.as_mut() {
                            run.literal.push_str(&e.raw);
                            run.open_inline -= 1;
                            run.fragment.append_code(
                                Code::new(TagType::Closing, e.local_name(), e.raw.as_str())
                                    .with_outer_data(e.raw.as_str()),
                            );
                        }
                    } else {
                        self.close_run(queue);
                        self.pending.push_str(&e.raw);
                        self.frames.pop();
                        self.path.pop();
                    }
                }
                Token::Empty(e) => {
                    if self.inside_inline() || self.starts_inline(&e) {
                        let run = self.run.get_or_insert_with(Run::default);
                        run.literal.push_str(&e.raw);
                        run.fragment.append_code(
                            Code::new(TagType::Placeholder, e.local_name(), e.raw.as_str())
                                .with_outer_data(e.raw.as_str()),
                        );
                    } else {
                        self.close_run(queue);
                        self.pending.push_str(&e.raw);
                    }
                }
                Token::Text { raw, text } | Token::CData { raw, text } => {
                    if self.run.is_some() || self.in_translatable() {
                        let run = self.run.get_or_insert_with(Run::default);
                        run.literal.push_str(&raw);
                        run.fragment.append_text(&normalize_line_breaks(&text));
                    } else {
                        self.pending.push_str(&raw);
                    }
                }
                other => match self.run.as_mut() {
                    Some(run) => {
                        run.literal.push_str(other.raw());
                        run.fragment.append_code(
                            Code::new(TagType::Placeholder, "x-markup", other.raw())
                                .with_outer_data(other.raw()),
                        );
                    }
                    None => self.pending.push_str(other.raw()),
                },
            }
        }
        Ok(())
    }

    fn in_translatable(&self) -> bool {
        self.frames.last().is_some_and(|frame| frame.translatable)
    }

    fn inside_inline(&self) -> bool {
        self.run.as_ref().is_some_and(|run| run.open_inline > 0)
    }

    fn starts_inline(&self, element: &Element) -> bool {
        let name = element.local_name();
        self.in_translatable()
            && self
                .inline_elements
                .iter()
                .any(|inline| inline.eq_ignore_ascii_case(&name))
    }

    /// Pushes a frame for a structural element, asking the oracle about it.
    fn enter(&mut self, element: &Element) {
        self.path.push(element.local_name());
        let parent = self.frames.last();
        let parent_translatable = parent.is_none_or(|frame| frame.translatable);
        let rule = self.oracle.evaluate(&NodeContext {
            path: &self.path,
            attributes: &element.attributes,
            parent_translatable,
        });
        let accepted = rule
            .locale_filter
            .as_ref()
            .is_none_or(|filter| filter.accepts(&self.rule_locale));
        let target_pointer = rule
            .target_pointer
            .or_else(|| parent.and_then(|frame| frame.target_pointer.clone()));
        let unit_name = element
            .attribute("xml:id")
            .or_else(|| element.attribute("id"))
            .map(str::to_string);
        self.frames.push(Frame {
            translatable: rule.translatable && accepted,
            target_pointer,
            unit_name,
        });
    }

    /// Turns the current run into a unit, or back into skeleton when it
    /// holds no text.
    fn close_run(&mut self, queue: &mut VecDeque<Event>) {
        let Some(run) = self.run.take() else {
            return;
        };
        if !run.fragment.has_text() {
            self.pending.push_str(&run.literal);
            return;
        }

        if !self.pending.is_empty() {
            let skeleton = Skeleton::from_literal(std::mem::take(&mut self.pending));
            queue.push_back(Event::DocumentPart(DocumentPart::new(
                self.ids.next_part(),
                skeleton,
            )));
        }

        let mut fragment = run.fragment;
        fragment.balance_markers();
        fragment.set_original_markup(run.literal);

        let mut unit = TextUnit::new(self.ids.next_unit(), TextContainer::new(fragment));
        unit.skeleton.add_content_placeholder(&unit.id, None);
        if let Some(frame) = self.frames.last() {
            unit.name = frame.unit_name.clone();
            if let Some(pointer) = &frame.target_pointer {
                unit.properties
                    .insert(TARGET_POINTER_PROPERTY.to_string(), pointer.clone());
            }
        }
        queue.push_back(Event::TextUnit(unit));
    }
}
