//! Resources and the events that carry them.
//!
//! Every event a filter produces owns one resource, and every resource owns
//! exactly one skeleton. Text units additionally own their source and
//! target containers. Consumers match on [`Event`] exhaustively.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    container::TextContainer, detector::LineBreak, encoder::XmlEncoder, fragment::TextFragment,
    locale::LocaleId, skeleton::Skeleton,
};

pub type Properties = BTreeMap<String, String>;

/// Sets `name` to `value`, joining with `separator` if it already exists.
pub fn join_property(properties: &mut Properties, name: &str, value: &str, separator: &str) {
    match properties.get_mut(name) {
        Some(existing) => {
            existing.push_str(separator);
            existing.push_str(value);
        }
        None => {
            properties.insert(name.to_string(), value.to_string());
        }
    }
}

/// Read access used by the skeleton writer to resolve placeholders.
pub trait PropertySource {
    fn id(&self) -> &str;

    fn skeleton(&self) -> &Skeleton;

    /// A named property; with a locale, the property of that target.
    fn property(&self, name: &str, locale: Option<&LocaleId>) -> Option<&str>;

    /// Text content: the source for `None`, a target otherwise.
    fn content(&self, _locale: Option<&LocaleId>) -> Option<&TextContainer> {
        None
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartDocument {
    pub id: String,
    pub name: Option<String>,
    /// Encoding label written into the document's declaration.
    pub encoding: String,
    /// Canonical name of the encoding the input was decoded with.
    pub detected_encoding: String,
    pub has_bom: bool,
    pub locale: LocaleId,
    pub target_locale: Option<LocaleId>,
    pub line_break: LineBreak,
    pub mime_type: String,
    pub multilingual: bool,
    /// Encoder the writer uses for this document's content.
    pub encoder: XmlEncoder,
    pub properties: Properties,
    pub skeleton: Skeleton,
}

/// Extracted text with its source, targets and surrounding skeleton.
///
/// A unit whose content lives inside another unit's markup (a duplicate
/// TMX variant) names that unit in `written_by`. The writer leaves such a
/// unit's own skeleton out of the document, since the other unit writes
/// its content in place. That skeleton is a minimal standalone rendering
/// of the unit, used when it is rendered on its own.
#[derive(Debug, Clone, Serialize)]
pub struct TextUnit {
    pub id: String,
    pub name: Option<String>,
    pub source: TextContainer,
    targets: BTreeMap<LocaleId, TextContainer>,
    pub properties: Properties,
    pub skeleton: Skeleton,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub written_by: Option<String>,
}

impl TextUnit {
    pub fn new(id: impl Into<String>, source: TextContainer) -> Self {
        TextUnit {
            id: id.into(),
            name: None,
            source,
            targets: BTreeMap::new(),
            properties: Properties::new(),
            skeleton: Skeleton::new(),
            written_by: None,
        }
    }

    pub fn target(&self, locale: &LocaleId) -> Option<&TextContainer> {
        self.targets.get(locale)
    }

    pub fn target_mut(&mut self, locale: &LocaleId) -> Option<&mut TextContainer> {
        self.targets.get_mut(locale)
    }

    pub fn has_target(&self, locale: &LocaleId) -> bool {
        self.targets.contains_key(locale)
    }

    pub fn set_target(&mut self, locale: LocaleId, container: TextContainer) {
        self.targets.insert(locale, container);
    }

    /// Replaces the content of a target, creating the target if needed.
    /// Container properties of an existing target are kept.
    pub fn set_target_content(&mut self, locale: &LocaleId, content: TextFragment) {
        match self.targets.get_mut(locale) {
            Some(container) => container.set_content(content),
            None => {
                self.targets
                    .insert(locale.clone(), TextContainer::new(content));
            }
        }
    }

    pub fn remove_target(&mut self, locale: &LocaleId) -> Option<TextContainer> {
        self.targets.remove(locale)
    }

    pub fn target_locales(&self) -> impl Iterator<Item = &LocaleId> {
        self.targets.keys()
    }
}

impl PropertySource for TextUnit {
    fn id(&self) -> &str {
        &self.id
    }

    fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    fn property(&self, name: &str, locale: Option<&LocaleId>) -> Option<&str> {
        match locale {
            Some(locale) => self
                .targets
                .get(locale)
                .and_then(|t| t.properties.get(name))
                .map(String::as_str),
            None if name == "name" => self.name.as_deref(),
            None => self.properties.get(name).map(String::as_str),
        }
    }

    fn content(&self, locale: Option<&LocaleId>) -> Option<&TextContainer> {
        match locale {
            Some(locale) => self.targets.get(locale),
            None => Some(&self.source),
        }
    }
}

/// Pure structural content.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentPart {
    pub id: String,
    pub properties: Properties,
    pub skeleton: Skeleton,
}

impl DocumentPart {
    pub fn new(id: impl Into<String>, skeleton: Skeleton) -> Self {
        DocumentPart {
            id: id.into(),
            properties: Properties::new(),
            skeleton,
        }
    }
}

/// Last resource of a document, carrying any trailing skeleton.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Ending {
    pub id: String,
    pub skeleton: Skeleton,
}

impl PropertySource for DocumentPart {
    fn id(&self) -> &str {
        &self.id
    }

    fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    fn property(&self, name: &str, _locale: Option<&LocaleId>) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

impl PropertySource for StartDocument {
    fn id(&self) -> &str {
        &self.id
    }

    fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    fn property(&self, name: &str, _locale: Option<&LocaleId>) -> Option<&str> {
        match name {
            "encoding" => Some(&self.encoding),
            "name" => self.name.as_deref(),
            "mime-type" => Some(&self.mime_type),
            _ => self.properties.get(name).map(String::as_str),
        }
    }
}

impl PropertySource for Ending {
    fn id(&self) -> &str {
        &self.id
    }

    fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    fn property(&self, _name: &str, _locale: Option<&LocaleId>) -> Option<&str> {
        None
    }
}

/// One step of a filter's output.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum Event {
    StartDocument(StartDocument),
    TextUnit(TextUnit),
    DocumentPart(DocumentPart),
    Ending(Ending),
    Cancelled,
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::StartDocument(_) => "StartDocument",
            Event::TextUnit(_) => "TextUnit",
            Event::DocumentPart(_) => "DocumentPart",
            Event::Ending(_) => "Ending",
            Event::Cancelled => "Cancelled",
        }
    }

    /// The resource carried by the event, if any.
    pub fn resource(&self) -> Option<&dyn PropertySource> {
        match self {
            Event::StartDocument(r) => Some(r),
            Event::TextUnit(r) => Some(r),
            Event::DocumentPart(r) => Some(r),
            Event::Ending(r) => Some(r),
            Event::Cancelled => None,
        }
    }

    pub fn as_text_unit(&self) -> Option<&TextUnit> {
        match self {
            Event::TextUnit(unit) => Some(unit),
            _ => None,
        }
    }

    pub fn as_text_unit_mut(&mut self) -> Option<&mut TextUnit> {
        match self {
            Event::TextUnit(unit) => Some(unit),
            _ => None,
        }
    }

    /// True for events after which a filter produces nothing more.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Ending(_) | Event::Cancelled)
    }
}
