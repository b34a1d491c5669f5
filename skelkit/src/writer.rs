//! Rebuilds a document from its events.
//!
//! The writer renders each resource's skeleton, resolving placeholders
//! against the resource (and, for cross references, the units it points
//! at), escapes extracted content with the document's encoder and encodes
//! the result into the output encoding.

use std::{borrow::Cow, collections::BTreeSet, io::Write};

use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    detector::{Bom, encoding_for_label},
    encoder::XmlEncoder,
    error::Error,
    locale::LocaleId,
    resource::{Event, PropertySource, StartDocument},
    skeleton::{Placeholder, PropertyRef},
};

/// Output settings for [`SkeletonWriter`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    /// Locale whose targets replace the source in monolingual documents.
    /// Defaults to the document's target locale.
    pub output_locale: Option<LocaleId>,
    /// Output encoding label. Defaults to the input's encoding.
    pub output_encoding: Option<String>,
}

impl WriterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_locale(mut self, locale: impl Into<LocaleId>) -> Self {
        self.output_locale = Some(locale.into());
        self
    }

    pub fn with_output_encoding(mut self, label: impl Into<String>) -> Self {
        self.output_encoding = Some(label.into());
        self
    }
}

/// Per-document output state, set up by the start-document event.
#[derive(Debug, Clone)]
struct OutputState {
    encoder: XmlEncoder,
    multilingual: bool,
    encoding: &'static Encoding,
    label: String,
    output_locale: Option<LocaleId>,
    write_bom: bool,
}

impl Default for OutputState {
    fn default() -> Self {
        OutputState {
            encoder: XmlEncoder::default(),
            multilingual: false,
            encoding: UTF_8,
            label: UTF_8.name().to_string(),
            output_locale: None,
            write_bom: false,
        }
    }
}

/// Writes events back out as a document.
///
/// Text units whose skeleton points at units not seen yet are held back
/// until those units arrive, or until the next non-unit event.
#[derive(Debug, Default)]
pub struct SkeletonWriter {
    options: WriterOptions,
    state: OutputState,
    held: Vec<Event>,
    awaited: BTreeSet<String>,
}

impl SkeletonWriter {
    pub fn new(options: WriterOptions) -> Self {
        SkeletonWriter {
            options,
            ..Default::default()
        }
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// The encoding output is currently produced in.
    pub fn encoding(&self) -> &'static Encoding {
        self.state.encoding
    }

    pub fn write_event<W: Write>(&mut self, event: &Event, out: &mut W) -> Result<(), Error> {
        match event {
            Event::StartDocument(start) => {
                self.flush(out)?;
                self.start(start)?;
                if self.state.write_bom {
                    if let Some(bom) = Bom::bytes_for(self.state.encoding) {
                        out.write_all(bom)?;
                    }
                }
                let text = self.render_with(event, &[]);
                self.emit(&text, out)
            }
            Event::TextUnit(unit) => {
                let references: Vec<String> = unit
                    .skeleton
                    .placeholders()
                    .filter(|p| p.resource_id != unit.id)
                    .map(|p| p.resource_id.clone())
                    .collect();
                if self.held.is_empty() && references.is_empty() {
                    if let Some(parent) = &unit.written_by {
                        warn!("Unit {} arrived after unit {} was written", unit.id, parent);
                        return Ok(());
                    }
                    let text = self.render_with(event, &[]);
                    return self.emit(&text, out);
                }

                self.awaited.remove(&unit.id);
                for id in references {
                    let seen = self
                        .held
                        .iter()
                        .filter_map(Event::resource)
                        .any(|r| r.id() == id);
                    if !seen {
                        self.awaited.insert(id);
                    }
                }
                self.held.push(event.clone());
                if self.awaited.is_empty() {
                    self.flush(out)?;
                }
                Ok(())
            }
            Event::DocumentPart(_) | Event::Ending(_) => {
                self.flush(out)?;
                let text = self.render_with(event, &[]);
                self.emit(&text, out)
            }
            Event::Cancelled => {
                debug!("Discarding {} held events after cancellation", self.held.len());
                self.held.clear();
                self.awaited.clear();
                Ok(())
            }
        }
    }

    /// Writes out everything held back, resolving what can be resolved.
    pub fn flush<W: Write>(&mut self, out: &mut W) -> Result<(), Error> {
        if self.held.is_empty() {
            return Ok(());
        }
        if !self.awaited.is_empty() {
            warn!(
                "Writing units before referenced units {:?} arrived; their content is left empty",
                self.awaited
            );
        }
        let held = std::mem::take(&mut self.held);
        self.awaited.clear();
        let mut text = String::new();
        for event in held.iter().filter(|e| !written_in_place(e)) {
            text.push_str(&self.render_with(event, &held));
        }
        self.emit(&text, out)
    }

    /// Renders one event on its own, without encoding it. References to
    /// other resources render empty; a unit written in place by another
    /// renders its standalone skeleton.
    pub fn render_event(&self, event: &Event) -> String {
        match event {
            Event::StartDocument(start) => {
                let mut writer = SkeletonWriter::new(self.options.clone());
                match writer.start(start) {
                    Ok(()) => writer.render_with(event, &[]),
                    Err(_) => self.render_with(event, &[]),
                }
            }
            _ => self.render_with(event, &[]),
        }
    }

    fn start(&mut self, start: &StartDocument) -> Result<(), Error> {
        let label = self
            .options
            .output_encoding
            .clone()
            .unwrap_or_else(|| start.encoding.clone());
        let encoding = if label.trim().eq_ignore_ascii_case("utf-16")
            && start.detected_encoding == UTF_16BE.name()
        {
            UTF_16BE
        } else {
            encoding_for_label(&label)?
        };
        let unicode = encoding == UTF_8 || encoding == UTF_16LE || encoding == UTF_16BE;
        let output_locale = self
            .options
            .output_locale
            .clone()
            .or_else(|| start.target_locale.clone());

        debug!(
            "Writing {} as {} (BOM: {})",
            start.name.as_deref().unwrap_or("document"),
            encoding.name(),
            start.has_bom && unicode
        );
        self.state = OutputState {
            encoder: start.encoder,
            multilingual: start.multilingual,
            encoding,
            label,
            output_locale,
            write_bom: start.has_bom && unicode,
        };
        Ok(())
    }

    fn render_with(&self, event: &Event, others: &[Event]) -> String {
        let Some(resource) = event.resource() else {
            return String::new();
        };
        let is_start = matches!(event, Event::StartDocument(_));
        resource
            .skeleton()
            .render(|placeholder| self.resolve(placeholder, resource, is_start, others))
    }

    fn resolve(
        &self,
        placeholder: &Placeholder,
        resource: &dyn PropertySource,
        is_start: bool,
        others: &[Event],
    ) -> Option<String> {
        let target = if placeholder.resource_id == resource.id() {
            resource
        } else {
            others
                .iter()
                .filter_map(Event::resource)
                .find(|r| r.id() == placeholder.resource_id)?
        };

        match &placeholder.property {
            PropertyRef::Named(name) if is_start && name == "encoding" => Some(self.state.label.clone()),
            PropertyRef::Named(name) => target
                .property(name, placeholder.locale.as_ref())
                .map(str::to_string),
            PropertyRef::Content => {
                let container = if self.state.multilingual {
                    target.content(placeholder.locale.as_ref())
                } else {
                    let locale = placeholder.locale.as_ref().or(self.state.output_locale.as_ref());
                    locale
                        .and_then(|l| target.content(Some(l)))
                        .or_else(|| target.content(None))
                };
                container.map(|c| self.state.encoder.encode_container(c))
            }
        }
    }

    fn emit<W: Write>(&self, text: &str, out: &mut W) -> Result<(), Error> {
        if text.is_empty() {
            return Ok(());
        }
        out.write_all(&encode(text, self.state.encoding))?;
        Ok(())
    }
}

/// Units whose content another held unit writes.
fn written_in_place(event: &Event) -> bool {
    matches!(event, Event::TextUnit(unit) if unit.written_by.is_some())
}

/// Encodes text for output. Characters the encoding cannot represent
/// become numeric character references.
pub fn encode<'a>(text: &'a str, encoding: &'static Encoding) -> Cow<'a, [u8]> {
    if encoding == UTF_16LE {
        Cow::Owned(text.encode_utf16().flat_map(u16::to_le_bytes).collect())
    } else if encoding == UTF_16BE {
        Cow::Owned(text.encode_utf16().flat_map(u16::to_be_bytes).collect())
    } else {
        let (bytes, _, unmappable) = encoding.encode(text);
        if unmappable {
            debug!("Some characters are not representable in {}", encoding.name());
        }
        bytes
    }
}
