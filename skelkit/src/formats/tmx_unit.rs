//! Parse state of one `<tu>` and its conversion into text units.
//!
//! A [`TuRecord`] lives only while its `<tu>` is being read. Once the
//! closing tag is seen it is validated and turned into one primary text
//! unit plus one secondary unit per duplicate variant.

use std::collections::HashMap;

use crate::{
    container::{AlignmentStatus, TextContainer},
    error::Error,
    formats::{IdGenerator, tokens::Element},
    fragment::TextFragment,
    locale::LocaleId,
    resource::{Properties, TextUnit, join_property},
    skeleton::{Placeholder, Skeleton},
};

/// How a `<tuv>` relates to the configured locales.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantRole {
    Source,
    Target,
    Other,
}

/// One `<tuv>` as read from the input.
#[derive(Debug, Clone)]
pub struct TuvRecord {
    pub locale: LocaleId,
    pub role: VariantRole,
    /// 1-based count of variants with this locale so far; above 1 is a duplicate.
    pub ordinal: usize,
    /// `<tuv ...>` up to `<seg>`, and including it unless the segment
    /// was written as an empty element.
    pub skel_before: String,
    /// `</seg>` through `</tuv>` plus whatever follows before the next variant.
    pub skel_after: String,
    pub content: TextFragment,
    /// Inner markup of `<seg>`, written as-is for variants that are not extracted.
    pub literal: String,
    pub properties: Properties,
    /// The segment when written as `<seg/>`; kept so it is written back
    /// the same way while it stays empty.
    pub empty_seg: Option<Element>,
}

impl TuvRecord {
    pub fn is_duplicate(&self) -> bool {
        self.ordinal > 1
    }

    /// Placeholder for this variant's content, read from unit `unit_id`.
    fn content_placeholder(&self, unit_id: &str, locale: Option<LocaleId>) -> Placeholder {
        let placeholder = Placeholder::content(unit_id, locale);
        match &self.empty_seg {
            Some(seg) => {
                let open = format!("{}>", seg.raw.trim_end_matches("/>").trim_end());
                placeholder
                    .with_frame(open, format!("</{}>", seg.name))
                    .or_empty(seg.raw.as_str())
            }
            None => placeholder,
        }
    }

    /// Segment markup for a variant that is not extracted.
    fn verbatim(&self) -> &str {
        match &self.empty_seg {
            Some(seg) => &seg.raw,
            None => &self.literal,
        }
    }
}

/// One `<tu>` as read from the input.
#[derive(Debug, Clone, Default)]
pub struct TuRecord {
    pub skel_before: String,
    pub skel_after: String,
    pub properties: Properties,
    pub name: Option<String>,
    pub variants: Vec<TuvRecord>,
    ordinals: HashMap<LocaleId, usize>,
}

/// Settings that shape the units built from a record.
#[derive(Debug, Clone)]
pub struct UnitContext<'a> {
    pub source_locale: &'a LocaleId,
    pub target_locale: &'a LocaleId,
    pub process_all_targets: bool,
    /// Sentence-level segmentation: containers are segmented and aligned.
    pub sentence: bool,
    pub line_break: &'a str,
}

impl TuRecord {
    pub fn new(start_markup: &str) -> Self {
        TuRecord {
            skel_before: start_markup.to_string(),
            ..Default::default()
        }
    }

    /// Appends structural markup before the first variant, or after the
    /// latest one once variants have started.
    pub fn append_skeleton(&mut self, markup: &str) {
        match self.variants.last_mut() {
            Some(variant) => variant.skel_after.push_str(markup),
            None => self.skel_before.push_str(markup),
        }
    }

    pub fn add_property(&mut self, name: &str, value: &str, separator: &str) {
        join_property(&mut self.properties, name, value, separator);
    }

    /// Starts a new variant and returns it.
    pub fn add_variant(&mut self, locale: LocaleId, role: VariantRole) -> &mut TuvRecord {
        let ordinal = self.ordinals.entry(locale.clone()).or_insert(0);
        *ordinal += 1;
        let ordinal = *ordinal;
        self.variants.push(TuvRecord {
            locale,
            role,
            ordinal,
            skel_before: String::new(),
            skel_after: String::new(),
            content: TextFragment::new(),
            literal: String::new(),
            properties: Properties::new(),
            empty_seg: None,
        });
        let last = self.variants.len() - 1;
        &mut self.variants[last]
    }

    /// Checks that the record has exactly one source variant.
    pub fn validate(&self, source_locale: &LocaleId, label: &str) -> Result<(), Error> {
        if self.variants.is_empty() {
            return Err(Error::invalid_unit(format!("unit {} has no <tuv>", label)));
        }
        match self
            .variants
            .iter()
            .filter(|v| v.role == VariantRole::Source)
            .count()
        {
            1 => Ok(()),
            0 => Err(Error::MissingSourceVariant {
                locale: source_locale.to_string(),
                unit: label.to_string(),
            }),
            _ => Err(Error::DuplicateSourceVariant {
                locale: source_locale.to_string(),
                unit: label.to_string(),
            }),
        }
    }

    /// Builds the primary unit followed by one secondary unit per
    /// duplicate variant. Secondary units take the ids right after the
    /// primary. Their content is written in place by the primary's
    /// skeleton; their own skeleton holds just their `<tuv>` and is only
    /// used when they are rendered alone.
    pub fn into_units(
        self,
        ctx: &UnitContext<'_>,
        ids: &mut IdGenerator,
    ) -> Result<Vec<TextUnit>, Error> {
        let primary_id = ids.next_unit();
        let label = self.name.clone().unwrap_or_else(|| primary_id.clone());
        self.validate(ctx.source_locale, &label)?;

        let mut skeleton = Skeleton::from_literal(self.skel_before.as_str());
        let mut secondaries: Vec<TextUnit> = Vec::new();
        let mut source = TextContainer::default();
        let mut targets: Vec<(LocaleId, TextContainer)> = Vec::new();
        let mut has_target_variant = false;

        // source first so secondary units can copy it
        if let Some(variant) = self.variants.iter().find(|v| v.role == VariantRole::Source) {
            source = container_for(variant, ctx.sentence);
        }

        for variant in &self.variants {
            skeleton.append_literal(&variant.skel_before);
            let extracted = variant.role != VariantRole::Other || ctx.process_all_targets;
            if variant.role == VariantRole::Target {
                has_target_variant = true;
            }
            let locale = Some(variant.locale.clone());
            match (variant.role, extracted, variant.is_duplicate()) {
                (_, false, _) => skeleton.append_literal(variant.verbatim()),
                (VariantRole::Source, true, _) => {
                    skeleton.add_placeholder(variant.content_placeholder(&primary_id, None));
                }
                (_, true, false) => {
                    skeleton.add_placeholder(variant.content_placeholder(&primary_id, locale));
                    targets.push((variant.locale.clone(), container_for(variant, ctx.sentence)));
                }
                (_, true, true) => {
                    let mut unit = TextUnit::new(ids.next_unit(), source.clone());
                    unit.name = self.name.clone();
                    unit.properties = self.properties.clone();
                    unit.set_target(variant.locale.clone(), container_for(variant, ctx.sentence));
                    let placeholder = variant.content_placeholder(&unit.id, locale);

                    let mut own = Skeleton::from_literal(variant.skel_before.as_str());
                    own.add_placeholder(placeholder.clone());
                    own.append_literal(&variant.skel_after);
                    unit.skeleton = own;
                    unit.written_by = Some(primary_id.clone());

                    skeleton.add_placeholder(placeholder);
                    secondaries.push(unit);
                }
            }
            skeleton.append_literal(&variant.skel_after);
        }

        if !has_target_variant {
            let locale = ctx.target_locale;
            skeleton.add_placeholder(
                Placeholder::content(primary_id.as_str(), Some(locale.clone())).with_frame(
                    format!("<tuv xml:lang=\"{}\"><seg>", locale),
                    format!("</seg></tuv>{}", ctx.line_break),
                ),
            );
        }
        skeleton.append_literal(&self.skel_after);

        let mut primary = TextUnit::new(primary_id, source);
        primary.name = self.name;
        primary.properties = self.properties;
        primary.skeleton = skeleton;
        for (locale, container) in targets {
            primary.set_target(locale, container);
        }

        let mut units = Vec::with_capacity(1 + secondaries.len());
        units.push(primary);
        units.extend(secondaries);
        Ok(units)
    }
}

fn container_for(variant: &TuvRecord, sentence: bool) -> TextContainer {
    let mut container = TextContainer::new(variant.content.clone());
    container.properties = variant.properties.clone();
    container.set_segmented(sentence);
    container.set_alignment(if sentence {
        AlignmentStatus::Aligned
    } else {
        AlignmentStatus::NotAligned
    });
    container
}
