//! Skeletons: the non-translatable bytes of a document, with holes.
//!
//! A skeleton is an ordered list of literal strings and placeholders. A
//! placeholder names a property of a resource and is only resolved when
//! the skeleton is rendered, so a translation or a new output encoding can
//! be set on the resource after parsing without touching the skeleton.

use serde::Serialize;

use crate::locale::LocaleId;

/// Which property a placeholder reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PropertyRef {
    /// The text content of the resource: source when the locale is `None`,
    /// the target of that locale otherwise.
    Content,
    /// A named property, such as `encoding` on a start-document resource.
    Named(String),
}

/// A deferred reference to a property of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placeholder {
    pub resource_id: String,
    pub property: PropertyRef,
    pub locale: Option<LocaleId>,
    /// Markup written around the value, only when the value is non-empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<(String, String)>,
    /// Markup written in place of the frame when the value is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty: Option<String>,
}

impl Placeholder {
    pub fn content(resource_id: impl Into<String>, locale: Option<LocaleId>) -> Self {
        Placeholder {
            resource_id: resource_id.into(),
            property: PropertyRef::Content,
            locale,
            frame: None,
            empty: None,
        }
    }

    pub fn named(resource_id: impl Into<String>, name: impl Into<String>) -> Self {
        Placeholder {
            resource_id: resource_id.into(),
            property: PropertyRef::Named(name.into()),
            locale: None,
            frame: None,
            empty: None,
        }
    }

    pub fn with_frame(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
        self.frame = Some((before.into(), after.into()));
        self
    }

    pub fn or_empty(mut self, markup: impl Into<String>) -> Self {
        self.empty = Some(markup.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkeletonPart {
    Literal(String),
    Placeholder(Placeholder),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Skeleton {
    parts: Vec<SkeletonPart>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_literal(text: impl Into<String>) -> Self {
        let mut skeleton = Self::new();
        skeleton.append_literal(&text.into());
        skeleton
    }

    /// Appends literal text, merging it into a trailing literal part.
    pub fn append_literal(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(SkeletonPart::Literal(last)) = self.parts.last_mut() {
            last.push_str(text);
        } else {
            self.parts.push(SkeletonPart::Literal(text.to_string()));
        }
    }

    pub fn add_placeholder(&mut self, placeholder: Placeholder) {
        self.parts.push(SkeletonPart::Placeholder(placeholder));
    }

    pub fn add_content_placeholder(&mut self, resource_id: &str, locale: Option<LocaleId>) {
        self.add_placeholder(Placeholder::content(resource_id, locale));
    }

    pub fn append_skeleton(&mut self, other: Skeleton) {
        for part in other.parts {
            match part {
                SkeletonPart::Literal(text) => self.append_literal(&text),
                placeholder => self.parts.push(placeholder),
            }
        }
    }

    pub fn parts(&self) -> &[SkeletonPart] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.parts.iter().filter_map(|part| match part {
            SkeletonPart::Placeholder(p) => Some(p),
            SkeletonPart::Literal(_) => None,
        })
    }

    /// Renders the skeleton, asking `resolve` for every placeholder value.
    ///
    /// A placeholder that resolves to `None` renders as the empty string.
    pub fn render<F>(&self, mut resolve: F) -> String
    where
        F: FnMut(&Placeholder) -> Option<String>,
    {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                SkeletonPart::Literal(text) => out.push_str(text),
                SkeletonPart::Placeholder(placeholder) => {
                    let value = resolve(placeholder).unwrap_or_default();
                    match &placeholder.frame {
                        Some(_) if value.is_empty() => {
                            if let Some(empty) = &placeholder.empty {
                                out.push_str(empty);
                            }
                        }
                        Some((before, after)) => {
                            out.push_str(before);
                            out.push_str(&value);
                            out.push_str(after);
                        }
                        None => out.push_str(&value),
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals_are_merged() {
        let mut skeleton = Skeleton::from_literal("<a>");
        skeleton.append_literal("<b>");
        skeleton.append_literal("");
        assert_eq!(skeleton.parts().len(), 1);
        assert_eq!(skeleton.render(|_| None), "<a><b>");
    }

    #[test]
    fn test_placeholder_resolved_at_render_time() {
        let mut skeleton = Skeleton::from_literal("<seg>");
        skeleton.add_content_placeholder("1", Some(LocaleId::new("fr")));
        skeleton.append_literal("</seg>");

        let mut value = "Salut".to_string();
        let first = skeleton.render(|_| Some(value.clone()));
        value = "Bonjour".to_string();
        let second = skeleton.render(|_| Some(value.clone()));
        assert_eq!(first, "<seg>Salut</seg>");
        assert_eq!(second, "<seg>Bonjour</seg>");
    }

    #[test]
    fn test_missing_value_renders_empty() {
        let mut skeleton = Skeleton::from_literal("encoding=\"");
        skeleton.add_placeholder(Placeholder::named("sd1", "encoding"));
        skeleton.append_literal("\"");
        assert_eq!(skeleton.render(|_| None), "encoding=\"\"");
    }

    #[test]
    fn test_frame_only_written_around_values() {
        let mut skeleton = Skeleton::new();
        skeleton.add_placeholder(
            Placeholder::content("1", Some(LocaleId::new("de")))
                .with_frame("<tuv xml:lang=\"de\"><seg>", "</seg></tuv>"),
        );
        assert_eq!(skeleton.render(|_| Some(String::new())), "");
        assert_eq!(
            skeleton.render(|_| Some("Hallo".into())),
            "<tuv xml:lang=\"de\"><seg>Hallo</seg></tuv>"
        );
    }

    #[test]
    fn test_append_skeleton_keeps_order() {
        let mut first = Skeleton::from_literal("a");
        let mut second = Skeleton::from_literal("b");
        second.add_placeholder(Placeholder::named("x", "p"));
        second.append_literal("c");
        first.append_skeleton(second);
        assert_eq!(first.parts().len(), 3);
        assert_eq!(first.placeholders().count(), 1);
        assert_eq!(first.render(|p| Some(format!("[{}]", p.resource_id))), "ab[x]c");
    }

    #[test]
    fn test_empty_alternative_replaces_the_frame() {
        let mut skeleton = Skeleton::from_literal("<tuv xml:lang=\"fr\">");
        skeleton.add_placeholder(
            Placeholder::content("1", Some(LocaleId::new("fr")))
                .with_frame("<seg>", "</seg>")
                .or_empty("<seg/>"),
        );
        skeleton.append_literal("</tuv>");
        assert_eq!(skeleton.render(|_| None), "<tuv xml:lang=\"fr\"><seg/></tuv>");
        assert_eq!(
            skeleton.render(|_| Some("Oui".into())),
            "<tuv xml:lang=\"fr\"><seg>Oui</seg></tuv>"
        );
    }
}
