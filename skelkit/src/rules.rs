//! Per-node extraction rules for the XML filter.
//!
//! The filter asks a [`RuleOracle`] about every element it enters. The
//! answer decides whether text directly inside the element is extracted,
//! for which locales, and where translations are meant to go.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::locale::LocaleId;

/// What the oracle gets to see about an element.
#[derive(Debug, Clone, Copy)]
pub struct NodeContext<'a> {
    /// Local names from the document root down to this element.
    pub path: &'a [String],
    pub attributes: &'a [(String, String)],
    /// Effective translatability of the enclosing element; `true` at the root.
    pub parent_translatable: bool,
}

impl NodeContext<'_> {
    /// Local name of the element itself.
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    /// Looks up an attribute by name, ignoring any namespace prefix.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name || key.rsplit(':').next() == Some(name))
            .map(|(_, value)| value.as_str())
    }
}

/// The decision for one element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRule {
    pub translatable: bool,
    pub locale_filter: Option<LocaleFilter>,
    /// Where translations belong, recorded on the unit as `target-pointer`.
    pub target_pointer: Option<String>,
}

impl NodeRule {
    pub fn translatable() -> Self {
        NodeRule {
            translatable: true,
            ..Default::default()
        }
    }

    pub fn skipped() -> Self {
        NodeRule::default()
    }
}

/// Decides how elements are handled.
pub trait RuleOracle {
    fn evaluate(&self, node: &NodeContext<'_>) -> NodeRule;
}

/// Include and exclude lists of locale patterns.
///
/// A pattern is `*` (any locale), `fr-*` (`fr` and every `fr-...` tag) or
/// a plain tag compared after normalization. An empty include list
/// accepts everything not excluded.
///
/// ```rust
/// use skelkit::{LocaleId, rules::LocaleFilter};
///
/// let filter = LocaleFilter::default()
///     .with_include("fr-*")
///     .with_exclude("fr-CA");
/// assert!(filter.accepts(&LocaleId::new("fr")));
/// assert!(filter.accepts(&LocaleId::new("fr-FR")));
/// assert!(!filter.accepts(&LocaleId::new("fr-ca")));
/// assert!(!filter.accepts(&LocaleId::new("de")));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocaleFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl LocaleFilter {
    pub fn with_include(mut self, pattern: impl Into<String>) -> Self {
        self.include.push(pattern.into());
        self
    }

    pub fn with_exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    pub fn accepts(&self, locale: &LocaleId) -> bool {
        let included =
            self.include.is_empty() || self.include.iter().any(|p| pattern_matches(p, locale));
        included && !self.exclude.iter().any(|p| pattern_matches(p, locale))
    }
}

fn pattern_matches(pattern: &str, locale: &LocaleId) -> bool {
    let pattern = pattern.trim();
    if pattern == "*" {
        return true;
    }
    let tag = locale.as_str().to_ascii_lowercase();
    match pattern.strip_suffix("-*") {
        Some(prefix) => {
            let prefix = LocaleId::new(prefix).as_str().to_ascii_lowercase();
            tag == prefix || tag.starts_with(&format!("{}-", prefix))
        }
        None => LocaleId::new(pattern).as_str().eq_ignore_ascii_case(&tag),
    }
}

/// Name-based rules, the default oracle of the XML filter.
///
/// Translatability is inherited from the parent element and overridden by,
/// in increasing priority: the `translatable` list (when non-empty the
/// document root starts out not translatable), the `excluded` list, and a
/// `translate="yes|no"` attribute when `honor_translate_attribute` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementRules {
    pub translatable: Vec<String>,
    pub excluded: Vec<String>,
    pub honor_translate_attribute: bool,
    /// Locale restrictions keyed by element name.
    pub locale_filters: BTreeMap<String, LocaleFilter>,
    /// Target pointers keyed by element name.
    pub target_pointers: BTreeMap<String, String>,
}

impl Default for ElementRules {
    fn default() -> Self {
        ElementRules {
            translatable: Vec::new(),
            excluded: Vec::new(),
            honor_translate_attribute: true,
            locale_filters: BTreeMap::new(),
            target_pointers: BTreeMap::new(),
        }
    }
}

impl ElementRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_translatable(mut self, name: impl Into<String>) -> Self {
        self.translatable.push(name.into());
        self
    }

    pub fn with_excluded(mut self, name: impl Into<String>) -> Self {
        self.excluded.push(name.into());
        self
    }

    pub fn with_translate_attribute(mut self, honor: bool) -> Self {
        self.honor_translate_attribute = honor;
        self
    }

    pub fn with_locale_filter(mut self, name: impl Into<String>, filter: LocaleFilter) -> Self {
        self.locale_filters.insert(name.into(), filter);
        self
    }

    pub fn with_target_pointer(mut self, name: impl Into<String>, pointer: impl Into<String>) -> Self {
        self.target_pointers.insert(name.into(), pointer.into());
        self
    }

    fn listed(list: &[String], name: &str) -> bool {
        list.iter().any(|entry| entry.eq_ignore_ascii_case(name))
    }
}

impl RuleOracle for ElementRules {
    fn evaluate(&self, node: &NodeContext<'_>) -> NodeRule {
        let name = node.name();
        let is_root = node.path.len() <= 1;

        let mut translatable = if is_root && !self.translatable.is_empty() {
            false
        } else {
            node.parent_translatable
        };
        if Self::listed(&self.translatable, name) {
            translatable = true;
        }
        if Self::listed(&self.excluded, name) {
            translatable = false;
        }
        if self.honor_translate_attribute {
            match node.attribute("translate").map(str::trim) {
                Some(v) if v.eq_ignore_ascii_case("no") => translatable = false,
                Some(v) if v.eq_ignore_ascii_case("yes") => translatable = true,
                _ => {}
            }
        }

        NodeRule {
            translatable,
            locale_filter: self.locale_filters.get(name).cloned(),
            target_pointer: self.target_pointers.get(name).cloned(),
        }
    }
}
