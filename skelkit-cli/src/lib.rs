//! CLI library for testing purposes

pub mod debug;
pub mod rewrite;
pub mod view;

use std::str::FromStr;

use skelkit::{Event, FormatType, RawDocument, codec, infer_format_from_extension};

pub use rewrite::{RewriteArgs, apply_translations, load_translations, run_rewrite_command};

/// Input file plus the locales and format it is read with.
#[derive(Debug, Clone)]
pub struct DocumentArgs {
    pub input: String,
    pub source: String,
    pub target: Option<String>,
    pub format: Option<String>,
}

impl DocumentArgs {
    /// The explicit `--format`, or the one implied by the input extension.
    pub fn resolve_format(&self) -> Result<FormatType, String> {
        match &self.format {
            Some(name) => FormatType::from_str(name).map_err(|e| e.to_string()),
            None => infer_format_from_extension(&self.input).ok_or_else(|| {
                format!(
                    "Cannot infer the format of {}; pass --format tmx or --format xml",
                    self.input
                )
            }),
        }
    }

    pub fn open(&self) -> Result<RawDocument, String> {
        let document = RawDocument::from_path(&self.input)
            .map_err(|e| format!("Error reading {}: {}", self.input, e))?;
        Ok(self.with_locales(document))
    }

    /// Applies `--source` and `--target` to an opened document.
    pub fn with_locales(&self, document: RawDocument) -> RawDocument {
        let document = document.with_source_locale(self.source.as_str());
        match &self.target {
            Some(target) => document.with_target_locale(target.as_str()),
            None => document,
        }
    }

    /// Runs the matching filter over the input and returns every event.
    pub fn extract(&self) -> Result<Vec<Event>, String> {
        let format = self.resolve_format()?;
        let mut filter = codec::filter_for(format);
        codec::extract(filter.as_mut(), self.open()?)
            .map_err(|e| format!("Error parsing {}: {}", self.input, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(input: &str, format: Option<&str>) -> DocumentArgs {
        DocumentArgs {
            input: input.to_string(),
            source: "en".to_string(),
            target: None,
            format: format.map(str::to_string),
        }
    }

    #[test]
    fn test_resolve_format() {
        assert_eq!(args("a.tmx", None).resolve_format(), Ok(FormatType::Tmx));
        assert_eq!(args("a.txt", Some("XML")).resolve_format(), Ok(FormatType::Xml));
        assert!(args("a.txt", None).resolve_format().is_err());
        assert!(args("a.tmx", Some("xliff")).resolve_format().is_err());
    }
}
