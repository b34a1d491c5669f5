use std::{collections::BTreeMap, fs};

use log::{info, warn};
use skelkit::{LocaleId, TextFragment, TextUnit, WriterOptions, codec};

use crate::DocumentArgs;

/// Options of the rewrite command.
#[derive(Debug, Clone)]
pub struct RewriteArgs {
    pub document: DocumentArgs,
    pub output: String,
    /// JSON object mapping unit names or ids to translated text.
    pub translations: Option<String>,
    pub output_locale: Option<String>,
    pub output_encoding: Option<String>,
}

/// Reads a translation map: a flat JSON object of strings.
pub fn load_translations(path: &str) -> Result<BTreeMap<String, String>, String> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("Error reading {}: {}", path, e))?;
    serde_json::from_str(&content).map_err(|e| format!("Invalid translations in {}: {}", path, e))
}

/// Sets the target of `unit` from `translations`, looked up by unit name
/// first and id second. Returns whether a translation was found.
pub fn apply_translations(
    unit: &mut TextUnit,
    translations: &BTreeMap<String, String>,
    locale: &LocaleId,
) -> bool {
    let text = unit
        .name
        .as_ref()
        .and_then(|name| translations.get(name))
        .or_else(|| translations.get(&unit.id));
    let Some(text) = text else {
        return false;
    };
    if unit.source.first_content().is_some_and(TextFragment::has_code) {
        warn!("Inline codes of unit {} are not carried into its translation", unit.id);
    }
    unit.set_target_content(locale, TextFragment::from_text(text));
    true
}

/// Run the rewrite command: write the input back out, applying translations
/// and output options on the way.
pub fn run_rewrite_command(args: &RewriteArgs) -> Result<(), String> {
    let translations = match &args.translations {
        Some(path) => load_translations(path)?,
        None => BTreeMap::new(),
    };
    let locale = args
        .output_locale
        .as_ref()
        .or(args.document.target.as_ref())
        .map(|l| LocaleId::new(l.as_str()));
    if !translations.is_empty() && locale.is_none() {
        return Err("Applying translations needs --target or --output-locale".to_string());
    }

    let mut options = WriterOptions::new();
    if let Some(locale) = &args.output_locale {
        options = options.with_output_locale(locale.as_str());
    }
    if let Some(encoding) = &args.output_encoding {
        options = options.with_output_encoding(encoding.as_str());
    }

    let format = args.document.resolve_format()?;
    let mut applied = 0;
    codec::rewrite_file(
        &args.document.input,
        &args.output,
        Some(format),
        |raw| args.document.with_locales(raw),
        options,
        |unit| {
            if let Some(locale) = &locale {
                if apply_translations(unit, &translations, locale) {
                    applied += 1;
                }
            }
        },
    )
    .map_err(|e| format!("Error rewriting {}: {}", args.document.input, e))?;

    info!("Applied {} of {} translations", applied, translations.len());
    eprintln!("✅ Wrote {}", args.output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use skelkit::TextContainer;

    #[test]
    fn test_lookup_by_name_then_id() {
        let fr = LocaleId::new("fr");
        let translations = BTreeMap::from([
            ("greeting".to_string(), "Bonjour".to_string()),
            ("7".to_string(), "Sept".to_string()),
        ]);

        let mut named = TextUnit::new("1", TextContainer::from_text("Hello"));
        named.name = Some("greeting".to_string());
        assert!(apply_translations(&mut named, &translations, &fr));
        assert_eq!(named.target(&fr).map(|t| t.text()), Some("Bonjour".to_string()));

        let mut by_id = TextUnit::new("7", TextContainer::from_text("Seven"));
        assert!(apply_translations(&mut by_id, &translations, &fr));

        let mut missing = TextUnit::new("8", TextContainer::from_text("Eight"));
        assert!(!apply_translations(&mut missing, &translations, &fr));
        assert!(!missing.has_target(&fr));
    }
}
