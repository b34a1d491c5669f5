use skelkit::{Event, TextContainer, TextUnit};

use crate::DocumentArgs;

const PREVIEW_CHARS: usize = 50;

fn preview(container: &TextContainer, full: bool) -> String {
    let text = container.text();
    if full || text.chars().count() <= PREVIEW_CHARS {
        text
    } else {
        let truncated: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", truncated)
    }
}

fn print_unit(index: usize, unit: &TextUnit, full: bool) {
    println!("\n  Unit {}: {}", index + 1, unit.id);
    if let Some(name) = &unit.name {
        println!("    Name: {}", name);
    }
    println!("    Source: {}", preview(&unit.source, full));
    for locale in unit.target_locales() {
        if let Some(target) = unit.target(locale) {
            println!("    Target ({}): {}", locale, preview(target, full));
        }
    }
    for (key, value) in &unit.properties {
        println!("    {}: {}", key, value);
    }
}

/// Print the text units of a document.
pub fn print_view(document: &DocumentArgs, full: bool) -> Result<(), String> {
    let events = document.extract()?;

    let Some(Event::StartDocument(start)) = events.first() else {
        return Err(format!("No document found in {}", document.input));
    };
    println!("=== {} ===", document.input);
    println!("Format: {}", start.mime_type);
    println!("Encoding: {}", start.encoding);
    println!("Byte-order mark: {}", if start.has_bom { "yes" } else { "no" });
    println!("Line break: {:?}", start.line_break);
    for (key, value) in &start.properties {
        println!("{}: {}", key, value);
    }

    let units: Vec<&TextUnit> = events.iter().filter_map(Event::as_text_unit).collect();
    println!("Units: {}", units.len());
    for (index, unit) in units.iter().enumerate() {
        print_unit(index, unit, full);
    }
    Ok(())
}
