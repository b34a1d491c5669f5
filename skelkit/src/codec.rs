//! One-call helpers that drive a filter and the skeleton writer together.
//!
//! These cover the common pipelines: pick a filter for a format, pull all
//! events of a document, and extract-edit-write in a single pass.

use std::{io::Write, path::Path};

use log::{debug, info};

use crate::{
    error::Error,
    formats::{FormatType, TmxFilter, XmlFilter},
    raw_document::RawDocument,
    resource::{Event, TextUnit},
    traits::Filter,
    writer::{SkeletonWriter, WriterOptions},
};

/// Infers a [`FormatType`] from a file path's extension.
///
/// Returns `Some(FormatType)` if the extension matches a known format, otherwise `None`.
///
/// # Example
/// ```rust
/// use skelkit::formats::FormatType;
/// use skelkit::codec::infer_format_from_extension;
/// assert_eq!(infer_format_from_extension("memory.tmx"), Some(FormatType::Tmx));
/// assert_eq!(infer_format_from_extension("doc.XML"), Some(FormatType::Xml));
/// assert_eq!(infer_format_from_extension("notes.txt"), None);
/// ```
pub fn infer_format_from_extension<P: AsRef<Path>>(path: P) -> Option<FormatType> {
    let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "tmx" => Some(FormatType::Tmx),
        "xml" => Some(FormatType::Xml),
        _ => None,
    }
}

/// A filter with default parameters for `format`.
pub fn filter_for(format: FormatType) -> Box<dyn Filter> {
    match format {
        FormatType::Tmx => Box::new(TmxFilter::new()),
        FormatType::Xml => Box::new(XmlFilter::new()),
    }
}

/// Opens `document` and collects every event, including the final one.
pub fn extract(filter: &mut dyn Filter, document: RawDocument) -> Result<Vec<Event>, Error> {
    filter.open(document)?;
    let mut events = Vec::new();
    while filter.has_next() {
        events.push(filter.next()?);
    }
    filter.close();
    debug!("Extracted {} events with the {} filter", events.len(), filter.name());
    Ok(events)
}

/// Writes already extracted events.
pub fn write_events<W: Write>(
    events: &[Event],
    options: WriterOptions,
    sink: &mut W,
) -> Result<(), Error> {
    let mut writer = SkeletonWriter::new(options);
    for event in events {
        writer.write_event(event, sink)?;
    }
    writer.flush(sink)
}

/// Extracts, edits and writes a document in one pass.
///
/// `edit` is called on every text unit before it is written.
///
/// # Example
/// ```rust
/// use skelkit::{LocaleId, RawDocument, TextFragment, WriterOptions, codec::rewrite, formats::TmxFilter};
///
/// let input = r#"<tmx><body><tu><tuv xml:lang="en"><seg>Hi</seg></tuv><tuv xml:lang="fr"><seg>Salut</seg></tuv></tu></body></tmx>"#;
/// let fr = LocaleId::new("fr");
/// let mut out = Vec::new();
/// rewrite(
///     &mut TmxFilter::new(),
///     RawDocument::from_text(input).with_source_locale("en").with_target_locale("fr"),
///     WriterOptions::new(),
///     &mut out,
///     |unit| unit.set_target_content(&fr, TextFragment::from_text("Bonjour")),
/// )?;
/// assert!(String::from_utf8(out).unwrap().contains("<seg>Bonjour</seg>"));
/// # Ok::<(), skelkit::Error>(())
/// ```
pub fn rewrite<W, F>(
    filter: &mut dyn Filter,
    document: RawDocument,
    options: WriterOptions,
    sink: &mut W,
    mut edit: F,
) -> Result<(), Error>
where
    W: Write,
    F: FnMut(&mut TextUnit),
{
    let mut writer = SkeletonWriter::new(options);
    filter.open(document)?;
    while filter.has_next() {
        let mut event = filter.next()?;
        if let Some(unit) = event.as_text_unit_mut() {
            edit(unit);
        }
        if matches!(event, Event::Cancelled) {
            info!("{} filter was cancelled; output is incomplete", filter.name());
        }
        writer.write_event(&event, sink)?;
    }
    filter.close();
    writer.flush(sink)?;
    sink.flush()?;
    Ok(())
}

/// Extracts and writes back without changes.
pub fn roundtrip(
    filter: &mut dyn Filter,
    document: RawDocument,
    options: WriterOptions,
) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    rewrite(filter, document, options, &mut out, |_| {})?;
    Ok(out)
}

/// [`rewrite`] between files, inferring the format from the input
/// extension when `format` is `None`.
pub fn rewrite_file<P, Q, F>(
    input: P,
    output: Q,
    format: Option<FormatType>,
    document: impl FnOnce(RawDocument) -> RawDocument,
    options: WriterOptions,
    edit: F,
) -> Result<(), Error>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    F: FnMut(&mut TextUnit),
{
    let format = match format {
        Some(format) => format,
        None => infer_format_from_extension(&input).ok_or_else(|| {
            Error::UnknownFormat(format!(
                "Cannot infer input format from extension: {:?}",
                input.as_ref().extension()
            ))
        })?,
    };
    let raw = document(RawDocument::from_path(&input)?);
    let mut filter = filter_for(format);
    // render to memory first so a failing parse never truncates the output
    let mut out = Vec::new();
    rewrite(filter.as_mut(), raw, options, &mut out, edit)?;
    std::fs::write(output, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{locale::LocaleId, traits::FilterState};

    const TMX: &str = "<tmx version=\"1.4\"><header srclang=\"en\"/><body>\n<tu><tuv xml:lang=\"en\"><seg>Hi</seg></tuv></tu>\n</body></tmx>";

    fn tmx_document() -> RawDocument {
        RawDocument::from_text(TMX)
            .with_source_locale("en")
            .with_target_locale("fr")
    }

    #[test]
    fn test_filter_for_each_format() {
        assert_eq!(filter_for(FormatType::Tmx).name(), "tmx");
        assert_eq!(filter_for(FormatType::Xml).name(), "xml");
    }

    #[test]
    fn test_extract_collects_until_ending() {
        let mut filter = TmxFilter::new();
        let events = extract(&mut filter, tmx_document()).unwrap();
        assert!(matches!(events.first(), Some(Event::StartDocument(_))));
        assert!(matches!(events.last(), Some(Event::Ending(_))));
        assert_eq!(events.iter().filter(|e| e.as_text_unit().is_some()).count(), 1);
        assert_eq!(filter.state(), FilterState::Finished);
    }

    #[test]
    fn test_roundtrip_and_write_events_agree() {
        let mut filter = TmxFilter::new();
        let direct = roundtrip(&mut filter, tmx_document(), WriterOptions::new()).unwrap();
        assert_eq!(String::from_utf8(direct.clone()).unwrap(), TMX);

        let events = extract(&mut filter, tmx_document()).unwrap();
        let mut written = Vec::new();
        write_events(&events, WriterOptions::new(), &mut written).unwrap();
        assert_eq!(written, direct);
    }

    #[test]
    fn test_rewrite_file_infers_format() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("memory.tmx");
        let output = dir.path().join("out.tmx");
        std::fs::write(&input, TMX).unwrap();

        let fr = LocaleId::new("fr");
        rewrite_file(
            &input,
            &output,
            None,
            |doc| doc.with_source_locale("en").with_target_locale("fr"),
            WriterOptions::new(),
            |unit| unit.set_target_content(&fr, "Salut".into()),
        )
        .unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.contains("<tuv xml:lang=\"fr\"><seg>Salut</seg></tuv>"));
    }

    #[test]
    fn test_rewrite_file_rejects_unknown_extension() {
        let result = rewrite_file(
            "notes.txt",
            "out.txt",
            None,
            |doc| doc,
            WriterOptions::new(),
            |_| {},
        );
        assert!(matches!(result, Err(Error::UnknownFormat(_))));
    }
}
