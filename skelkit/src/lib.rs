#![forbid(unsafe_code)]
//! Format-preserving document filters for Rust.
//!
//! A filter turns a document into a stream of events: translatable text
//! units, plus skeletons holding every other byte of the input. The
//! skeleton writer puts the two back together, so an unmodified document
//! comes out byte for byte and an edited one changes only where its text
//! changed.
//!
//! # Quick Start
//!
//! ```rust
//! use skelkit::{Event, Filter, LocaleId, RawDocument, SkeletonWriter, WriterOptions, formats::TmxFilter};
//!
//! let input = r#"<tmx version="1.4"><body><tu><tuv xml:lang="en"><seg>Hello</seg></tuv><tuv xml:lang="fr"><seg>Salut</seg></tuv></tu></body></tmx>"#;
//! let fr = LocaleId::new("fr");
//!
//! let mut filter = TmxFilter::new();
//! filter.open(RawDocument::from_text(input).with_source_locale("en").with_target_locale("fr"))?;
//!
//! let mut writer = SkeletonWriter::new(WriterOptions::new());
//! let mut out = Vec::new();
//! while filter.has_next() {
//!     let mut event = filter.next()?;
//!     if let Event::TextUnit(unit) = &mut event {
//!         unit.set_target_content(&fr, "Bonjour".into());
//!     }
//!     writer.write_event(&event, &mut out)?;
//! }
//! assert_eq!(
//!     String::from_utf8(out).unwrap(),
//!     input.replace("Salut", "Bonjour")
//! );
//! # Ok::<(), skelkit::Error>(())
//! ```
//!
//! # Supported Formats
//!
//! - **TMX**: translation memories, with source and targets side by side
//! - **XML**: generic monolingual markup driven by element rules

pub mod code;
pub mod codec;
pub mod container;
pub mod detector;
pub mod encoder;
pub mod error;
pub mod formats;
pub mod fragment;
pub mod locale;
pub mod raw_document;
pub mod resource;
pub mod rules;
pub mod skeleton;
pub mod traits;
pub mod writer;

// Re-export most used types for easy consumption
pub use crate::{
    code::{Code, TagType},
    codec::{extract, filter_for, infer_format_from_extension, rewrite, roundtrip},
    container::{AlignmentStatus, TextContainer},
    detector::{BomNewlineDetector, LineBreak},
    encoder::XmlEncoder,
    error::Error,
    formats::{FormatType, TmxFilter, TmxParameters, XmlFilter, XmlParameters},
    fragment::TextFragment,
    locale::LocaleId,
    raw_document::RawDocument,
    resource::{DocumentPart, Ending, Event, PropertySource, StartDocument, TextUnit},
    rules::{ElementRules, LocaleFilter, RuleOracle},
    skeleton::{Placeholder, Skeleton},
    traits::{CancelHandle, Filter, FilterState},
    writer::{SkeletonWriter, WriterOptions},
};
