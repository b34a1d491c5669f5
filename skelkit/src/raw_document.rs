//! Input documents handed to filters.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, Chain, Cursor, Read},
    path::Path,
};

use encoding_rs::{Decoder, DecoderResult, Encoding};

use crate::{
    detector::{BomNewlineDetector, LineBreak},
    error::{Error, MalformedInput},
    locale::LocaleId,
};

const CHUNK: usize = 8 * 1024;

/// The decoded text of an opened document.
pub type DocumentReader = DecodeReader<Chain<Cursor<Vec<u8>>, Box<dyn Read + Send>>>;

/// A byte source plus the metadata a filter needs to open it.
///
/// # Example
///
/// ```rust
/// use skelkit::RawDocument;
/// let doc = RawDocument::from_text("<tmx/>")
///     .with_source_locale("en")
///     .with_target_locale("fr");
/// assert_eq!(doc.source_locale.as_ref().map(|l| l.as_str()), Some("en"));
/// ```
pub struct RawDocument {
    input: Box<dyn Read + Send>,
    pub source_locale: Option<LocaleId>,
    pub target_locale: Option<LocaleId>,
    /// Encoding to assume when neither a byte-order mark nor a declaration says otherwise.
    pub encoding: Option<String>,
    pub name: Option<String>,
}

impl std::fmt::Debug for RawDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawDocument")
            .field("source_locale", &self.source_locale)
            .field("target_locale", &self.target_locale)
            .field("encoding", &self.encoding)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl RawDocument {
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        RawDocument {
            input: Box::new(reader),
            source_locale: None,
            target_locale: None,
            encoding: None,
            name: None,
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::from_reader(Cursor::new(bytes.into()))
    }

    pub fn from_text(text: &str) -> Self {
        Self::from_bytes(text.as_bytes().to_vec())
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path).map_err(Error::Io)?;
        Ok(Self::from_reader(BufReader::new(file))
            .with_name(path.to_string_lossy().into_owned()))
    }

    pub fn with_source_locale(mut self, locale: impl Into<LocaleId>) -> Self {
        self.source_locale = Some(locale.into());
        self
    }

    pub fn with_target_locale(mut self, locale: impl Into<LocaleId>) -> Self {
        self.target_locale = Some(locale.into());
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Runs detection and returns the document's metadata together with a
    /// reader that decodes the rest of the input to UTF-8 on demand.
    pub fn decode(self) -> Result<(DecodedDocument, DocumentReader), Error> {
        let detection = BomNewlineDetector::detect(self.input, self.encoding.as_deref())?;
        let reader = DecodeReader::new(detection.reader, detection.encoding)
            .starting_at(detection.bom_len as u64);
        let document = DecodedDocument {
            encoding: detection.encoding,
            has_bom: detection.has_bom,
            line_break: detection.line_break,
            source_locale: self.source_locale,
            target_locale: self.target_locale,
            name: self.name,
        };
        Ok((document, reader))
    }
}

/// What detection learned about a document.
#[derive(Debug, Clone)]
pub struct DecodedDocument {
    pub encoding: &'static Encoding,
    pub has_bom: bool,
    pub line_break: LineBreak,
    pub source_locale: Option<LocaleId>,
    pub target_locale: Option<LocaleId>,
    pub name: Option<String>,
}

/// Streams bytes of a known encoding out as UTF-8.
///
/// Unlike a replacing decoder this stops at the first malformed sequence:
/// the read fails with an [`io::ErrorKind::InvalidData`] error wrapping
/// [`MalformedInput`], and every later read fails the same way.
pub struct DecodeReader<R> {
    source: R,
    decoder: Decoder,
    encoding: &'static Encoding,
    input: Vec<u8>,
    input_pos: usize,
    input_len: usize,
    output: Vec<u8>,
    output_pos: usize,
    output_len: usize,
    /// Offset in the original input of the next byte handed to the decoder.
    offset: u64,
    eof: bool,
    failure: Option<MalformedInput>,
}

impl<R: Read> DecodeReader<R> {
    /// The input must already be past any byte-order mark.
    pub fn new(source: R, encoding: &'static Encoding) -> Self {
        DecodeReader {
            source,
            decoder: encoding.new_decoder_without_bom_handling(),
            encoding,
            input: vec![0; CHUNK],
            input_pos: 0,
            input_len: 0,
            output: vec![0; CHUNK * 2],
            output_pos: 0,
            output_len: 0,
            offset: 0,
            eof: false,
            failure: None,
        }
    }

    /// Offsets reported for malformed input start counting at `offset`.
    pub fn starting_at(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    fn refill(&mut self) -> io::Result<()> {
        while self.output_pos == self.output_len {
            if let Some(failure) = &self.failure {
                return Err(io::Error::new(io::ErrorKind::InvalidData, failure.clone()));
            }
            if self.input_pos == self.input_len {
                if self.eof {
                    return Ok(());
                }
                self.input_len = loop {
                    match self.source.read(&mut self.input) {
                        Ok(n) => break n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e),
                    }
                };
                self.input_pos = 0;
                self.eof = self.input_len == 0;
            }

            let (result, read, written) = self.decoder.decode_to_utf8_without_replacement(
                &self.input[self.input_pos..self.input_len],
                &mut self.output,
                self.eof,
            );
            self.input_pos += read;
            self.offset += read as u64;
            self.output_pos = 0;
            self.output_len = written;

            if let DecoderResult::Malformed(bad, extra) = result {
                let offset = self.offset.saturating_sub(u64::from(bad) + u64::from(extra));
                // text decoded before the bad sequence is still handed out
                self.failure = Some(MalformedInput {
                    encoding: self.encoding.name(),
                    offset,
                });
            }
        }
        Ok(())
    }
}

impl<R: Read> BufRead for DecodeReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.refill()?;
        Ok(&self.output[self.output_pos..self.output_len])
    }

    fn consume(&mut self, amt: usize) {
        self.output_pos = (self.output_pos + amt).min(self.output_len);
    }
}

impl<R: Read> Read for DecodeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R> std::fmt::Debug for DecodeReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeReader")
            .field("encoding", &self.encoding.name())
            .field("offset", &self.offset)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}
