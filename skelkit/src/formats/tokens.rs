//! Owned XML tokens that remember their exact source markup.
//!
//! Filters never re-serialize structural markup: every token carries the
//! bytes of the decoded input it was read from, so skeletons reproduce
//! attribute quoting, entity spelling and empty-element syntax as written.
//! The input is streamed; only the markup of the current token is held.

use std::io::{self, BufRead, Read};

use log::warn;
use quick_xml::{Reader, events::BytesStart, events::Event as XmlEvent};

use crate::error::Error;

/// Keeps every byte the parser consumes until a token claims it.
struct Recording {
    inner: Box<dyn BufRead + Send>,
    consumed: Vec<u8>,
}

impl Recording {
    /// Takes the recorded markup. With `hold_last` the final byte stays
    /// behind: it is the `<` the parser read past the end of a text run.
    fn take(&mut self, hold_last: bool) -> Result<String, Error> {
        let held = if hold_last { self.consumed.pop() } else { None };
        let raw = std::mem::take(&mut self.consumed);
        self.consumed.extend(held);
        String::from_utf8(raw)
            .map_err(|e| Error::invalid_state(format!("token ends inside a character: {}", e)))
    }
}

impl Read for Recording {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for Recording {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        // A non-empty buffer is returned again without reading.
        let available: &[u8] = if amt > 0 {
            self.inner.fill_buf().unwrap_or_default()
        } else {
            &[]
        };
        let n = amt.min(available.len());
        self.consumed.extend_from_slice(&available[..n]);
        self.inner.consume(amt);
    }
}

/// A start, empty or end tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub raw: String,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Element name without prefix, lower-cased.
    pub fn local_name(&self) -> String {
        let name = self.name.rsplit(':').next().unwrap_or(&self.name);
        name.to_ascii_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Declaration(String),
    Start(Element),
    Empty(Element),
    End(Element),
    /// Character data; `text` is unescaped.
    Text { raw: String, text: String },
    CData { raw: String, text: String },
    Comment(String),
    Instruction(String),
    DocType(String),
    Eof,
}

impl Token {
    /// The markup exactly as it appeared in the input.
    pub fn raw(&self) -> &str {
        match self {
            Token::Declaration(raw)
            | Token::Comment(raw)
            | Token::Instruction(raw)
            | Token::DocType(raw) => raw,
            Token::Start(e) | Token::Empty(e) | Token::End(e) => &e.raw,
            Token::Text { raw, .. } | Token::CData { raw, .. } => raw,
            Token::Eof => "",
        }
    }
}

/// Pull tokenizer over a stream of UTF-8.
pub struct Tokenizer {
    reader: Reader<Recording>,
    buf: Vec<u8>,
    peeked: Option<Token>,
}

impl Tokenizer {
    pub fn new(input: impl BufRead + Send + 'static) -> Self {
        let mut reader = Reader::from_reader(Recording {
            inner: Box::new(input),
            consumed: Vec::new(),
        });
        let config = reader.config_mut();
        config.trim_text(false);
        config.expand_empty_elements = false;
        config.check_end_names = true;
        Tokenizer {
            reader,
            buf: Vec::new(),
            peeked: None,
        }
    }

    pub fn next_token(&mut self) -> Result<Token, Error> {
        if let Some(token) = self.peeked.take() {
            return Ok(token);
        }
        self.buf.clear();
        let event = self.reader.read_event_into(&mut self.buf)?;
        let recording = self.reader.get_mut();
        let ends_at_markup =
            matches!(event, XmlEvent::Text(_)) && recording.consumed.last() == Some(&b'<');
        let raw = recording.take(ends_at_markup)?;

        let token = match event {
            XmlEvent::Decl(_) => Token::Declaration(raw),
            XmlEvent::Start(ref e) => Token::Start(element(e, raw)?),
            XmlEvent::Empty(ref e) => Token::Empty(element(e, raw)?),
            XmlEvent::End(ref e) => Token::End(Element {
                name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                attributes: Vec::new(),
                raw,
            }),
            XmlEvent::Text(ref e) => {
                let text = match e.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(err) => {
                        warn!("Keeping undecodable character data as-is: {}", err);
                        raw.clone()
                    }
                };
                Token::Text { raw, text }
            }
            XmlEvent::CData(ref e) => Token::CData {
                text: String::from_utf8_lossy(e).into_owned(),
                raw,
            },
            XmlEvent::Comment(_) => Token::Comment(raw),
            XmlEvent::PI(_) => Token::Instruction(raw),
            XmlEvent::DocType(_) => Token::DocType(raw),
            XmlEvent::Eof => Token::Eof,
        };
        Ok(token)
    }

    pub fn peek(&mut self) -> Result<&Token, Error> {
        if self.peeked.is_none() {
            let token = self.next_token()?;
            self.peeked = Some(token);
        }
        match &self.peeked {
            Some(token) => Ok(token),
            None => Err(Error::invalid_state("tokenizer lost its lookahead")),
        }
    }
}

fn element(start: &BytesStart<'_>, raw: String) -> Result<Element, Error> {
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = match attribute.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attribute.value).into_owned(),
        };
        attributes.push((key, value));
    }
    Ok(Element {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        attributes,
        raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor};

    fn tokenizer(input: &str) -> Tokenizer {
        Tokenizer::new(Cursor::new(input.to_string()))
    }

    fn tokens(input: &str) -> Vec<Token> {
        let mut tokenizer = tokenizer(input);
        let mut out = Vec::new();
        loop {
            let token = tokenizer.next_token().unwrap();
            if token == Token::Eof {
                break;
            }
            out.push(token);
        }
        out
    }

    #[test]
    fn test_raw_markup_concatenates_to_input() {
        let input = "<?xml version='1.0'?>\n<!-- c --><a  x = 'y' >t &amp; u<b/><![CDATA[<z>]]></a >\n<?pi data?>";
        let joined: String = tokens(input).iter().map(|t| t.raw().to_string()).collect();
        assert_eq!(joined, input);
    }

    #[test]
    fn test_text_is_unescaped() {
        let all = tokens("<a>x &lt; y &#233;</a>");
        assert_eq!(
            all[1],
            Token::Text {
                raw: "x &lt; y &#233;".into(),
                text: "x < y \u{e9}".into()
            }
        );
    }

    #[test]
    fn test_attributes_are_parsed() {
        let all = tokens(r#"<tuv xml:lang="fr-CA" a="1 &amp; 2"/>"#);
        let Token::Empty(element) = &all[0] else {
            panic!("expected an empty element");
        };
        assert_eq!(element.attribute("xml:lang"), Some("fr-CA"));
        assert_eq!(element.attribute("a"), Some("1 & 2"));
        assert_eq!(element.local_name(), "tuv");
    }

    #[test]
    fn test_mismatched_end_tag_is_an_error() {
        let mut tokenizer = tokenizer("<a></b>");
        tokenizer.next_token().unwrap();
        assert!(matches!(tokenizer.next_token(), Err(Error::XmlParse(_))));
    }

    #[test]
    fn test_peek_then_next_returns_the_same_token() {
        let mut tokenizer = tokenizer("<a/>text");
        assert!(matches!(tokenizer.peek().unwrap(), Token::Empty(_)));
        assert!(matches!(tokenizer.next_token().unwrap(), Token::Empty(_)));
        assert_eq!(
            tokenizer.next_token().unwrap(),
            Token::Text {
                raw: "text".into(),
                text: "text".into()
            }
        );
        assert_eq!(tokenizer.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn test_raw_markup_survives_tiny_reads() {
        let input = "<root a=\"\u{e9}t\u{e9}\">caf\u{e9} &amp; th\u{e9}<!-- \u{2603} --><b/></root>";
        let mut tokenizer = Tokenizer::new(BufReader::with_capacity(1, Cursor::new(input.to_string())));
        let mut joined = String::new();
        loop {
            let token = tokenizer.next_token().unwrap();
            if token == Token::Eof {
                break;
            }
            joined.push_str(token.raw());
        }
        assert_eq!(joined, input);
    }
}
