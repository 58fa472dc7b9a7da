//! XML parsing utilities for Office Open XML workbooks
//! Provides an XML reader wrapper and helper traits for attribute and text processing

use crate::error::RustyAskError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::BufRead;
use thiserror::Error;

/// Errors specific to XML parsing operations
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Parse entity '{0}' failed")]
    ParseEntityError(String),
}

/// XML reader wrapper configured for worksheet parsing
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    pub(crate) fn new(buf_reader: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(buf_reader);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        config.expand_empty_elements = true;
        config.trim_text(false);

        let buffer = Vec::with_capacity(1024);
        XmlReader { reader, buffer }
    }

    /// Reads the next XML event, `None` at end of document
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, RustyAskError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer) {
            Ok(Event::Eof) => Ok(None),
            Ok(event) => Ok(Some(event)),
            Err(error) => Err(RustyAskError::XmlError(error)),
        }
    }
}

/// Attribute lookup on start tags
pub(crate) trait XmlNodeHelper<'a> {
    /// Gets the unescaped value of an attribute by qualified name
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, RustyAskError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, RustyAskError> {
        match self.try_get_attribute(name)? {
            Some(attribute) => Ok(Some(attribute.unescape_value()?)),
            None => Ok(None),
        }
    }
}

/// Helper trait for building text content from XML events
pub(crate) trait XmlTextContextHelper {
    /// Appends an entity or character reference
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), RustyAskError>;
}

impl XmlTextContextHelper for String {
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), RustyAskError> {
        let raw = bytes.xml_content()?;
        if let Some(number) = raw.strip_prefix('#') {
            let code = match number.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16)?,
                None => number.parse::<u32>()?,
            };
            if let Some(character) = char::from_u32(code) {
                self.push(character);
            }
        } else if let Some(entity) = resolve_xml_entity(&raw) {
            self.push_str(entity);
        } else {
            Err(XmlError::ParseEntityError(raw.to_string()))?;
        }
        Ok(())
    }
}

/// Loops over the events of an [`XmlReader`], dispatching to the given arms
/// and ignoring everything else.
#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::name::QName;

    fn collect_text(xml: &str) -> String {
        let mut reader = XmlReader::new(xml.as_bytes());
        let mut text = String::new();
        let mut run = || -> Result<(), RustyAskError> {
            match_xml_events!(reader => {
                Event::Text(event) => text.push_str(&event.xml_content()?),
                Event::GeneralRef(event) => text.push_bytes_ref(&event)?,
            });
            Ok(())
        };
        run().unwrap();
        text
    }

    #[test]
    fn resolves_entities_and_character_references() {
        assert_eq!(collect_text("<t>A &amp; B &#65;&#x42;</t>"), "A & B AB");
    }

    #[test]
    fn reads_attributes() {
        let mut reader = XmlReader::new(r#"<c r="B2" t="s"/>"#.as_bytes());
        let mut reference = None;
        let mut run = || -> Result<(), RustyAskError> {
            match_xml_events!(reader => {
                Event::Start(event) if event.name() == QName(b"c") => {
                    reference = event.get_attribute_value("r")?.map(|value| value.to_string());
                }
            });
            Ok(())
        };
        run().unwrap();
        assert_eq!(reference.as_deref(), Some("B2"));
    }
}
