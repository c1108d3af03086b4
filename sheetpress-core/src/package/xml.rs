//! Owned XML event sequences with filter/map rebuilding
//!
//! A mutated part is never edited in place. Every edit produces a new [`XmlPart`] from the
//! previous one, and everything the edit does not name is written back as it was read.

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Error, Result};

/// What to do with one element while rebuilding a part
pub enum ElementEdit {
    Keep,
    /// Drop the element together with its whole subtree
    Drop,
    /// Swap the start tag (attributes) and keep the subtree
    Replace(BytesStart<'static>),
}

#[derive(Debug, Clone)]
pub struct XmlPart {
    name: String,
    events: Vec<Event<'static>>,
}

impl XmlPart {
    pub fn parse(name: &str, bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(bytes);
        let mut buf = Vec::new();
        let mut events = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Eof) => break,
                Ok(event) => events.push(event.into_owned()),
                Err(e) => {
                    return Err(Error::corrupt(
                        name,
                        format!("XML error at position {}: {}", reader.error_position(), e),
                    ));
                }
            }
            buf.clear();
        }

        Ok(Self {
            name: name.to_string(),
            events,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start tags (including self-closing ones) whose local name is `local`, in document order
    pub fn elements<'a>(&'a self, local: &'a [u8]) -> impl Iterator<Item = &'a BytesStart<'static>> {
        self.events.iter().filter_map(move |event| match event {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == local => Some(e),
            _ => None,
        })
    }

    /// Build a new part by deciding, for each element named `local`, whether to keep,
    /// drop or replace it
    pub fn rebuild<F>(&self, local: &[u8], mut edit: F) -> Result<XmlPart>
    where
        F: FnMut(&BytesStart<'static>) -> Result<ElementEdit>,
    {
        let mut events: Vec<Event<'static>> = Vec::with_capacity(self.events.len());
        let mut skip_depth = 0usize;

        for event in &self.events {
            if skip_depth > 0 {
                match event {
                    Event::Start(_) => skip_depth += 1,
                    Event::End(_) => skip_depth -= 1,
                    _ => {}
                }
                continue;
            }

            match event {
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == local => {
                    let is_empty = matches!(event, Event::Empty(_));
                    match edit(e)? {
                        ElementEdit::Keep => events.push(event.clone()),
                        ElementEdit::Drop => {
                            drop_trailing_whitespace(&mut events);
                            if !is_empty {
                                skip_depth = 1;
                            }
                        }
                        ElementEdit::Replace(start) => {
                            events.push(if is_empty {
                                Event::Empty(start)
                            } else {
                                Event::Start(start)
                            });
                        }
                    }
                }
                other => events.push(other.clone()),
            }
        }

        Ok(XmlPart {
            name: self.name.clone(),
            events,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        for event in &self.events {
            writer
                .write_event(event.clone())
                .map_err(|e| Error::corrupt(&self.name, e))?;
        }
        Ok(writer.into_inner())
    }
}

// Indentation in front of a dropped element would otherwise pile up as blank lines.
fn drop_trailing_whitespace(events: &mut Vec<Event<'static>>) {
    if let Some(Event::Text(text)) = events.last() {
        if text.iter().all(|b| b.is_ascii_whitespace()) {
            events.pop();
        }
    }
}

/// Unescaped value of the unprefixed attribute `key`
pub fn attr(element: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    find_attr(element, |a| a.key.prefix().is_none() && a.key.local_name().as_ref() == key)
}

/// Unescaped value of a namespace-prefixed attribute with local name `key` (e.g. `r:id`)
pub fn prefixed_attr(element: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    find_attr(element, |a| a.key.prefix().is_some() && a.key.local_name().as_ref() == key)
}

fn find_attr<F>(element: &BytesStart, matches: F) -> Result<Option<String>>
where
    F: Fn(&Attribute) -> bool,
{
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| Error::corrupt(&element_name(element), e))?;
        if matches(&attribute) {
            let value = attribute
                .unescape_value()
                .map_err(|e| Error::corrupt(&element_name(element), e))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Copy of `element` with the unprefixed attribute `key` set to `value`
///
/// Other attributes keep their order and their original escaping. The attribute is
/// appended when absent.
pub fn with_attr(element: &BytesStart, key: &str, value: &str) -> Result<BytesStart<'static>> {
    let name = element_name(element);
    let mut out = BytesStart::new(name.clone());
    let mut replaced = false;

    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| Error::corrupt(&name, e))?;
        if attribute.key.prefix().is_none() && attribute.key.local_name().as_ref() == key.as_bytes() {
            out.push_attribute((key, value));
            replaced = true;
        } else if attribute.value.contains(&b'"') {
            // single-quoted source value; re-escape for the double quotes we write
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let unescaped = attribute
                .unescape_value()
                .map_err(|e| Error::corrupt(&name, e))?
                .into_owned();
            out.push_attribute((key.as_str(), unescaped.as_str()));
        } else {
            out.push_attribute(attribute);
        }
    }

    if !replaced {
        out.push_attribute((key, value));
    }
    Ok(out)
}

fn element_name(element: &BytesStart) -> String {
    String::from_utf8_lossy(element.name().as_ref()).into_owned()
}
