//! Event-driven XML reading into a generic tagged value
//!
//! PubMed batch documents are too irregular for a fixed struct model: most
//! substructures are optional, several appear as either a single element or
//! a repeated list, and a few carry attributes alongside text. The reader
//! therefore produces `serde_json::Value` trees with uniform conventions
//! that the extractors can branch on.

use crate::{Error, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::{Map, Value};

use super::extractors::{as_list, pluck};

/// One element being assembled while its subtree is read
struct ElementFrame {
    name: String,
    attributes: Map<String, Value>,
    children: Vec<(String, Value)>,
    text: String,
}

impl ElementFrame {
    fn new(name: String, attributes: Map<String, Value>) -> Self {
        Self {
            name,
            attributes,
            children: Vec::new(),
            text: String::new(),
        }
    }

    /// Collapse the finished frame into its tagged value
    fn finish(self) -> Value {
        let text = self.text.trim();

        if self.attributes.is_empty() && self.children.is_empty() {
            return if text.is_empty() {
                Value::Null
            } else {
                Value::String(text.to_string())
            };
        }

        let mut object = self.attributes;
        for (name, child) in self.children {
            match object.get_mut(&name) {
                // Repeated sibling elements collapse into an array
                Some(Value::Array(items)) => items.push(child),
                Some(existing) => {
                    let first = existing.take();
                    object.insert(name, Value::Array(vec![first, child]));
                }
                None => {
                    object.insert(name, child);
                }
            }
        }

        if !text.is_empty() {
            object.insert("#text".to_string(), Value::String(text.to_string()));
        }

        Value::Object(object)
    }
}

/// Parse one citation batch document into its tagged value.
///
/// The returned value is an object keyed by the root element name, so
/// navigation starts at `document["PubmedArticleSet"]` just like the rest
/// of the pipeline expects.
pub fn parse_document(xml: &str, file: &str) -> Result<Value> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);

    let mut stack: Vec<ElementFrame> = Vec::new();
    let mut root: Option<(String, Value)> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                stack.push(ElementFrame::new(name, read_attributes(e, file)?));
            }
            Ok(Event::Empty(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let frame = ElementFrame::new(name.clone(), read_attributes(e, file)?);
                attach(&mut stack, &mut root, name, frame.finish(), file)?;
            }
            Ok(Event::Text(ref e)) => {
                if let Some(frame) = stack.last_mut() {
                    let text = e
                        .unescape()
                        .map_err(|err| Error::xml_format(file, err.to_string()))?;
                    frame.text.push_str(&text);
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::End(_)) => {
                let frame = stack.pop().ok_or_else(|| {
                    Error::xml_format(file, "unbalanced closing element")
                })?;
                let name = frame.name.clone();
                attach(&mut stack, &mut root, name, frame.finish(), file)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(Error::xml_format(file, e.to_string())),
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(Error::xml_format(file, "document ended inside an element"));
    }

    let (name, value) = root.ok_or_else(|| Error::xml_format(file, "document has no root element"))?;

    let mut document = Map::new();
    document.insert(name, value);
    Ok(Value::Object(document))
}

/// Attach a finished element to its parent frame, or install it as the root
fn attach(
    stack: &mut [ElementFrame],
    root: &mut Option<(String, Value)>,
    name: String,
    value: Value,
    file: &str,
) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push((name, value));
        return Ok(());
    }

    if root.is_some() {
        return Err(Error::xml_format(file, "document has more than one root element"));
    }
    *root = Some((name, value));
    Ok(())
}

/// Read element attributes into `"@name"` keys
fn read_attributes(element: &quick_xml::events::BytesStart<'_>, file: &str) -> Result<Map<String, Value>> {
    let mut attributes = Map::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| Error::xml_format(file, e.to_string()))?;
        let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
        let value = attr
            .unescape_value()
            .map_err(|e| Error::xml_format(file, e.to_string()))?;
        attributes.insert(key, Value::String(value.into_owned()));
    }
    Ok(attributes)
}

/// Extract the citation records of a parsed batch document.
///
/// A single-article batch yields a one-element list; an empty article set
/// yields an empty list rather than an error.
pub fn citation_records<'a>(document: &'a Value, file: &str) -> Result<Vec<&'a Value>> {
    let article_set = pluck(Some(document), "PubmedArticleSet")
        .ok_or_else(|| Error::xml_format(file, "document has no PubmedArticleSet element"))?;

    Ok(as_list(pluck(Some(article_set), "PubmedArticle")))
}
