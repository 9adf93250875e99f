//! XML document model
//!
//! A parsed source document held as a small owned element tree. The parser
//! walks this tree record by record, so the whole document is read once and
//! each record subtree can be visited in document order.

use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use sha2::{Digest, Sha512};

use crate::error::DocumentError;

/// Namespace-qualified name of the XML language attribute
pub const XML_LANG: &str = "xml:lang";

/// One XML element with its attributes, text and children
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<Element>,
    position: u64,
}

impl Element {
    /// Create an element with the given tag name
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// Builder: add an attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Builder: set the text content
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Builder: append a child element
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Qualified tag name as written in the document
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Byte offset of the element's start tag in the source
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Attribute value by qualified name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Attribute value, treating an empty or blank value as absent
    pub fn attr_non_empty(&self, name: &str) -> Option<&str> {
        self.attr(name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// The element's own `xml:lang`
    pub fn lang(&self) -> Option<&str> {
        self.attr_non_empty(XML_LANG)
    }

    /// All attributes in document order
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Text content, `None` when absent or blank
    pub fn text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    /// Child elements in document order
    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// First child with the given tag
    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.tag == tag)
    }

    /// All children with the given tag
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.tag == tag)
    }

    /// Text of the first child with the given tag
    pub fn child_text(&self, tag: &str) -> Option<&str> {
        self.child(tag).and_then(Element::text)
    }

    fn push_text(&mut self, text: &str) {
        match &mut self.text {
            Some(existing) => existing.push_str(text),
            None => self.text = Some(text.to_string()),
        }
    }
}

/// A whole source document
#[derive(Debug, Clone)]
pub struct Document {
    root: Element,
    sha512: String,
}

impl Document {
    /// Parse XML text into a document tree
    pub fn parse(xml: &str) -> Result<Self, DocumentError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let position = reader.buffer_position() as u64;
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    stack.push(element_from_start(e, position)?);
                }
                Ok(Event::Empty(ref e)) => {
                    let element = element_from_start(e, position)?;
                    attach(&mut stack, &mut root, element, position)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack.pop().ok_or_else(|| DocumentError::Malformed {
                        position,
                        message: "closing tag without opening tag".to_string(),
                    })?;
                    attach(&mut stack, &mut root, element, position)?;
                }
                Ok(Event::Text(e)) => {
                    if let Some(current) = stack.last_mut() {
                        let text = e.unescape().map_err(|err| DocumentError::Malformed {
                            position,
                            message: err.to_string(),
                        })?;
                        current.push_text(&text);
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(current) = stack.last_mut() {
                        current.push_text(&String::from_utf8_lossy(&e));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(DocumentError::Malformed {
                        position: reader.error_position() as u64,
                        message: e.to_string(),
                    });
                }
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(DocumentError::Malformed {
                position: open.position,
                message: format!("element '{}' is never closed", open.tag),
            });
        }

        let root = root.ok_or(DocumentError::MissingRoot)?;
        let sha512 = format!("{:x}", Sha512::digest(xml.as_bytes()));

        Ok(Self { root, sha512 })
    }

    /// Read and parse a document from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Build a document around an already constructed tree
    pub fn from_root(root: Element) -> Self {
        Self {
            root,
            sha512: String::new(),
        }
    }

    /// The document root element
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Schema version declared on the root element
    pub fn version(&self) -> Option<&str> {
        self.root.attr_non_empty("version")
    }

    /// Hex SHA-512 of the raw document text (empty for trees built in memory)
    pub fn sha512(&self) -> &str {
        &self.sha512
    }

    /// Record root elements with the given tag, in document order
    pub fn records<'a>(&'a self, record_tag: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.root.children_named(record_tag)
    }
}

fn element_from_start(e: &BytesStart<'_>, position: u64) -> Result<Element, DocumentError> {
    let mut element = Element::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    element.position = position;

    for attr in e.attributes() {
        let attr = attr.map_err(|err| DocumentError::Malformed {
            position,
            message: err.to_string(),
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| DocumentError::Malformed {
                position,
                message: err.to_string(),
            })?
            .into_owned();
        element.attributes.push((key, value));
    }

    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
    position: u64,
) -> Result<(), DocumentError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(DocumentError::Malformed {
            position,
            message: format!("second root element '{}'", element.tag),
        });
    }
    *root = Some(element);
    Ok(())
}
