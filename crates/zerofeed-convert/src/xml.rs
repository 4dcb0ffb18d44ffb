//! A small owned XML element tree.
//!
//! Feeds are built, rewritten and partially reused (an `<implementation>`
//! from the previous feed is copied over verbatim), so an owned tree beats
//! streaming. Parsing uses `quick-xml`; serialization is a hand-rolled
//! pretty printer so text content never picks up indentation whitespace.
//!
//! Namespace handling is literal: the interface namespace is the default
//! namespace on the feed root and the 0compile namespace is bound to the
//! `compile` prefix, so element names carry their prefix as plain strings.

use crate::error::{ConvertError, Result};
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;

/// Default namespace of feed documents.
pub const XMLNS: &str = "http://zero-install.sourceforge.net/2004/injector/interface";

/// Namespace of the nested compile implementation, bound to `compile:`.
pub const XMLNS_COMPILE: &str = "http://zero-install.sourceforge.net/2006/namespaces/0compile";

/// An XML element: tag, attributes in document order, children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// A child node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Builder-style child element.
    pub fn child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Builder-style text content.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(attr) = self.attrs.iter_mut().find(|(n, _)| *n == name) {
            attr.1 = value;
        } else {
            self.attrs.push((name, value));
        }
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Child elements, in order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// First child element with the given tag.
    pub fn find(&self, tag: &str) -> Option<&Element> {
        self.child_elements().find(|element| element.tag == tag)
    }

    /// The `<implementation>` child with the given id, if any.
    pub fn find_implementation(&self, id: &str) -> Option<&Element> {
        self.child_elements()
            .find(|element| element.tag == "implementation" && element.get_attr("id") == Some(id))
    }

    /// Concatenated text content of this element.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Element(element) => out.push_str(&element.text_content()),
            }
        }
        out
    }

    /// Serialize as a pretty-printed document with an XML declaration.
    pub fn to_document(&self) -> Vec<u8> {
        let mut out = String::from("<?xml version='1.0' encoding='utf-8'?>\n");
        self.write_pretty(&mut out, 0);
        out.push('\n');
        out.into_bytes()
    }

    fn write_pretty(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        out.push_str(&indent);
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');

        let only_text = self.children.iter().all(|node| matches!(node, Node::Text(_)));
        if only_text {
            for node in &self.children {
                if let Node::Text(text) = node {
                    out.push_str(&escape(text.as_str()));
                }
            }
        } else {
            for node in &self.children {
                out.push('\n');
                match node {
                    Node::Element(element) => element.write_pretty(out, depth + 1),
                    Node::Text(text) => {
                        out.push_str(&"  ".repeat(depth + 1));
                        out.push_str(&escape(text.as_str()));
                    }
                }
            }
            out.push('\n');
            out.push_str(&indent);
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }

    /// Parse a document into its root element.
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        loop {
            let event = reader
                .read_event()
                .map_err(|e| ConvertError::Xml(format!("malformed XML: {e}")))?;
            match event {
                Event::Start(start) => {
                    stack.push(element_from_start(&start)?);
                }
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| ConvertError::Xml("unbalanced end tag".into()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let content = text
                        .unescape()
                        .map_err(|e| ConvertError::Xml(format!("bad text: {e}")))?;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(content.into_owned()));
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(
                            String::from_utf8_lossy(data.into_inner().as_ref()).into_owned(),
                        ));
                    }
                }
                Event::Eof => break,
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
            }
        }
        if !stack.is_empty() {
            return Err(ConvertError::Xml("unclosed element".into()));
        }
        root.ok_or_else(|| ConvertError::Xml("document has no root element".into()))
    }
}

fn element_from_start(start: &quick_xml::events::BytesStart<'_>) -> Result<Element> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ConvertError::Xml(format!("bad attribute: {e}")))?;
        let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ConvertError::Xml(format!("bad attribute value: {e}")))?
            .into_owned();
        element.attrs.push((name, value));
    }
    Ok(element)
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(element));
    } else if root.is_none() {
        *root = Some(element);
    } else {
        return Err(ConvertError::Xml("multiple root elements".into()));
    }
    Ok(())
}
