//! Owned XML documents for package parts.
//!
//! Parts are parsed with `quick-xml` into a small owned tree so a
//! materialized entry can outlive the archive it came from. Parsing is
//! strict: anything that is not well-formed XML is rejected rather than
//! repaired.

mod parse;
mod write;

pub use parse::{PRIMING_CHUNK, STREAM_CHUNK, parse_bytes, parse_stream};

/// `<?xml version=".." encoding=".." standalone=".."?>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDeclaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified name as written, e.g. `r:id`.
    pub name: String,
    /// Value with entity references resolved.
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written, e.g. `w:p`.
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Character data with entity references resolved.
    Text(String),
    CData(String),
    Comment(String),
    /// Target and content, e.g. `mso-application progid="Word.Document"`.
    ProcessingInstruction(String),
    DocType(String),
}

/// A well-formed XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub declaration: Option<XmlDeclaration>,
    /// Comments, processing instructions and doctype before the root.
    pub prolog: Vec<Node>,
    pub root: Element,
    /// Comments and processing instructions after the root.
    pub epilog: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Local part of the name, without any namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    /// Direct child elements.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    /// First element named `name` in document order, including `self`.
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.elements().find_map(|child| child.find(name))
    }

    /// Concatenated text and CDATA of all descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(text) | Node::CData(text) => out.push_str(text),
                Node::Element(el) => el.collect_text(out),
                _ => {}
            }
        }
    }
}

impl XmlDocument {
    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn text_content(&self) -> String {
        self.root.text_content()
    }

    /// Number of elements in the document, root included.
    pub fn element_count(&self) -> usize {
        fn count(el: &Element) -> usize {
            1 + el.elements().map(count).sum::<usize>()
        }
        count(&self.root)
    }
}
