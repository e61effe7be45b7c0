//! Serialization of [`XmlDocument`] back to text.

use std::borrow::Cow;
use std::fmt;
use std::io::{self, Write};

use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::events::attributes::Attribute as RawAttribute;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::name::QName;

use super::{Element, Node, XmlDocument};

impl XmlDocument {
    /// Write the document as UTF-8 XML. Text is re-escaped; no
    /// indentation is added, so mixed content is reproduced as parsed.
    pub fn write_to<W: Write>(&self, out: W) -> io::Result<()> {
        let mut writer = Writer::new(out);

        if let Some(decl) = &self.declaration {
            emit(
                &mut writer,
                Event::Decl(BytesDecl::new(
                    &decl.version,
                    decl.encoding.as_deref(),
                    decl.standalone.as_deref(),
                )),
            )?;
            writer.get_mut().write_all(b"\n")?;
        }
        for node in &self.prolog {
            write_node(&mut writer, node)?;
        }
        write_element(&mut writer, &self.root)?;
        for node in &self.epilog {
            write_node(&mut writer, node)?;
        }
        Ok(())
    }

    pub fn to_xml_string(&self) -> String {
        let mut out = Vec::new();
        // Writing to a Vec cannot fail.
        let _ = self.write_to(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }
}

impl fmt::Display for XmlDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml_string())
    }
}

fn emit<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> io::Result<()> {
    writer.write_event(event).map_err(io::Error::other)
}

fn write_element<W: Write>(writer: &mut Writer<W>, element: &Element) -> io::Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for attr in &element.attributes {
        start.push_attribute(RawAttribute {
            key: QName(attr.name.as_bytes()),
            value: Cow::Owned(escape_attribute(&attr.value).into_bytes()),
        });
    }

    if element.children.is_empty() {
        return emit(writer, Event::Empty(start));
    }

    emit(writer, Event::Start(start))?;
    for child in &element.children {
        write_node(writer, child)?;
    }
    emit(writer, Event::End(BytesEnd::new(element.name.as_str())))
}

/// Escape markup characters plus tab, CR and LF, which a parser would
/// otherwise fold into spaces.
fn escape_attribute(value: &str) -> String {
    let escaped = escape(value);
    if !escaped.contains(['\t', '\r', '\n']) {
        return escaped.into_owned();
    }
    escaped
        .replace('\t', "&#9;")
        .replace('\r', "&#13;")
        .replace('\n', "&#10;")
}

fn write_node<W: Write>(writer: &mut Writer<W>, node: &Node) -> io::Result<()> {
    match node {
        Node::Element(el) => write_element(writer, el),
        Node::Text(text) => emit(writer, Event::Text(BytesText::new(text))),
        Node::CData(text) => emit(writer, Event::CData(BytesCData::new(text.as_str()))),
        Node::Comment(text) => emit(writer, Event::Comment(BytesText::from_escaped(text.as_str()))),
        Node::ProcessingInstruction(text) => emit(writer, Event::PI(BytesPI::new(text.as_str()))),
        Node::DocType(text) => emit(writer, Event::DocType(BytesText::from_escaped(text.as_str()))),
    }
}
