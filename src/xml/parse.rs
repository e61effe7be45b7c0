//! Strict well-formedness parsing on top of `quick-xml`.
//!
//! `quick-xml` checks tag syntax and end-tag names; the tree builder
//! here adds the document-level rules (one root, nothing but markup and
//! whitespace outside it, every element closed, only predefined and
//! character entity references, valid UTF-8). Input is always treated
//! as UTF-8 and nothing outside the input is ever fetched.

use std::borrow::Cow;
use std::io::{BufRead, BufReader, Cursor, Read};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::{Attribute, Element, Node, XmlDeclaration, XmlDocument};
use crate::error::XmlError;

/// Bytes read before the parser is started.
pub const PRIMING_CHUNK: usize = 8;
/// Bytes handed to the parser per read once it is running.
pub const STREAM_CHUNK: usize = 4096;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Parse a complete in-memory document.
pub fn parse_bytes(bytes: &[u8]) -> Result<XmlDocument, XmlError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    parse_buffered(bytes)
}

/// Parse a document incrementally from a byte stream.
///
/// A [`PRIMING_CHUNK`] is read first, then the parser pulls
/// [`STREAM_CHUNK`]-sized reads until the stream ends or the first error.
/// The whole input is never held in memory at once; a partially built
/// tree is dropped on failure.
pub fn parse_stream<R: Read>(mut stream: R) -> Result<XmlDocument, XmlError> {
    let mut prime = [0u8; PRIMING_CHUNK];
    let primed = read_up_to(&mut stream, &mut prime)?;
    let head = prime[..primed].strip_prefix(UTF8_BOM).unwrap_or(&prime[..primed]);

    let input = BufReader::with_capacity(STREAM_CHUNK, Cursor::new(head).chain(stream));
    parse_buffered(input)
}

fn read_up_to<R: Read>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn parse_buffered<R: BufRead>(input: R) -> Result<XmlDocument, XmlError> {
    let mut reader = Reader::from_reader(input);
    let config = reader.config_mut();
    config.check_end_names = true;
    config.check_comments = true;
    config.expand_empty_elements = false;

    let mut builder = TreeBuilder::default();
    let mut buf = Vec::new();

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                return Err(XmlError::Syntax {
                    position: reader.buffer_position() as u64,
                    message: e.to_string(),
                });
            }
        };
        let pos = reader.buffer_position() as u64;

        match event {
            Event::Decl(decl) => {
                let declaration = XmlDeclaration {
                    version: decl_field(decl.version(), pos)?,
                    encoding: decl.encoding().map(|v| decl_field(v, pos)).transpose()?,
                    standalone: decl.standalone().map(|v| decl_field(v, pos)).transpose()?,
                };
                builder.declaration(declaration, pos)?;
            }
            Event::Start(start) => {
                let element = element(&start, pos)?;
                builder.open(element, pos)?;
            }
            Event::Empty(start) => {
                let element = element(&start, pos)?;
                builder.empty(element, pos)?;
            }
            Event::End(end) => {
                let qname = end.name();
                let name = utf8(qname.as_ref(), pos)?;
                builder.close(name, pos)?;
            }
            Event::Text(text) => {
                let raw = chars(&text, pos)?;
                if raw.contains("]]>") {
                    return Err(XmlError::malformed(pos, "']]>' in character data"));
                }
                let text = unescape(raw, pos)?;
                builder.text(&text, pos)?;
            }
            Event::GeneralRef(reference) => {
                let name = utf8(&reference, pos)?;
                let resolved = resolve_reference(name)
                    .ok_or_else(|| XmlError::malformed(pos, format!("undefined entity &{name};")))?;
                builder.text(resolved.encode_utf8(&mut [0u8; 4]), pos)?;
            }
            Event::CData(cdata) => {
                let text = chars(&cdata, pos)?.to_string();
                builder.cdata(text, pos)?;
            }
            Event::Comment(comment) => {
                let text = chars(&comment, pos)?.to_string();
                builder.misc(Node::Comment(text));
            }
            Event::PI(pi) => {
                let text = chars(&pi, pos)?.to_string();
                builder.misc(Node::ProcessingInstruction(text));
            }
            Event::DocType(doctype) => {
                let text = utf8(&doctype, pos)?.trim().to_string();
                builder.doctype(text, pos)?;
            }
            Event::Eof => return builder.finish(pos),
        }

        buf.clear();
    }
}

fn utf8(bytes: &[u8], position: u64) -> Result<&str, XmlError> {
    std::str::from_utf8(bytes).map_err(|_| XmlError::Encoding { position })
}

/// Decode `bytes` and require every code point to be an XML `Char`.
fn chars(bytes: &[u8], pos: u64) -> Result<&str, XmlError> {
    let text = utf8(bytes, pos)?;
    match text.chars().find(|&c| !is_xml_char(c)) {
        Some(c) => Err(XmlError::malformed(pos, format!("illegal character U+{:04X}", c as u32))),
        None => Ok(text),
    }
}

fn decl_field<E: std::fmt::Display>(
    value: Result<Cow<'_, [u8]>, E>,
    pos: u64,
) -> Result<String, XmlError> {
    let value = value.map_err(|e| XmlError::Syntax {
        position: pos,
        message: e.to_string(),
    })?;
    Ok(utf8(&value, pos)?.to_string())
}

fn element(start: &BytesStart<'_>, pos: u64) -> Result<Element, XmlError> {
    let qname = start.name();
    let name = utf8(qname.as_ref(), pos)?;
    check_name(name, pos)?;
    check_attribute_separation(start, pos)?;

    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::malformed(pos, e.to_string()))?;
        let key = utf8(attr.key.as_ref(), pos)?;
        check_name(key, pos)?;
        let raw = chars(&attr.value, pos)?;
        if raw.contains('<') {
            return Err(XmlError::malformed(pos, format!("'<' in value of attribute {key}")));
        }
        let value = unescape(&normalize_attribute(raw), pos)?;
        element.attributes.push(Attribute {
            name: key.to_string(),
            value,
        });
    }
    Ok(element)
}

/// Every quoted attribute value must be followed by whitespace or the end
/// of the tag.
fn check_attribute_separation(tag: &[u8], pos: u64) -> Result<(), XmlError> {
    let mut quote = None;
    for (i, &b) in tag.iter().enumerate() {
        match quote {
            Some(q) if b == q => {
                quote = None;
                let next = tag.get(i + 1).copied();
                if !matches!(next, None | Some(b' ' | b'\t' | b'\r' | b'\n' | b'/')) {
                    return Err(XmlError::malformed(pos, "attributes must be separated by whitespace"));
                }
            }
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None => {}
        }
    }
    Ok(())
}

/// Literal tab, CR and LF in an attribute value read as a single space;
/// a CR LF pair counts once. Character references are resolved later
/// and keep their code point.
fn normalize_attribute(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['\t', '\r', '\n']) {
        return Cow::Borrowed(raw);
    }
    Cow::Owned(raw.replace("\r\n", " ").replace(['\t', '\r', '\n'], " "))
}

fn check_name(name: &str, pos: u64) -> Result<(), XmlError> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(is_name_start_char) && chars.all(is_name_char);
    if !valid {
        return Err(XmlError::malformed(pos, format!("invalid name {name:?}")));
    }
    Ok(())
}

fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}' | '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c, '-' | '.' | '0'..='9' | '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

/// Resolve `name` as it appears between `&` and `;`.
fn resolve_reference(name: &str) -> Option<char> {
    let code = match name {
        "lt" => return Some('<'),
        "gt" => return Some('>'),
        "amp" => return Some('&'),
        "apos" => return Some('\''),
        "quot" => return Some('"'),
        _ => {
            let num = name.strip_prefix('#')?;
            match num.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            }
        }
    };
    char::from_u32(code).filter(|&c| is_xml_char(c))
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
}

/// Resolve every entity reference in `raw`.
fn unescape(raw: &str, pos: u64) -> Result<String, XmlError> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        let semi = tail
            .find(';')
            .ok_or_else(|| XmlError::malformed(pos, "unterminated entity reference"))?;
        let name = &tail[..semi];
        let resolved = resolve_reference(name)
            .ok_or_else(|| XmlError::malformed(pos, format!("undefined entity &{name};")))?;
        out.push(resolved);
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn is_xml_whitespace(text: &str) -> bool {
    text.chars().all(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
}

/// Assembles the owned tree from parser events and enforces the
/// document-level well-formedness rules.
#[derive(Default)]
struct TreeBuilder {
    declaration: Option<XmlDeclaration>,
    prolog: Vec<Node>,
    root: Option<Element>,
    epilog: Vec<Node>,
    stack: Vec<Element>,
    started: bool,
}

impl TreeBuilder {
    fn declaration(&mut self, decl: XmlDeclaration, pos: u64) -> Result<(), XmlError> {
        if self.started {
            return Err(XmlError::malformed(pos, "XML declaration not at start of document"));
        }
        self.started = true;
        self.declaration = Some(decl);
        Ok(())
    }

    fn check_new_element(&mut self, pos: u64) -> Result<(), XmlError> {
        self.started = true;
        if self.stack.is_empty() && self.root.is_some() {
            return Err(XmlError::malformed(pos, "content after the root element"));
        }
        Ok(())
    }

    fn open(&mut self, element: Element, pos: u64) -> Result<(), XmlError> {
        self.check_new_element(pos)?;
        self.stack.push(element);
        Ok(())
    }

    fn empty(&mut self, element: Element, pos: u64) -> Result<(), XmlError> {
        self.check_new_element(pos)?;
        self.attach(element);
        Ok(())
    }

    fn close(&mut self, name: &str, pos: u64) -> Result<(), XmlError> {
        let element = self
            .stack
            .pop()
            .ok_or_else(|| XmlError::malformed(pos, format!("unexpected end tag </{name}>")))?;
        if element.name != name {
            return Err(XmlError::malformed(
                pos,
                format!("expected </{}>, found </{name}>", element.name),
            ));
        }
        self.attach(element);
        Ok(())
    }

    /// Add a completed element to its parent, or make it the root.
    fn attach(&mut self, element: Element) {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(Node::Element(element)),
            None => self.root = Some(element),
        }
    }

    fn text(&mut self, text: &str, pos: u64) -> Result<(), XmlError> {
        self.started = true;
        let Some(parent) = self.stack.last_mut() else {
            if is_xml_whitespace(text) {
                return Ok(());
            }
            return Err(XmlError::malformed(pos, "text outside the root element"));
        };
        // References arrive as separate events; keep runs of text together.
        match parent.children.last_mut() {
            Some(Node::Text(prev)) => prev.push_str(text),
            _ => parent.children.push(Node::Text(text.to_string())),
        }
        Ok(())
    }

    fn cdata(&mut self, text: String, pos: u64) -> Result<(), XmlError> {
        self.started = true;
        let parent = self
            .stack
            .last_mut()
            .ok_or_else(|| XmlError::malformed(pos, "CDATA outside the root element"))?;
        parent.children.push(Node::CData(text));
        Ok(())
    }

    fn misc(&mut self, node: Node) {
        self.started = true;
        match (self.stack.last_mut(), &self.root) {
            (Some(parent), _) => parent.children.push(node),
            (None, None) => self.prolog.push(node),
            (None, Some(_)) => self.epilog.push(node),
        }
    }

    fn doctype(&mut self, text: String, pos: u64) -> Result<(), XmlError> {
        self.started = true;
        let repeated = self.prolog.iter().any(|n| matches!(n, Node::DocType(_)));
        if repeated || self.root.is_some() || !self.stack.is_empty() {
            return Err(XmlError::malformed(pos, "misplaced DOCTYPE"));
        }
        self.prolog.push(Node::DocType(text));
        Ok(())
    }

    fn finish(self, pos: u64) -> Result<XmlDocument, XmlError> {
        if let Some(open) = self.stack.last() {
            return Err(XmlError::malformed(pos, format!("unclosed element <{}>", open.name)));
        }
        let root = self.root.ok_or(XmlError::NoRoot)?;
        Ok(XmlDocument {
            declaration: self.declaration,
            prolog: self.prolog,
            root,
            epilog: self.epilog,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader that hands out at most `step` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    const CONTENT_TYPES: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#;

    #[test]
    fn test_parse_declaration_and_root() {
        let doc = parse_bytes(CONTENT_TYPES).unwrap();
        let decl = doc.declaration.as_ref().unwrap();
        assert_eq!(decl.version, "1.0");
        assert_eq!(decl.encoding.as_deref(), Some("UTF-8"));
        assert_eq!(decl.standalone.as_deref(), Some("yes"));
        assert_eq!(doc.root.name, "Types");
        let default = doc.root.elements().next().unwrap();
        assert_eq!(default.attribute("Extension"), Some("xml"));
    }

    #[test]
    fn test_entities_resolved() {
        let doc = parse_bytes(br#"<t a="x &amp; y">1 &lt; 2 &#65;&#x42;</t>"#).unwrap();
        assert_eq!(doc.root.attribute("a"), Some("x & y"));
        assert_eq!(doc.root.children, vec![Node::Text("1 < 2 AB".to_string())]);
    }

    #[test]
    fn test_malformed_inputs_rejected() {
        let cases: &[&[u8]] = &[
            b"",
            b"   ",
            b"<a>",
            b"<a></b>",
            b"</a>",
            b"<a/><b/>",
            b"text<a/>",
            b"<a/>trailing",
            b"<a>&bogus;</a>",
            b"<a x='1' x='2'/>",
            b"<a>\xFF\xFE</a>",
            b"<a/><?xml version='1.0'?>",
            b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR",
            b"<a>\x01</a>",
            b"<a b=\"1\"c=\"2\"/>",
            b"<a b='1'c='2'></a>",
            b"<a>]]></a>",
            b"<a@b/>",
            b"<a><b@c>x</b@c></a>",
            b"<a b@c='1'/>",
            b"<a b='1\x01'/>",
            b"<a><!-- \x02 --></a>",
        ];
        for case in cases {
            assert!(
                parse_bytes(case).is_err(),
                "accepted {:?}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn test_wellformed_edge_cases_accepted() {
        let cases: &[&[u8]] = &[
            b"<a b='1' c=\"2\"/>",
            b"<a b='1'\n\tc='2'></a>",
            b"<w:t xml:space='preserve'>]]&gt; ]] &#x1F600;</w:t>",
            "<r\u{E9}sum\u{E9} x-y.z='\u{4E2D}'/>".as_bytes(),
            b"<_a.b-c/>",
        ];
        for case in cases {
            assert!(
                parse_bytes(case).is_ok(),
                "rejected {:?}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn test_attribute_whitespace_normalized() {
        let doc = parse_bytes(b"<a v=\"x\ty\r\nz\rw\" r=\"p&#10;q&#9;\"/>").unwrap();
        assert_eq!(doc.root.attribute("v"), Some("x y z w"));
        assert_eq!(doc.root.attribute("r"), Some("p\nq\t"));
    }

    #[test]
    fn test_misc_outside_root_allowed() {
        let doc = parse_bytes(b"<!-- head --><?pi data?>\n<a>x</a>\n<!-- tail -->").unwrap();
        assert_eq!(doc.prolog.len(), 2);
        assert_eq!(doc.epilog, vec![Node::Comment(" tail ".to_string())]);
    }

    #[test]
    fn test_bom_tolerated() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(CONTENT_TYPES);
        assert!(parse_bytes(&bytes).is_ok());
        assert!(parse_stream(bytes.as_slice()).is_ok());
    }

    #[test]
    fn test_stream_matches_slice_parse() {
        let mut body = String::from("<root>");
        for i in 0..2000 {
            body.push_str(&format!("<row r=\"{i}\">value &amp; {i}</row>"));
        }
        body.push_str("</root>");

        let expected = parse_bytes(body.as_bytes()).unwrap();
        let streamed = parse_stream(Trickle {
            data: body.as_bytes(),
            step: 7,
        })
        .unwrap();
        assert_eq!(streamed, expected);
        assert_eq!(streamed.element_count(), 2001);
    }

    #[test]
    fn test_stream_shorter_than_priming_chunk() {
        let doc = parse_stream(&b"<a/>"[..]).unwrap();
        assert_eq!(doc.root.name, "a");
        assert!(matches!(parse_stream(&b""[..]), Err(XmlError::NoRoot)));
    }

    #[test]
    fn test_stream_stops_at_first_error() {
        let mut bad = b"<a><b></a>".to_vec();
        bad.extend(std::iter::repeat_n(b'x', 100_000));
        assert!(parse_stream(bad.as_slice()).is_err());
    }
}
