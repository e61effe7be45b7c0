//! Entry metadata and materialized entries.

use chrono::NaiveDateTime;

use crate::xml::XmlDocument;

/// Directory record for one archive entry, cached by the session.
///
/// Each field is `Some` only if the archive actually supplied it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    /// Forward-slash separated path, e.g. `word/document.xml`.
    pub name: Option<String>,
    /// Declared uncompressed size.
    pub size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub mtime: Option<NaiveDateTime>,
    /// Position in the archive's directory.
    pub index: Option<usize>,
}

impl EntryMetadata {
    pub fn is_directory(&self) -> bool {
        self.name.as_deref().is_some_and(|n| n.ends_with('/'))
    }

    /// Directory part of the name, without a trailing slash.
    /// Top-level entries (and nameless ones) yield `""`.
    pub fn directory(&self) -> &str {
        let name = self.name.as_deref().unwrap_or_default();
        let name = name.strip_suffix('/').unwrap_or(name);
        name.rfind('/').map_or("", |pos| &name[..pos])
    }

    /// Last path component of the name.
    pub fn file_name(&self) -> &str {
        let name = self.name.as_deref().unwrap_or_default();
        let name = name.strip_suffix('/').unwrap_or(name);
        name.rfind('/').map_or(name, |pos| &name[pos + 1..])
    }
}

/// Fetched entry content followed by one [`EntryData::SENTINEL`] byte.
///
/// The sentinel lets text content be handed to consumers expecting a
/// terminated string without another copy.
#[derive(Clone, PartialEq, Eq)]
pub struct EntryData {
    buf: Vec<u8>,
}

impl EntryData {
    pub const SENTINEL: u8 = 0;

    /// Take ownership of fetched content and terminate it. A buffer
    /// allocated with one spare byte of capacity is not reallocated.
    pub(crate) fn from_content(mut buf: Vec<u8>) -> Self {
        buf.push(Self::SENTINEL);
        Self { buf }
    }

    /// Number of content bytes actually fetched.
    pub fn len(&self) -> usize {
        self.buf.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Content without the sentinel.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len()]
    }

    /// Content including the trailing sentinel.
    pub fn as_bytes_with_sentinel(&self) -> &[u8] {
        &self.buf
    }

    /// Content as UTF-8 text, if it is.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        self.buf.pop();
        self.buf
    }
}

impl std::fmt::Debug for EntryData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryData").field("len", &self.len()).finish()
    }
}

/// One materialized entry, owned by the caller.
///
/// Dropping it releases both the buffer and the parsed document.
#[derive(Debug)]
pub struct ExtractedEntry {
    pub name: String,
    /// Declared uncompressed length from the directory.
    pub length: u64,
    pub mtime: Option<NaiveDateTime>,
    pub index: Option<usize>,
    /// Present only when content was fetched.
    pub data: Option<EntryData>,
    /// Present only when the fetched bytes are well-formed XML.
    pub document: Option<XmlDocument>,
}

impl ExtractedEntry {
    /// Number of bytes fetched, 0 when content was not requested.
    pub fn fetched(&self) -> usize {
        self.data.as_ref().map_or(0, EntryData::len)
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        self.data.as_ref().map(EntryData::as_bytes)
    }

    pub fn is_xml(&self) -> bool {
        self.document.is_some()
    }
}
