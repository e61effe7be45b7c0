//! Turning directory records into owned entries.

use std::io::Read;

use tracing::{debug, warn};

use crate::archive::Archive;
use crate::entry::{EntryData, EntryMetadata, ExtractedEntry};
use crate::error::EntryError;
use crate::xml::{self, XmlDocument};

/// Build an [`ExtractedEntry`] for the entry at `index`.
///
/// Name and declared size must have been supplied by the archive. With
/// `fetch_data` unset nothing is decompressed. Otherwise exactly the
/// declared number of bytes is read and probed as XML; content that does
/// not parse is still returned, just without a document.
pub fn materialize<A: Archive>(
    archive: &A,
    index: usize,
    meta: &EntryMetadata,
    fetch_data: bool,
) -> Result<ExtractedEntry, EntryError> {
    let Some(name) = meta.name.as_ref() else {
        warn!(index, "entry has no file name");
        return Err(EntryError::InvalidEntryMetadata {
            index,
            missing: "name",
        });
    };
    let Some(length) = meta.size else {
        warn!(index, name = %name, "entry has no size");
        return Err(EntryError::InvalidEntryMetadata {
            index,
            missing: "size",
        });
    };

    let mut entry = ExtractedEntry {
        name: name.clone(),
        length,
        mtime: meta.mtime,
        index: meta.index,
        data: None,
        document: None,
    };

    if !fetch_data || length == 0 {
        return Ok(entry);
    }

    let short_read = |actual: usize| EntryError::Extraction {
        name: name.clone(),
        expected: length,
        actual: actual as u64,
    };
    let len = usize::try_from(length).map_err(|_| short_read(0))?;

    // Capacity for the content plus the sentinel; bytes are only written
    // as the stream produces them.
    let mut buf = Vec::new();
    buf.try_reserve_exact(len.saturating_add(1))
        .map_err(|_| short_read(0))?;
    let stream = archive.open_index(index)?;
    stream.take(length).read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(short_read(buf.len()));
    }

    entry.document = match xml::parse_bytes(&buf) {
        Ok(doc) => Some(doc),
        Err(e) => {
            debug!(name = %entry.name, error = %e, "entry is not well-formed XML");
            None
        }
    };
    entry.data = Some(EntryData::from_content(buf));

    Ok(entry)
}

/// Stream the entry called `name` through the chunked XML parser.
///
/// Unlike [`materialize`], a parse failure is an error here.
pub fn parse_archive_xml<A: Archive>(archive: &A, name: &str) -> Result<XmlDocument, EntryError> {
    let index = archive
        .index_of(name)
        .ok_or_else(|| EntryError::NotFound(name.to_string()))?;
    let stream = archive.open_index(index)?;
    xml::parse_stream(stream).map_err(|e| {
        debug!(name, error = %e, "streaming XML check failed");
        EntryError::Xml(e)
    })
}
