//! The archive session: one open archive plus its cached directory.

use std::path::Path;

use tracing::{debug, warn};

use crate::archive::{Archive, OpenArchive};
use crate::entry::{EntryMetadata, ExtractedEntry};
use crate::error::{EntryError, NotOpenError, OpenError};
use crate::io::LocalFileReader;
use crate::materialize;
use crate::xml::XmlDocument;
use crate::zip::ZipArchive;

/// Session over a ZIP file on disk.
pub type FileSession = ArchiveSession<ZipArchive<LocalFileReader>>;

/// Owns at most one open archive and the entry metadata collected from it.
///
/// Entry metadata is gathered by the first [`count_entries`] call after an
/// archive is bound and reused until the session is closed. The session
/// is a single mutable resource with no internal locking.
///
/// [`count_entries`]: ArchiveSession::count_entries
pub struct ArchiveSession<A: Archive> {
    archive: Option<A>,
    entries: Option<Vec<EntryMetadata>>,
}

impl<A: Archive> Default for ArchiveSession<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Archive> ArchiveSession<A> {
    pub fn new() -> Self {
        Self {
            archive: None,
            entries: None,
        }
    }

    /// Bind an already opened archive, closing any previous one.
    pub fn attach(&mut self, archive: A) {
        self.close();
        self.archive = Some(archive);
    }

    /// Release the archive and the cached metadata. Safe to call on a
    /// closed session.
    pub fn close(&mut self) {
        self.archive = None;
        self.entries = None;
    }

    pub fn is_open(&self) -> bool {
        self.archive.is_some()
    }

    /// The bound archive, if any.
    pub fn archive(&self) -> Option<&A> {
        self.archive.as_ref()
    }

    /// Number of entries in the open archive.
    ///
    /// The first call after binding an archive stats every entry once and
    /// caches the results; later calls answer from the cache.
    pub fn count_entries(&mut self) -> Result<usize, NotOpenError> {
        let archive = self.archive.as_ref().ok_or(NotOpenError)?;
        let entries = self.entries.get_or_insert_with(|| sweep(archive));
        Ok(entries.len())
    }

    /// Cached metadata, available once [`count_entries`](Self::count_entries)
    /// has run.
    pub fn entries(&self) -> Option<&[EntryMetadata]> {
        self.entries.as_deref()
    }

    /// Materialize the entry at `index`.
    ///
    /// Requires an open archive and a populated metadata cache. Range
    /// checks happen before any archive access.
    pub fn get_entry(&self, index: usize, fetch_data: bool) -> Result<ExtractedEntry, EntryError> {
        let (archive, meta) = self.lookup(index)?;
        materialize::materialize(archive, index, meta, fetch_data)
    }

    /// Materialize the entry at `index` and immediately drop the result,
    /// for callers that only need to know whether it would succeed.
    pub fn probe_entry(&self, index: usize, fetch_data: bool) -> Result<(), EntryError> {
        self.get_entry(index, fetch_data).map(drop)
    }

    /// Run the streaming well-formedness check on the entry called `name`.
    pub fn parse_entry_xml(&self, name: &str) -> Result<XmlDocument, EntryError> {
        let archive = self.archive.as_ref().ok_or(EntryError::NotOpen)?;
        materialize::parse_archive_xml(archive, name)
    }

    fn lookup(&self, index: usize) -> Result<(&A, &EntryMetadata), EntryError> {
        let archive = self.archive.as_ref().ok_or(EntryError::NotOpen)?;
        let entries = self.entries.as_ref().ok_or(EntryError::NotCounted)?;
        let meta = entries.get(index).ok_or(EntryError::OutOfRange {
            index,
            count: entries.len(),
        })?;
        Ok((archive, meta))
    }
}

impl<A: OpenArchive> ArchiveSession<A> {
    /// Open the archive at `path`, closing any archive already open.
    ///
    /// On failure the session is left closed.
    pub fn open(&mut self, path: impl AsRef<Path>, readonly: bool) -> Result<(), OpenError> {
        self.close();
        let archive = A::open_path(path.as_ref(), readonly)?;
        debug!(path = %path.as_ref().display(), readonly, "opened archive");
        self.archive = Some(archive);
        Ok(())
    }
}

/// Collect metadata for every entry. A failed stat leaves an empty
/// record, which materialization later rejects.
fn sweep<A: Archive>(archive: &A) -> Vec<EntryMetadata> {
    let count = archive.entry_count();
    debug!(count, "collecting entry metadata");
    (0..count)
        .map(|index| {
            archive.stat_index(index).unwrap_or_else(|e| {
                warn!(index, error = %e, "cannot stat entry");
                EntryMetadata::default()
            })
        })
        .collect()
}
