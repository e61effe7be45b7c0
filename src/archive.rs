//! The archive capability the session is written against.
//!
//! [`ZipArchive`](crate::zip::ZipArchive) is the production implementation;
//! tests substitute in-memory fakes to observe how often the session
//! touches the underlying archive.

use std::io::Read;
use std::path::Path;

use crate::entry::EntryMetadata;
use crate::error::{ArchiveError, OpenError};

/// An open archive: a fixed, indexed list of entries whose content can
/// be streamed one at a time.
pub trait Archive {
    /// Decompressed content of a single entry.
    type Stream<'a>: Read
    where
        Self: 'a;

    /// Number of entries recorded in the archive's directory.
    fn entry_count(&self) -> usize;

    /// Metadata for the entry at `index`, with every field the archive
    /// did not actually supply left as `None`.
    fn stat_index(&self, index: usize) -> Result<EntryMetadata, ArchiveError>;

    /// Open a decompression stream over the entry at `index`.
    fn open_index(&self, index: usize) -> Result<Self::Stream<'_>, ArchiveError>;

    /// Position of the first entry called `name`, if any.
    fn index_of(&self, name: &str) -> Option<usize>;
}

/// An [`Archive`] that can be opened from a filesystem path.
pub trait OpenArchive: Archive + Sized {
    fn open_path(path: &Path, readonly: bool) -> Result<Self, OpenError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Call counters shared between a [`FakeArchive`] and the test holding it.
    #[derive(Debug, Default, Clone)]
    pub struct Calls {
        pub count: Rc<Cell<usize>>,
        pub stat: Rc<Cell<usize>>,
        pub open: Rc<Cell<usize>>,
    }

    pub struct FakeEntry {
        pub name: Option<String>,
        /// Declared size, which may disagree with `content`.
        pub size: Option<u64>,
        pub content: Vec<u8>,
    }

    impl FakeEntry {
        pub fn new(name: &str, content: &[u8]) -> Self {
            Self {
                name: Some(name.to_string()),
                size: Some(content.len() as u64),
                content: content.to_vec(),
            }
        }
    }

    pub struct FakeArchive {
        pub entries: Vec<FakeEntry>,
        pub calls: Calls,
        /// Indexes whose stat fails.
        pub broken_stat: Vec<usize>,
    }

    impl FakeArchive {
        pub fn new(entries: Vec<FakeEntry>) -> (Self, Calls) {
            let calls = Calls::default();
            let archive = Self {
                entries,
                calls: calls.clone(),
                broken_stat: Vec::new(),
            };
            (archive, calls)
        }

        /// Make `stat_index(index)` fail as a corrupt directory record would.
        pub fn with_broken_stat(mut self, index: usize) -> Self {
            self.broken_stat.push(index);
            self
        }
    }

    fn bump(counter: &Cell<usize>) {
        counter.set(counter.get() + 1);
    }

    impl Archive for FakeArchive {
        type Stream<'a> = &'a [u8];

        fn entry_count(&self) -> usize {
            bump(&self.calls.count);
            self.entries.len()
        }

        fn stat_index(&self, index: usize) -> Result<EntryMetadata, ArchiveError> {
            bump(&self.calls.stat);
            let entry = self.entries.get(index).ok_or(ArchiveError::IndexOutOfRange {
                index,
                count: self.entries.len(),
            })?;
            if self.broken_stat.contains(&index) {
                return Err(ArchiveError::InvalidCentralDirectory { index });
            }
            Ok(EntryMetadata {
                name: entry.name.clone(),
                size: entry.size,
                compressed_size: entry.size,
                mtime: None,
                index: Some(index),
            })
        }

        fn open_index(&self, index: usize) -> Result<&[u8], ArchiveError> {
            bump(&self.calls.open);
            self.entries
                .get(index)
                .map(|e| e.content.as_slice())
                .ok_or(ArchiveError::IndexOutOfRange {
                    index,
                    count: self.entries.len(),
                })
        }

        fn index_of(&self, name: &str) -> Option<usize> {
            self.entries
                .iter()
                .position(|e| e.name.as_deref() == Some(name))
        }
    }
}
