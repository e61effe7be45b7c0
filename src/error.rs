//! Error types for the archive session and its layers.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Faults in the ZIP container itself or in the source it is read from.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No End of Central Directory record could be located.
    #[error("Not a valid ZIP file")]
    NotZip,

    #[error("Invalid End of Central Directory")]
    InvalidEocd,

    #[error("Invalid ZIP64 format")]
    InvalidZip64,

    #[error("Invalid Central Directory File Header at entry {index}")]
    InvalidCentralDirectory { index: usize },

    #[error("Invalid Local File Header for entry {index}")]
    InvalidLocalHeader { index: usize },

    #[error("Unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    #[error("Entry {index} is encrypted")]
    Encrypted { index: usize },

    #[error("Entry index {index} out of range ({count} entries)")]
    IndexOutOfRange { index: usize, count: usize },

    /// The entry's recorded data range does not fit inside the source.
    #[error("Entry {index} data lies outside the archive")]
    DataOutOfBounds { index: usize },
}

/// `open` failed; the session stays closed.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not a readable ZIP archive: {source}")]
    InvalidArchive {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },
}

/// An entry or count operation was attempted on a closed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no archive is open")]
pub struct NotOpenError;

/// Failures of [`ArchiveSession::get_entry`](crate::ArchiveSession::get_entry)
/// and the other per-entry operations.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("no archive is open")]
    NotOpen,

    /// `count_entries` has not populated the metadata table yet.
    #[error("entries have not been counted yet")]
    NotCounted,

    #[error("entry index {index} out of range ({count} entries)")]
    OutOfRange { index: usize, count: usize },

    /// The archive's directory record lacks a required field.
    #[error("entry {index} has invalid metadata (no {missing})")]
    InvalidEntryMetadata { index: usize, missing: &'static str },

    /// The decompressed stream ended before the declared size was reached.
    #[error("short read on {name}: expected {expected} bytes, got {actual}")]
    Extraction {
        name: String,
        expected: u64,
        actual: u64,
    },

    /// No entry with the requested name exists.
    #[error("entry not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Xml(#[from] XmlError),
}

impl From<NotOpenError> for EntryError {
    fn from(_: NotOpenError) -> Self {
        EntryError::NotOpen
    }
}

impl From<io::Error> for EntryError {
    fn from(err: io::Error) -> Self {
        EntryError::Archive(ArchiveError::Io(err))
    }
}

/// Content failed strict well-formedness checking.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: u64, message: String },

    #[error("malformed XML at byte {position}: {reason}")]
    Malformed { position: u64, reason: String },

    #[error("XML is not valid UTF-8 near byte {position}")]
    Encoding { position: u64 },

    #[error("document has no root element")]
    NoRoot,

    #[error("I/O error while reading XML: {0}")]
    Io(#[from] io::Error),
}

impl XmlError {
    pub(crate) fn malformed(position: u64, reason: impl Into<String>) -> Self {
        XmlError::Malformed {
            position,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;
