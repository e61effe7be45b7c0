//! # ooxml-inspect
//!
//! Read-only access to the parts of an Office Open XML package.
//!
//! A `.docx`, `.xlsx` or `.pptx` file is a ZIP archive of XML parts and
//! binary media. This library opens such an archive, caches its entry
//! directory, and materializes individual entries into owned buffers.
//! Entries whose bytes are well-formed XML also come back as a parsed
//! [`XmlDocument`].
//!
//! ## Features
//!
//! - ZIP reading over any random-access source ([`ReadAt`]), including ZIP64
//! - STORED and DEFLATE entries
//! - Per-field validity of directory metadata (name, size, modification time)
//! - Strict well-formedness checking of XML parts, from a buffer or a stream
//! - Serialization of parsed documents back to XML text
//!
//! ## Example
//!
//! ```no_run
//! use ooxml_inspect::FileSession;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut session = FileSession::new();
//!     session.open("report.docx", true)?;
//!
//!     for index in 0..session.count_entries()? {
//!         let entry = session.get_entry(index, true)?;
//!         match &entry.document {
//!             Some(doc) => println!("{}: <{}>", entry.name, doc.root.name),
//!             None => println!("{}: {} bytes", entry.name, entry.fetched()),
//!         }
//!     }
//!
//!     session.close();
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cli;
pub mod entry;
pub mod error;
pub mod io;
pub mod materialize;
pub mod session;
pub mod xml;
pub mod zip;

pub use self::zip::ZipArchive;
pub use archive::{Archive, OpenArchive};
pub use cli::Cli;
pub use entry::{EntryData, EntryMetadata, ExtractedEntry};
pub use error::{ArchiveError, EntryError, NotOpenError, OpenError, XmlError};
pub use io::{LocalFileReader, MemoryReader, ReadAt};
pub use session::{ArchiveSession, FileSession};
pub use xml::XmlDocument;
