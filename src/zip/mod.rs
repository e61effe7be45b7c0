//! ZIP container reading.
//!
//! OOXML packages are plain ZIP archives. This module reads just enough
//! of the format to enumerate entries and stream their content.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`stream`]: Bounded readers and decompression over entry data
//! - [`archive`]: [`ZipArchive`], the [`Archive`](crate::Archive) implementation
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The EOCD is read first (from the end of the file), then the Central
//! Directory, which allows listing entries without touching their data.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 end records and extra fields
//! - STORED (no compression) and DEFLATE methods
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods
//! - No writing

pub mod archive;
pub mod parser;
pub mod stream;
pub mod structures;

pub use archive::ZipArchive;
pub use parser::ZipParser;
pub use structures::{CentralDirectoryRecord, CompressionMethod};
