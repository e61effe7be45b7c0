use std::path::Path;

use tracing::debug;

use crate::archive::{Archive, OpenArchive};
use crate::entry::EntryMetadata;
use crate::error::{ArchiveError, OpenError, Result};
use crate::io::{LocalFileReader, ReadAt};

use super::parser::ZipParser;
use super::stream::{EntryStream, RangeReader};
use super::structures::{CentralDirectoryRecord, CompressionMethod};

/// A ZIP archive opened over a [`ReadAt`] source.
///
/// Opening reads only the end records and the Central Directory; entry
/// data is located and decompressed when an entry is opened.
pub struct ZipArchive<R: ReadAt> {
    parser: ZipParser<R>,
    records: Vec<CentralDirectoryRecord>,
}

impl<R: ReadAt> ZipArchive<R> {
    pub fn new(reader: R) -> Result<Self> {
        let parser = ZipParser::new(reader);
        let location = parser.locate_directory()?;
        let records = parser.read_directory(&location)?;
        debug!(
            entries = records.len(),
            cd_offset = location.offset,
            cd_size = location.size,
            "read central directory"
        );
        Ok(Self { parser, records })
    }

    /// Raw directory records, in archive order.
    pub fn records(&self) -> &[CentralDirectoryRecord] {
        &self.records
    }

    fn record(&self, index: usize) -> Result<&CentralDirectoryRecord> {
        self.records.get(index).ok_or(ArchiveError::IndexOutOfRange {
            index,
            count: self.records.len(),
        })
    }
}

impl<R: ReadAt> Archive for ZipArchive<R> {
    type Stream<'a>
        = EntryStream<'a, R>
    where
        Self: 'a;

    fn entry_count(&self) -> usize {
        self.records.len()
    }

    fn stat_index(&self, index: usize) -> Result<EntryMetadata> {
        let record = self.record(index)?;
        Ok(EntryMetadata {
            name: record.file_name.clone(),
            size: record.uncompressed_size,
            compressed_size: record.compressed_size,
            mtime: record.modified(),
            index: Some(index),
        })
    }

    fn open_index(&self, index: usize) -> Result<EntryStream<'_, R>> {
        let record = self.record(index)?;
        if record.is_encrypted() {
            return Err(ArchiveError::Encrypted { index });
        }

        let compressed_size = record
            .compressed_size
            .ok_or(ArchiveError::InvalidCentralDirectory { index })?;
        let data_offset = self.parser.data_offset(index, record)?;
        let in_bounds = data_offset
            .checked_add(compressed_size)
            .is_some_and(|end| end <= self.parser.size());
        if !in_bounds {
            return Err(ArchiveError::DataOutOfBounds { index });
        }

        let raw = RangeReader::new(self.parser.reader(), data_offset, compressed_size);
        match record.compression_method {
            CompressionMethod::Stored => Ok(EntryStream::stored(raw)),
            CompressionMethod::Deflate => Ok(EntryStream::deflate(raw)),
            CompressionMethod::Unknown(method) => Err(ArchiveError::UnsupportedCompression(method)),
        }
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.file_name.as_deref() == Some(name))
    }
}

impl OpenArchive for ZipArchive<LocalFileReader> {
    fn open_path(path: &Path, readonly: bool) -> Result<Self, OpenError> {
        let reader = LocalFileReader::open(path, readonly).map_err(|source| OpenError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        ZipArchive::new(reader).map_err(|source| OpenError::InvalidArchive {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use crate::zip::parser::testing::{stored_archive_with, zip64_extra};
    use crate::zip::structures::FLAG_ENCRYPTED;
    use std::io::{Cursor, Read, Write};
    use zip::CompressionMethod as Method;
    use zip::write::SimpleFileOptions;

    fn build(entries: &[(&str, Vec<u8>, Method)]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data, method) in entries {
            let options = SimpleFileOptions::default().compression_method(*method);
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn read_all<R: ReadAt>(archive: &ZipArchive<R>, index: usize) -> Vec<u8> {
        let mut out = Vec::new();
        archive.open_index(index).unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_stat_and_read_mixed_methods() {
        let body = b"<w:document><w:body/></w:document>".repeat(20);
        let bytes = build(&[
            ("[Content_Types].xml", b"<Types/>".to_vec(), Method::Stored),
            ("word/document.xml", body.clone(), Method::Deflated),
        ]);
        let archive = ZipArchive::new(MemoryReader::new(bytes)).unwrap();
        assert_eq!(archive.entry_count(), 2);

        let meta = archive.stat_index(1).unwrap();
        assert_eq!(meta.name.as_deref(), Some("word/document.xml"));
        assert_eq!(meta.size, Some(body.len() as u64));
        assert!(meta.compressed_size.unwrap() < body.len() as u64);
        assert_eq!(meta.index, Some(1));
        assert!(meta.mtime.is_some());

        assert_eq!(read_all(&archive, 0), b"<Types/>");
        assert_eq!(read_all(&archive, 1), body);
        assert_eq!(archive.index_of("word/document.xml"), Some(1));
        assert_eq!(archive.index_of("word/missing.xml"), None);
    }

    #[test]
    fn test_index_out_of_range() {
        let bytes = build(&[("a.xml", b"<a/>".to_vec(), Method::Stored)]);
        let archive = ZipArchive::new(MemoryReader::new(bytes)).unwrap();
        assert!(matches!(
            archive.stat_index(1),
            Err(ArchiveError::IndexOutOfRange { index: 1, count: 1 })
        ));
        assert!(archive.open_index(5).is_err());
    }

    #[test]
    fn test_unsupported_method_rejected() {
        let mut bytes = build(&[("a.bin", b"abc".to_vec(), Method::Stored)]);
        // Patch the method field in both headers to an unknown value (99).
        bytes[8] = 99;
        let cd = bytes.windows(4).position(|w| w == b"PK\x01\x02").unwrap();
        bytes[cd + 10] = 99;

        let archive = ZipArchive::new(MemoryReader::new(bytes)).unwrap();
        assert!(matches!(
            archive.open_index(0),
            Err(ArchiveError::UnsupportedCompression(99))
        ));
    }

    #[test]
    fn test_open_path_errors() {
        let missing = ZipArchive::open_path(Path::new("/nonexistent/file.docx"), true);
        assert!(matches!(missing, Err(OpenError::Io { .. })));

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"this is not an archive").unwrap();
        let invalid = ZipArchive::open_path(tmp.path(), true);
        assert!(matches!(invalid, Err(OpenError::InvalidArchive { .. })));
    }

    #[test]
    fn test_encrypted_entry_rejected() {
        let bytes = stored_archive_with("word/document.xml", b"<w/>", b"", |cd| {
            cd.flags = FLAG_ENCRYPTED;
        });
        let archive = ZipArchive::new(MemoryReader::new(bytes)).unwrap();

        // Metadata is still available; only the content is refused.
        assert_eq!(archive.stat_index(0).unwrap().size, Some(4));
        assert!(matches!(
            archive.open_index(0),
            Err(ArchiveError::Encrypted { index: 0 })
        ));
    }

    #[test]
    fn test_zip64_extra_entry_readable() {
        let extra = zip64_extra(&[4, 4, 0]);
        let bytes = stored_archive_with("a.xml", b"<a/>", b"", |cd| {
            cd.uncompressed_size = 0xFFFFFFFF;
            cd.compressed_size = 0xFFFFFFFF;
            cd.lfh_offset = 0xFFFFFFFF;
            cd.extra = &extra;
        });
        let archive = ZipArchive::new(MemoryReader::new(bytes)).unwrap();

        let meta = archive.stat_index(0).unwrap();
        assert_eq!(meta.size, Some(4));
        assert_eq!(meta.compressed_size, Some(4));
        assert_eq!(read_all(&archive, 0), b"<a/>");
    }
}
