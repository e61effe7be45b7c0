//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. For extraction, read each file's Local File Header and data
//!
//! Only the tail and the directory are touched until an entry's data
//! is actually requested.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use crate::error::{ArchiveError, Result};
use crate::io::ReadAt;

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Location and size of the Central Directory.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryLocation {
    pub offset: u64,
    pub size: u64,
    pub total_entries: u64,
}

/// Low-level ZIP file parser.
///
/// Generic over the reader type so local files and in-memory buffers
/// share one code path. Typically used through
/// [`ZipArchive`](super::ZipArchive) rather than directly.
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: R,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    /// Create a new parser for the given reader.
    pub fn new(reader: R) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Handles both the simple case (no comment) and archives with
    /// comments by searching backwards for the signature.
    ///
    /// Returns the EOCD record and its offset in the file, or
    /// [`ArchiveError::NotZip`] if none can be found.
    pub fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        if self.size < EndOfCentralDirectory::SIZE as u64 {
            return Err(ArchiveError::NotZip);
        }

        // Common case first: no archive comment.
        let offset = self.size - EndOfCentralDirectory::SIZE as u64;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.reader.read_exact_at(offset, &mut buf)?;

        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
            let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
            return Ok((eocd, offset));
        }

        // The EOCD sits earlier when there's a ZIP comment.
        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf)?;

        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                // The comment length must account for exactly the remaining bytes.
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(
                        &buf[i..i + EndOfCentralDirectory::SIZE],
                    )?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        Err(ArchiveError::NotZip)
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD indicates ZIP64 extensions are needed
    /// (fields set to 0xFFFF or 0xFFFFFFFF).
    pub fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        // The locator sits immediately before the regular EOCD
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or(ArchiveError::InvalidZip64)?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.reader.read_exact_at(locator_offset, &mut locator_buf)?;

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.reader
            .read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .map_err(|_| ArchiveError::InvalidZip64)?;

        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// Locate the Central Directory, following ZIP64 records if needed.
    ///
    /// This is the cheap validation step performed when an archive is opened.
    pub fn locate_directory(&self) -> Result<DirectoryLocation> {
        let (eocd, eocd_offset) = self.find_eocd()?;

        let location = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset)?;
            DirectoryLocation {
                offset: eocd64.cd_offset,
                size: eocd64.cd_size,
                total_entries: eocd64.total_entries,
            }
        } else {
            DirectoryLocation {
                offset: eocd.cd_offset as u64,
                size: eocd.cd_size as u64,
                total_entries: eocd.total_entries as u64,
            }
        };

        let end = location
            .offset
            .checked_add(location.size)
            .ok_or(ArchiveError::InvalidEocd)?;
        // Each record is at least CDFH_MIN_SIZE bytes, which bounds a forged count.
        let max_entries = location.size / CDFH_MIN_SIZE as u64;
        if end > self.size || location.total_entries > max_entries {
            return Err(ArchiveError::InvalidEocd);
        }

        Ok(location)
    }

    /// Read every Central Directory record.
    ///
    /// The whole directory is fetched with a single read and then decoded
    /// record by record.
    pub fn read_directory(
        &self,
        location: &DirectoryLocation,
    ) -> Result<Vec<CentralDirectoryRecord>> {
        let mut cd_data = vec![0u8; location.size as usize];
        self.reader.read_exact_at(location.offset, &mut cd_data)?;

        let total = location.total_entries as usize;
        let mut records = Vec::with_capacity(total);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for index in 0..total {
            let record = parse_cdfh(&mut cursor)
                .map_err(|_| ArchiveError::InvalidCentralDirectory { index })?;
            records.push(record);
        }

        Ok(records)
    }

    /// Get the actual data offset for an entry.
    ///
    /// The Local File Header has variable-length fields (filename, extra
    /// field) that may differ from the Central Directory record, so the
    /// header itself is read to find where the data starts.
    pub fn data_offset(&self, index: usize, record: &CentralDirectoryRecord) -> Result<u64> {
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.reader
            .read_exact_at(record.lfh_offset, &mut lfh_buf)
            .map_err(|_| ArchiveError::InvalidLocalHeader { index })?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            return Err(ArchiveError::InvalidLocalHeader { index });
        }

        // Variable field lengths sit at fixed positions in the LFH
        let mut cursor = Cursor::new(&lfh_buf[26..]);
        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        Ok(record.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length)
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Parse one Central Directory File Header from a cursor.
fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> std::io::Result<CentralDirectoryRecord> {
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != CDFH_SIGNATURE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "bad CDFH signature",
        ));
    }

    let _version_made_by = cursor.read_u16::<LittleEndian>()?;
    let _version_needed = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let compression_method = cursor.read_u16::<LittleEndian>()?;
    let last_mod_time = cursor.read_u16::<LittleEndian>()?;
    let last_mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let compressed_size = cursor.read_u32::<LittleEndian>()?;
    let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
    let file_name_length = cursor.read_u16::<LittleEndian>()?;
    let extra_field_length = cursor.read_u16::<LittleEndian>()?;
    let file_comment_length = cursor.read_u16::<LittleEndian>()?;
    let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
    let _external_attrs = cursor.read_u32::<LittleEndian>()?;
    let lfh_offset = cursor.read_u32::<LittleEndian>()?;

    let mut file_name_bytes = vec![0u8; file_name_length as usize];
    cursor.read_exact(&mut file_name_bytes)?;
    // Lossy conversion keeps non-UTF8 names usable
    let file_name = (!file_name_bytes.is_empty())
        .then(|| String::from_utf8_lossy(&file_name_bytes).into_owned());

    let mut extra = vec![0u8; extra_field_length as usize];
    cursor.read_exact(&mut extra)?;

    // Skip over the file comment
    let mut comment = vec![0u8; file_comment_length as usize];
    cursor.read_exact(&mut comment)?;

    // 32-bit fields saturated at 0xFFFFFFFF defer to the ZIP64 extra field.
    let mut uncompressed = (uncompressed_size != 0xFFFFFFFF).then_some(uncompressed_size as u64);
    let mut compressed = (compressed_size != 0xFFFFFFFF).then_some(compressed_size as u64);
    let mut offset = lfh_offset as u64;
    let mut unix_mtime = None;

    let mut fields = Cursor::new(extra.as_slice());
    while fields.position() + 4 <= extra.len() as u64 {
        let header_id = fields.read_u16::<LittleEndian>()?;
        let field_size = fields.read_u16::<LittleEndian>()? as u64;
        let field_end = (fields.position() + field_size).min(extra.len() as u64);

        match header_id {
            EXTRA_ZIP64 => {
                // Values are present only for fields saturated in the header
                if uncompressed_size == 0xFFFFFFFF && fields.position() + 8 <= field_end {
                    uncompressed = Some(fields.read_u64::<LittleEndian>()?);
                }
                if compressed_size == 0xFFFFFFFF && fields.position() + 8 <= field_end {
                    compressed = Some(fields.read_u64::<LittleEndian>()?);
                }
                if lfh_offset == 0xFFFFFFFF && fields.position() + 8 <= field_end {
                    offset = fields.read_u64::<LittleEndian>()?;
                }
            }
            EXTRA_EXTENDED_TIMESTAMP if field_size >= 5 => {
                let info = fields.read_u8()?;
                // Bit 0: modification time present
                if info & 0x01 != 0 {
                    unix_mtime = Some(fields.read_i32::<LittleEndian>()? as i64);
                }
            }
            _ => {}
        }

        fields.set_position(field_end);
    }

    Ok(CentralDirectoryRecord {
        file_name,
        flags,
        compression_method: CompressionMethod::from_u16(compression_method),
        compressed_size: compressed,
        uncompressed_size: uncompressed,
        crc32,
        lfh_offset: offset,
        last_mod_time,
        last_mod_date,
        unix_mtime,
    })
}

/// Hand-built archives with directory fields that can be patched.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Central Directory values written for the single entry.
    pub struct CdFields<'a> {
        pub flags: u16,
        pub compressed_size: u32,
        pub uncompressed_size: u32,
        pub lfh_offset: u32,
        pub extra: &'a [u8],
    }

    /// Single-entry STORED archive with an optional comment.
    pub fn stored_archive(name: &str, data: &[u8], comment: &[u8]) -> Vec<u8> {
        stored_archive_with(name, data, comment, |_| {})
    }

    /// Like [`stored_archive`], letting `edit` change the directory record.
    pub fn stored_archive_with<'a>(
        name: &str,
        data: &[u8],
        comment: &[u8],
        edit: impl FnOnce(&mut CdFields<'a>),
    ) -> Vec<u8> {
        let mut cd = CdFields {
            flags: 0,
            compressed_size: data.len() as u32,
            uncompressed_size: data.len() as u32,
            lfh_offset: 0,
            extra: &[],
        };
        edit(&mut cd);

        let mut out = Vec::new();
        // Local File Header
        out.extend_from_slice(LFH_SIGNATURE);
        out.extend_from_slice(&[20, 0]); // version
        out.extend_from_slice(&cd.flags.to_le_bytes());
        out.extend_from_slice(&[0, 0]); // method
        out.extend_from_slice(&[0, 0, 0x21, 0]); // time, date (1980-01-01)
        out.extend_from_slice(&0u32.to_le_bytes()); // crc (unchecked)
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(data);

        let cd_offset = out.len() as u32;
        out.extend_from_slice(CDFH_SIGNATURE);
        out.extend_from_slice(&[20, 0, 20, 0]); // made by, needed
        out.extend_from_slice(&cd.flags.to_le_bytes());
        out.extend_from_slice(&[0, 0]); // method
        out.extend_from_slice(&[0, 0, 0x21, 0]);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&cd.compressed_size.to_le_bytes());
        out.extend_from_slice(&cd.uncompressed_size.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(cd.extra.len() as u16).to_le_bytes());
        out.extend_from_slice(&[0, 0, 0, 0, 0, 0]); // comment, disk, internal
        out.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        out.extend_from_slice(&cd.lfh_offset.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(cd.extra);
        let cd_size = out.len() as u32 - cd_offset;

        out.extend_from_slice(EndOfCentralDirectory::SIGNATURE);
        out.extend_from_slice(&[0, 0, 0, 0, 1, 0, 1, 0]);
        out.extend_from_slice(&cd_size.to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&(comment.len() as u16).to_le_bytes());
        out.extend_from_slice(comment);
        out
    }

    /// ZIP64 extended information field holding `values` in header order.
    pub fn zip64_extra(values: &[u64]) -> Vec<u8> {
        let mut out = EXTRA_ZIP64.to_le_bytes().to_vec();
        out.extend_from_slice(&((values.len() * 8) as u16).to_le_bytes());
        for value in values {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }
}
