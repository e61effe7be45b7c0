use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::io::Cursor;

use crate::error::{ArchiveError, Result};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ArchiveError::InvalidEocd);
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ArchiveError::InvalidZip64);
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ArchiveError::InvalidZip64);
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            eocd64_size: cursor.read_u64::<LittleEndian>()?,
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            disk_number: cursor.read_u32::<LittleEndian>()?,
            disk_with_cd: cursor.read_u32::<LittleEndian>()?,
            disk_entries: cursor.read_u64::<LittleEndian>()?,
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Extra field carrying 64-bit sizes and offsets.
pub const EXTRA_ZIP64: u16 = 0x0001;
/// Extra field carrying a UTC Unix modification time.
pub const EXTRA_EXTENDED_TIMESTAMP: u16 = 0x5455;

/// General purpose flag bit 0: entry data is encrypted.
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// One Central Directory record, decoded but not yet validated.
///
/// Fields the archive did not really supply are `None`; in particular an
/// uncompressed size stuck at `0xFFFFFFFF` without a ZIP64 value is unknown.
#[derive(Debug, Clone)]
pub struct CentralDirectoryRecord {
    pub file_name: Option<String>,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub compressed_size: Option<u64>,
    pub uncompressed_size: Option<u64>,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    /// Seconds since the Unix epoch, from an extended-timestamp extra field.
    pub unix_mtime: Option<i64>,
}

impl CentralDirectoryRecord {
    pub fn is_directory(&self) -> bool {
        self.file_name.as_deref().is_some_and(|n| n.ends_with('/'))
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    /// Modification time, preferring the extended timestamp (UTC) over the
    /// DOS fields. `None` when neither describes a real instant.
    pub fn modified(&self) -> Option<NaiveDateTime> {
        if let Some(secs) = self.unix_mtime {
            if let Some(dt) = DateTime::from_timestamp(secs, 0) {
                return Some(dt.naive_utc());
            }
        }

        let (year, month, day) = self.mod_date();
        let (hour, minute, second) = self.mod_time();
        NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)?.and_hms_opt(
            hour as u32,
            minute as u32,
            second as u32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: u16, time: u16) -> CentralDirectoryRecord {
        CentralDirectoryRecord {
            file_name: Some("word/document.xml".to_string()),
            flags: 0,
            compression_method: CompressionMethod::Deflate,
            compressed_size: Some(10),
            uncompressed_size: Some(20),
            crc32: 0,
            lfh_offset: 0,
            last_mod_time: time,
            last_mod_date: date,
            unix_mtime: None,
        }
    }

    #[test]
    fn test_dos_datetime() {
        // 2022-03-15 10:30:42
        let date = ((2022 - 1980) << 9) | (3 << 5) | 15;
        let time = (10 << 11) | (30 << 5) | 21;
        let rec = record(date, time);
        assert_eq!(rec.mod_date(), (2022, 3, 15));
        assert_eq!(rec.mod_time(), (10, 30, 42));

        let modified = rec.modified().unwrap();
        assert_eq!(modified.to_string(), "2022-03-15 10:30:42");
    }

    #[test]
    fn test_zeroed_dos_date_is_not_a_time() {
        assert!(record(0, 0).modified().is_none());
    }

    #[test]
    fn test_extended_timestamp_preferred() {
        let mut rec = record(0, 0);
        rec.unix_mtime = Some(1_700_000_000);
        assert_eq!(rec.modified().unwrap().to_string(), "2023-11-14 22:13:20");
    }

    #[test]
    fn test_eocd_signature_checked() {
        let mut buf = [0u8; EndOfCentralDirectory::SIZE];
        assert!(EndOfCentralDirectory::from_bytes(&buf).is_err());

        buf[0..4].copy_from_slice(EndOfCentralDirectory::SIGNATURE);
        buf[10] = 3; // total_entries
        let eocd = EndOfCentralDirectory::from_bytes(&buf).unwrap();
        assert_eq!(eocd.total_entries, 3);
        assert!(!eocd.is_zip64());
    }

    #[test]
    fn test_compression_method_roundtrip() {
        assert_eq!(CompressionMethod::from_u16(8), CompressionMethod::Deflate);
        assert_eq!(CompressionMethod::from_u16(12).as_u16(), 12);
    }
}
