//! Decompression streams over entry data.

use std::io::{self, BufReader, Read};

use flate2::read::DeflateDecoder;

use crate::io::ReadAt;

/// Sequential reader over `[offset, offset + len)` of a [`ReadAt`] source.
pub struct RangeReader<'a, R: ReadAt> {
    reader: &'a R,
    pos: u64,
    end: u64,
}

impl<'a, R: ReadAt> RangeReader<'a, R> {
    pub fn new(reader: &'a R, offset: u64, len: u64) -> Self {
        Self {
            reader,
            pos: offset,
            end: offset.saturating_add(len),
        }
    }
}

impl<R: ReadAt> Read for RangeReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.end.saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let n = self.reader.read_at(self.pos, &mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

/// Decompressed content of one entry, read on demand.
pub enum EntryStream<'a, R: ReadAt> {
    Stored(RangeReader<'a, R>),
    Deflate(Box<DeflateDecoder<BufReader<RangeReader<'a, R>>>>),
}

impl<'a, R: ReadAt> EntryStream<'a, R> {
    pub fn stored(raw: RangeReader<'a, R>) -> Self {
        EntryStream::Stored(raw)
    }

    pub fn deflate(raw: RangeReader<'a, R>) -> Self {
        EntryStream::Deflate(Box::new(DeflateDecoder::new(BufReader::new(raw))))
    }
}

impl<R: ReadAt> Read for EntryStream<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            EntryStream::Stored(inner) => inner.read(buf),
            EntryStream::Deflate(inner) => inner.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::Write;

    #[test]
    fn test_range_reader_bounds() {
        let source = MemoryReader::new(b"headerPAYLOADtrailer".to_vec());
        let mut out = String::new();
        RangeReader::new(&source, 6, 7)
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "PAYLOAD");
    }

    #[test]
    fn test_deflate_stream() {
        let text = b"<w:document>hello hello hello hello</w:document>";
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut bytes = b"junk".to_vec();
        bytes.extend_from_slice(&compressed);
        bytes.extend_from_slice(b"more junk");
        let source = MemoryReader::new(bytes);

        let mut stream = EntryStream::deflate(RangeReader::new(&source, 4, compressed.len() as u64));
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, text);
    }
}
