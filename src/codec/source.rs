//! Stream sources for chunk loading
//!
//! One load routine serves both hot-reload buffers and files on disk: the
//! source trait exposes raw byte reads plus position tracking, and the
//! endian-aware scalar readers live on top as provided methods.

use crate::codec::Endian;
use crate::core::Error;
use crate::core::types::Result;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// A readable chunk payload: an in-memory slice or a file
pub trait ChunkSource {
    /// Fill `out` completely or fail
    fn read_bytes(&mut self, out: &mut [u8]) -> Result<()>;

    /// Bytes consumed so far
    fn position(&self) -> usize;

    /// Bytes still available
    fn remaining(&self) -> usize;

    fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_bytes(&mut b)?;
        Ok(b[0])
    }

    fn read_u16(&mut self, endian: Endian) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_bytes(&mut b)?;
        Ok(match endian {
            Endian::Little => u16::from_le_bytes(b),
            Endian::Big => u16::from_be_bytes(b),
        })
    }

    fn read_i16(&mut self, endian: Endian) -> Result<i16> {
        Ok(self.read_u16(endian)? as i16)
    }

    fn read_u32(&mut self, endian: Endian) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_bytes(&mut b)?;
        Ok(match endian {
            Endian::Little => u32::from_le_bytes(b),
            Endian::Big => u32::from_be_bytes(b),
        })
    }

    fn read_i32(&mut self, endian: Endian) -> Result<i32> {
        Ok(self.read_u32(endian)? as i32)
    }

    fn read_f32(&mut self, endian: Endian) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32(endian)?))
    }

    /// Length-prefixed UTF-8 string (u16 length)
    fn read_string(&mut self, endian: Endian) -> Result<String> {
        let len = self.read_u16(endian)? as usize;
        if len > self.remaining() {
            return Err(Error::Corrupt(format!(
                "string length {} exceeds {} remaining bytes",
                len,
                self.remaining()
            )));
        }
        let mut bytes = vec![0u8; len];
        self.read_bytes(&mut bytes)?;
        String::from_utf8(bytes).map_err(|e| Error::Corrupt(format!("invalid string: {}", e)))
    }
}

/// Source over a borrowed in-memory buffer
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl ChunkSource for SliceSource<'_> {
    fn read_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        if self.pos + out.len() > self.data.len() {
            return Err(Error::Corrupt(format!(
                "read of {} bytes at offset {} overruns {}-byte buffer",
                out.len(),
                self.pos,
                self.data.len()
            )));
        }
        out.copy_from_slice(&self.data[self.pos..self.pos + out.len()]);
        self.pos += out.len();
        Ok(())
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

/// Source over an open file
pub struct FileSource {
    file: File,
    pos: usize,
    len: usize,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len() as usize;
        Ok(Self { file, pos: 0, len })
    }
}

impl ChunkSource for FileSource {
    fn read_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        if self.pos + out.len() > self.len {
            return Err(Error::Corrupt(format!(
                "read of {} bytes at offset {} overruns {}-byte file",
                out.len(),
                self.pos,
                self.len
            )));
        }
        self.file.read_exact(out)?;
        self.pos += out.len();
        Ok(())
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.len - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_slice_source_scalars() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x11223344u32.to_le_bytes());
        data.extend_from_slice(&1.5f32.to_le_bytes());

        let mut src = SliceSource::new(&data);
        assert_eq!(src.read_u32(Endian::Little).expect("read failed"), 0x11223344);
        assert_eq!(src.read_f32(Endian::Little).expect("read failed"), 1.5);
        assert_eq!(src.position(), 8);
        assert_eq!(src.remaining(), 0);
    }

    #[test]
    fn test_slice_source_big_endian() {
        let data = 0x11223344u32.to_be_bytes();
        let mut src = SliceSource::new(&data);
        assert_eq!(src.read_u32(Endian::Big).expect("read failed"), 0x11223344);
    }

    #[test]
    fn test_slice_source_overrun_is_corrupt() {
        let data = [0u8; 2];
        let mut src = SliceSource::new(&data);
        let err = src.read_u32(Endian::Little).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }

    #[test]
    fn test_string_roundtrip() {
        let mut data = Vec::new();
        data.extend_from_slice(&5u16.to_le_bytes());
        data.extend_from_slice(b"rocks");

        let mut src = SliceSource::new(&data);
        assert_eq!(src.read_string(Endian::Little).expect("read failed"), "rocks");
    }

    #[test]
    fn test_string_bad_length_is_corrupt() {
        let mut data = Vec::new();
        data.extend_from_slice(&100u16.to_le_bytes());
        data.extend_from_slice(b"xy");

        let mut src = SliceSource::new(&data);
        assert!(matches!(src.read_string(Endian::Little), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_file_source_matches_slice_source() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&7u32.to_le_bytes());
        payload.extend_from_slice(&42u16.to_le_bytes());

        let mut file = tempfile::NamedTempFile::new().expect("tempfile failed");
        file.write_all(&payload).expect("write failed");

        let mut src = FileSource::open(file.path()).expect("open failed");
        assert_eq!(src.remaining(), payload.len());
        assert_eq!(src.read_u32(Endian::Little).expect("read failed"), 7);
        assert_eq!(src.read_u16(Endian::Little).expect("read failed"), 42);
        assert_eq!(src.remaining(), 0);
    }
}
