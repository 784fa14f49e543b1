//! Serialization sink with a count-only mode
//!
//! Export runs the same code path twice: once with no backing buffer to
//! measure the exact byte size, then once for real. Any drift between the
//! two passes is a bug, so both go through this single writer.

use crate::codec::Endian;

/// Byte sink that either writes into a buffer or just counts
pub struct ChunkSink {
    buf: Option<Vec<u8>>,
    written: usize,
    endian: Endian,
}

impl ChunkSink {
    /// Sink that accumulates bytes
    pub fn writing(endian: Endian) -> Self {
        Self {
            buf: Some(Vec::new()),
            written: 0,
            endian,
        }
    }

    /// Sink that only measures; `write_*` calls advance the count
    pub fn counting(endian: Endian) -> Self {
        Self {
            buf: None,
            written: 0,
            endian,
        }
    }

    /// Target byte order of this sink
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Bytes written (or counted) so far
    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// True when this sink is only measuring
    pub fn is_counting(&self) -> bool {
        self.buf.is_none()
    }

    /// Consume the sink and return the accumulated bytes (empty when counting)
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.unwrap_or_default()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if let Some(buf) = &mut self.buf {
            buf.extend_from_slice(bytes);
        }
        self.written += bytes.len();
    }

    pub fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    pub fn write_u16(&mut self, v: u16) {
        let b = match self.endian {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        };
        self.write_bytes(&b);
    }

    pub fn write_i16(&mut self, v: i16) {
        self.write_u16(v as u16);
    }

    pub fn write_u32(&mut self, v: u32) {
        let b = match self.endian {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        };
        self.write_bytes(&b);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write_u32(v as u32);
    }

    pub fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    /// Length-prefixed UTF-8 string (u16 length). Names longer than the
    /// prefix can express are truncated so the bytes written always match
    /// the prefix.
    pub fn write_string(&mut self, s: &str) {
        debug_assert!(
            s.len() <= u16::MAX as usize,
            "string of {} bytes overflows the u16 length prefix",
            s.len()
        );
        let bytes = &s.as_bytes()[..s.len().min(u16::MAX as usize)];
        self.write_u16(bytes.len() as u16);
        self.write_bytes(bytes);
    }
}
