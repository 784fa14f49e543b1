//! Chunk headers
//!
//! Every persisted chunk opens with a fixed-size header carrying a format
//! version, the total chunk size, and a flags word. The big-endian flag is
//! the one field that must be readable before the byte order is known, so
//! it is probed from the raw flag bytes first and the rest of the header is
//! parsed field by field with the discovered order.

use crate::codec::{ChunkSink, ChunkSource, Endian};
use crate::core::Error;
use crate::core::types::Result;

/// Current terrain chunk format version
pub const TERRAIN_CHUNK_VERSION: i32 = 29;
/// Current visibility-area chunk format version
pub const VISAREA_CHUNK_VERSION: i32 = 12;

/// Payload scalars are big-endian
pub const FLAG_BIG_ENDIAN: u32 = 1 << 0;
/// Sector records carry per-sector surface palettes
pub const FLAG_SECTOR_PALETTES: u32 = 1 << 1;
/// Instance lists were sorted by group at export time
pub const FLAG_INSTANCES_PRESORTED: u32 = 1 << 2;

/// Probe the flags word of a header and return the payload byte order.
///
/// The big-endian bit occupies the low bit of the flags word, so a
/// big-endian writer leaves it set when the raw bytes are read back
/// big-endian, and clear otherwise.
fn probe_endian(raw_flags: [u8; 4]) -> Endian {
    if u32::from_be_bytes(raw_flags) & FLAG_BIG_ENDIAN != 0 {
        Endian::Big
    } else {
        Endian::Little
    }
}

/// Global terrain parameters stored in the terrain chunk header
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainInfo {
    /// Heightmap size in units along one edge
    pub heightmap_units: i32,
    /// Size of one heightmap unit in meters
    pub unit_size: f32,
    /// Leaf sector edge length in units
    pub sector_size: i32,
    /// Number of leaf sectors along one edge
    pub sectors_table_size: i32,
    /// Meters of height per quantized height step
    pub height_ratio: f32,
    /// Sea level in meters
    pub ocean_level: f32,
}

impl TerrainInfo {
    pub const SIZE: usize = 24;

    pub fn write(&self, sink: &mut ChunkSink) {
        sink.write_i32(self.heightmap_units);
        sink.write_f32(self.unit_size);
        sink.write_i32(self.sector_size);
        sink.write_i32(self.sectors_table_size);
        sink.write_f32(self.height_ratio);
        sink.write_f32(self.ocean_level);
    }

    pub fn read(src: &mut dyn ChunkSource, endian: Endian) -> Result<Self> {
        Ok(Self {
            heightmap_units: src.read_i32(endian)?,
            unit_size: src.read_f32(endian)?,
            sector_size: src.read_i32(endian)?,
            sectors_table_size: src.read_i32(endian)?,
            height_ratio: src.read_f32(endian)?,
            ocean_level: src.read_f32(endian)?,
        })
    }
}

/// Header of a serialized terrain chunk
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainChunkHeader {
    pub version: i32,
    pub flags: u32,
    pub chunk_size: i32,
    pub info: TerrainInfo,
}

impl TerrainChunkHeader {
    /// version + reserved + flags + chunk_size + info
    pub const SIZE: usize = 16 + TerrainInfo::SIZE;

    pub fn write(&self, sink: &mut ChunkSink) {
        let mut flags = self.flags & !FLAG_BIG_ENDIAN;
        if sink.endian() == Endian::Big {
            flags |= FLAG_BIG_ENDIAN;
        }
        sink.write_i32(self.version);
        sink.write_i32(0);
        sink.write_u32(flags);
        sink.write_i32(self.chunk_size);
        self.info.write(sink);
    }

    /// Parse the header and return it with the payload byte order.
    ///
    /// Fails with `VersionMismatch` before touching anything else when the
    /// version does not match, and with `SizeMismatch` when the declared
    /// chunk size disagrees with the actual payload length.
    pub fn read(src: &mut dyn ChunkSource, actual_len: usize) -> Result<(Self, Endian)> {
        if src.remaining() < Self::SIZE {
            return Err(Error::Corrupt(format!(
                "chunk of {} bytes is smaller than the {}-byte header",
                src.remaining(),
                Self::SIZE
            )));
        }

        let mut raw = [0u8; Self::SIZE];
        src.read_bytes(&mut raw)?;

        let mut flag_bytes = [0u8; 4];
        flag_bytes.copy_from_slice(&raw[8..12]);
        let endian = probe_endian(flag_bytes);

        let mut fields = SliceFields { raw: &raw, pos: 0, endian };
        let version = fields.i32();
        let _reserved = fields.i32();
        let flags = fields.u32();
        let chunk_size = fields.i32();

        if version != TERRAIN_CHUNK_VERSION {
            return Err(Error::VersionMismatch {
                expected: TERRAIN_CHUNK_VERSION,
                found: version,
            });
        }
        if chunk_size as usize != actual_len {
            return Err(Error::SizeMismatch {
                declared: chunk_size as usize,
                actual: actual_len,
            });
        }

        let mut info_src = SliceFields { raw: &raw, pos: 16, endian };
        let info = TerrainInfo {
            heightmap_units: info_src.i32(),
            unit_size: info_src.f32(),
            sector_size: info_src.i32(),
            sectors_table_size: info_src.i32(),
            height_ratio: info_src.f32(),
            ocean_level: info_src.f32(),
        };

        Ok((
            Self {
                version,
                flags,
                chunk_size,
                info,
            },
            endian,
        ))
    }
}

/// Header of a serialized visibility-area chunk
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisAreaChunkHeader {
    pub version: i32,
    pub flags: u32,
    pub chunk_size: i32,
    pub area_count: i32,
    pub portal_count: i32,
    pub occluder_count: i32,
}

impl VisAreaChunkHeader {
    pub const SIZE: usize = 28;

    pub fn write(&self, sink: &mut ChunkSink) {
        let mut flags = self.flags & !FLAG_BIG_ENDIAN;
        if sink.endian() == Endian::Big {
            flags |= FLAG_BIG_ENDIAN;
        }
        sink.write_i32(self.version);
        sink.write_i32(0);
        sink.write_u32(flags);
        sink.write_i32(self.chunk_size);
        sink.write_i32(self.area_count);
        sink.write_i32(self.portal_count);
        sink.write_i32(self.occluder_count);
    }

    pub fn read(src: &mut dyn ChunkSource, actual_len: usize) -> Result<(Self, Endian)> {
        if src.remaining() < Self::SIZE {
            return Err(Error::Corrupt(format!(
                "chunk of {} bytes is smaller than the {}-byte header",
                src.remaining(),
                Self::SIZE
            )));
        }

        let mut raw = [0u8; Self::SIZE];
        src.read_bytes(&mut raw)?;

        let mut flag_bytes = [0u8; 4];
        flag_bytes.copy_from_slice(&raw[8..12]);
        let endian = probe_endian(flag_bytes);

        let mut fields = SliceFields { raw: &raw, pos: 0, endian };
        let version = fields.i32();
        let _reserved = fields.i32();
        let flags = fields.u32();
        let chunk_size = fields.i32();
        let area_count = fields.i32();
        let portal_count = fields.i32();
        let occluder_count = fields.i32();

        if version != VISAREA_CHUNK_VERSION {
            return Err(Error::VersionMismatch {
                expected: VISAREA_CHUNK_VERSION,
                found: version,
            });
        }
        if chunk_size as usize != actual_len {
            return Err(Error::SizeMismatch {
                declared: chunk_size as usize,
                actual: actual_len,
            });
        }

        Ok((
            Self {
                version,
                flags,
                chunk_size,
                area_count,
                portal_count,
                occluder_count,
            },
            endian,
        ))
    }
}

/// Per-field reader over an already-buffered header
struct SliceFields<'a> {
    raw: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl SliceFields<'_> {
    fn u32(&mut self) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.raw[self.pos..self.pos + 4]);
        self.pos += 4;
        match self.endian {
            Endian::Little => u32::from_le_bytes(b),
            Endian::Big => u32::from_be_bytes(b),
        }
    }

    fn i32(&mut self) -> i32 {
        self.u32() as i32
    }

    fn f32(&mut self) -> f32 {
        f32::from_bits(self.u32())
    }
}
