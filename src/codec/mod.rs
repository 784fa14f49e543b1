//! Chunked binary codec
//!
//! Versioned headers with explicit byte order, count-prefixed shared-name
//! tables, and stream adapters so the same load routine works over an
//! in-memory buffer or a file handle.

pub mod source;
pub mod sink;
pub mod header;
pub mod tables;

pub use source::{ChunkSource, SliceSource, FileSource};
pub use sink::ChunkSink;
pub use header::{
    TerrainChunkHeader, TerrainInfo, VisAreaChunkHeader,
    TERRAIN_CHUNK_VERSION, VISAREA_CHUNK_VERSION,
    FLAG_BIG_ENDIAN, FLAG_SECTOR_PALETTES, FLAG_INSTANCES_PRESORTED,
};
pub use tables::{SharedTables, InstanceGroupChunk, table_get, TABLE_NONE};

/// Byte order of a serialized payload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    /// Byte order of the host
    pub fn host() -> Endian {
        #[cfg(target_endian = "big")]
        {
            Endian::Big
        }
        #[cfg(target_endian = "little")]
        {
            Endian::Little
        }
    }
}
