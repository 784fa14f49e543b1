//! Geometry asset payloads and disk I/O

use crate::core::Error;
use crate::core::types::Result;
use rkyv::{Archive, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// On-disk geometry payload
#[derive(Debug, Clone, Archive, Deserialize, Serialize)]
pub struct GeometryData {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

/// A loaded geometry asset, shared between all placements that reference it
#[derive(Debug)]
pub struct GeometryAsset {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl GeometryAsset {
    pub fn from_data(data: GeometryData) -> Self {
        Self {
            name: data.name,
            positions: data.positions,
            normals: data.normals,
            indices: data.indices,
        }
    }

    /// Approximate resident memory cost in bytes
    pub fn footprint_bytes(&self) -> usize {
        self.positions.len() * 12 + self.normals.len() * 12 + self.indices.len() * 4
    }

    /// Unit cube substituted for assets that fail to resolve, so a missing
    /// mesh shows up as a visible box instead of crashing the sector
    pub fn placeholder() -> Arc<GeometryAsset> {
        let positions = vec![
            [-0.5, -0.5, 0.0],
            [0.5, -0.5, 0.0],
            [0.5, 0.5, 0.0],
            [-0.5, 0.5, 0.0],
            [-0.5, -0.5, 1.0],
            [0.5, -0.5, 1.0],
            [0.5, 0.5, 1.0],
            [-0.5, 0.5, 1.0],
        ];
        let normals = vec![[0.0, 0.0, 1.0]; 8];
        let indices = vec![
            0, 1, 2, 0, 2, 3, // bottom
            4, 6, 5, 4, 7, 6, // top
            0, 4, 5, 0, 5, 1,
            1, 5, 6, 1, 6, 2,
            2, 6, 7, 2, 7, 3,
            3, 7, 4, 3, 4, 0,
        ];
        Arc::new(GeometryAsset {
            name: "placeholder_cube".to_string(),
            positions,
            normals,
            indices,
        })
    }
}

/// Serialize a geometry payload to bytes (uncompressed)
pub fn serialize_geometry(data: &GeometryData) -> Result<Vec<u8>> {
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(data)
        .map_err(|e| Error::Asset(e.to_string()))?;
    Ok(bytes.to_vec())
}

/// Deserialize a geometry payload from bytes (uncompressed)
pub fn deserialize_geometry(data: &[u8]) -> Result<GeometryData> {
    let archived = rkyv::access::<ArchivedGeometryData, rkyv::rancor::Error>(data)
        .map_err(|e| Error::Asset(e.to_string()))?;
    rkyv::deserialize::<GeometryData, rkyv::rancor::Error>(archived)
        .map_err(|e| Error::Asset(e.to_string()))
}

/// Serialize and LZ4-compress a geometry payload
pub fn compress_geometry(data: &GeometryData) -> Result<Vec<u8>> {
    let serialized = serialize_geometry(data)?;
    Ok(lz4_flex::compress_prepend_size(&serialized))
}

/// Decompress and deserialize a geometry payload
pub fn decompress_geometry(data: &[u8]) -> Result<GeometryData> {
    let decompressed = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| Error::Asset(format!("LZ4 decompression failed: {}", e)))?;
    deserialize_geometry(&decompressed)
}

/// File path for a named geometry asset under the asset root
pub fn geometry_path(base_dir: &Path, name: &str) -> PathBuf {
    let sanitized: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c.to_ascii_lowercase() })
        .collect();
    base_dir.join(format!("{}.tsg", sanitized))
}

/// Save a geometry asset to disk (compressed)
pub async fn save_geometry(base_dir: &Path, data: &GeometryData) -> Result<()> {
    let path = geometry_path(base_dir, &data.name);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let compressed = compress_geometry(data)?;
    tokio::fs::write(&path, compressed).await?;
    Ok(())
}

/// Load a geometry asset from disk (if it exists)
pub async fn load_geometry(base_dir: &Path, name: &str) -> Result<Option<GeometryData>> {
    let path = geometry_path(base_dir, name);
    if !path.exists() {
        return Ok(None);
    }
    let compressed = tokio::fs::read(&path).await?;
    Ok(Some(decompress_geometry(&compressed)?))
}
