//! Engine configuration
//!
//! All tuning constants live here rather than as scattered magic numbers:
//! streaming budgets, garbage-collection cadence, LOD ratios. Loaded from a
//! JSON file or built from `Default`.

use crate::core::types::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Streaming coordinator tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Hard ceiling on resident + in-flight streamed bytes
    pub pool_ceiling_bytes: usize,
    /// Default per-tick byte budget for starting new loads
    pub tick_budget_bytes: usize,
    /// Maximum concurrent asynchronous load operations
    pub max_concurrent_loads: usize,
    /// Resident entries whose importance falls below this are queued for release
    pub release_threshold: f32,
    /// Entries not drawn for this many frames are considered invisible
    pub stale_frame_count: u32,
    /// Upper bound on payload releases in one tick; the rest wait
    pub max_releases_per_tick: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            pool_ceiling_bytes: 256 * 1024 * 1024,
            tick_budget_bytes: 4 * 1024 * 1024,
            max_concurrent_loads: 4,
            release_threshold: 0.001,
            stale_frame_count: 300,
            max_releases_per_tick: 64,
        }
    }
}

/// Geometry pool garbage-collection tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Zero-refcount entries younger than this are kept to avoid reload thrash
    pub grace_window_secs: f32,
    /// How often the owning loop should run a collection pass
    pub gc_interval_frames: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            grace_window_secs: 4.0,
            gc_interval_frames: 32,
        }
    }
}

/// LOD selection tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    /// Permitted world-space error per meter of camera distance
    pub error_ratio: f32,
    /// Floor for a node's geometric error so flat sectors still coarsen
    pub min_geom_error: f32,
    /// Highest geometry LOD index a sector may be dropped to
    pub max_lod: u32,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            error_ratio: 0.004,
            min_geom_error: 0.05,
            max_lod: 5,
        }
    }
}

/// Terrain build parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Leaf sector edge length in meters (power of two)
    pub sector_size: i32,
    /// Heightmap unit size in meters
    pub unit_size: f32,
    /// Regions flatter than this stop subdividing before the leaf level
    pub flatness_threshold: f32,
    /// Sea level in meters
    pub ocean_level: f32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            sector_size: 64,
            unit_size: 1.0,
            flatness_threshold: 0.0,
            ocean_level: 0.0,
        }
    }
}

/// Top-level engine configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub streaming: StreamingConfig,
    pub pool: PoolConfig,
    pub lod: LodConfig,
    pub terrain: TerrainConfig,
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data)
            .map_err(|e| crate::core::Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::core::Error::Config(e.to_string()))
    }
}
