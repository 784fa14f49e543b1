//! Sector mesh building
//!
//! Turns one sector's cell grid into a triangle mesh at a requested LOD.
//! LOD `n` keeps every `2^n`-th grid vertex; quads whose base cell is a
//! hole are skipped so holes punch through every LOD.

use crate::core::types::Vec3;
use crate::dispatch::scratch::ScratchSlot;
use crate::terrain::node::SectorKey;
use crate::terrain::range::RangeInfo;
use bytemuck::{Pod, Zeroable};

/// One mesh vertex, laid out for direct GPU upload
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TerrainVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// Packed 20-bit surface word of the source cell
    pub surface: u32,
}

/// Built triangle mesh for one sector at one LOD
#[derive(Debug)]
pub struct SectorMesh {
    pub vertices: Vec<TerrainVertex>,
    pub indices: Vec<u32>,
    pub lod: u8,
}

impl SectorMesh {
    pub fn footprint_bytes(&self) -> usize {
        self.vertices.len() * std::mem::size_of::<TerrainVertex>() + self.indices.len() * 4
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Everything a worker needs to mesh one sector without touching the tree
#[derive(Clone, Debug)]
pub struct SectorSnapshot {
    pub key: SectorKey,
    /// World position of the sector's min corner
    pub origin: Vec3,
    /// Meters between adjacent grid vertices at LOD 0
    pub step: f32,
    pub range: RangeInfo,
}

/// Build a sector mesh into `scratch`, then copy out exact-size buffers.
///
/// The scratch buffers keep their capacity across jobs; the returned mesh
/// owns tight allocations suitable for long-lived residency.
pub fn build_sector_mesh(snapshot: &SectorSnapshot, lod: u8, scratch: &mut ScratchSlot) -> SectorMesh {
    scratch.clear();
    let range = &snapshot.range;
    let grid = range.size as usize;
    if grid < 2 {
        return SectorMesh {
            vertices: Vec::new(),
            indices: Vec::new(),
            lod,
        };
    }

    // clamp the LOD so at least one quad survives
    let mut stride = 1usize << lod;
    while stride >= grid {
        stride >>= 1;
    }
    let verts_per_edge = (grid - 1) / stride + 1;

    let height = |vx: usize, vy: usize| {
        let x = (vx * stride).min(grid - 1);
        let y = (vy * stride).min(grid - 1);
        range.dequantize(range.cell(x, y).height_raw())
    };

    for vy in 0..verts_per_edge {
        for vx in 0..verts_per_edge {
            let cell = range.cell((vx * stride).min(grid - 1), (vy * stride).min(grid - 1));
            let h = range.dequantize(cell.height_raw());

            // central differences over the sampled grid
            let step = snapshot.step * stride as f32;
            let hl = if vx > 0 { height(vx - 1, vy) } else { h };
            let hr = if vx + 1 < verts_per_edge { height(vx + 1, vy) } else { h };
            let hd = if vy > 0 { height(vx, vy - 1) } else { h };
            let hu = if vy + 1 < verts_per_edge { height(vx, vy + 1) } else { h };
            let normal = Vec3::new(hl - hr, hd - hu, 2.0 * step).normalize_or_zero();

            scratch.vertices.push(TerrainVertex {
                position: [
                    snapshot.origin.x + (vx * stride) as f32 * snapshot.step,
                    snapshot.origin.y + (vy * stride) as f32 * snapshot.step,
                    h,
                ],
                normal: normal.to_array(),
                surface: cell.surface(),
            });
        }
    }

    for vy in 0..verts_per_edge - 1 {
        for vx in 0..verts_per_edge - 1 {
            let base_cell = range.cell((vx * stride).min(grid - 1), (vy * stride).min(grid - 1));
            if base_cell.is_hole() {
                continue;
            }
            let i0 = (vy * verts_per_edge + vx) as u32;
            let i1 = i0 + 1;
            let i2 = i0 + verts_per_edge as u32;
            let i3 = i2 + 1;
            scratch.indices.extend_from_slice(&[i0, i2, i1, i1, i2, i3]);
        }
    }

    SectorMesh {
        vertices: scratch.vertices.clone(),
        indices: scratch.indices.clone(),
        lod,
    }
}
