//! Quadtree terrain nodes
//!
//! The terrain is a quadtree of sectors. Every node, leaf or not, carries
//! its own cell grid at that level's step so a distant sector can render
//! from a coarse interior node without touching its children. Leaves
//! additionally own the object placements inside them.

use crate::assets::GeometryHandle;
use crate::core::config::LodConfig;
use crate::core::types::Vec3;
use crate::dispatch::SectorMesh;
use crate::math::Aabb;
use crate::terrain::range::RangeInfo;
use std::sync::Arc;

/// Sentinel for a geometric error not yet computed
pub const GEOM_ERROR_NOT_SET: f32 = -1.0;

/// Identity of a sector in the quadtree
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SectorKey {
    /// Origin in heightmap units
    pub x: u32,
    pub y: u32,
    /// 0 at the leaves, increasing toward the root
    pub level: u8,
}

/// What kind of object a placement is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementKind {
    Vegetation,
    Brush,
    Decoration,
}

impl PlacementKind {
    /// Bit used by export filters
    pub fn bit(&self) -> u32 {
        match self {
            PlacementKind::Vegetation => 1 << 0,
            PlacementKind::Brush => 1 << 1,
            PlacementKind::Decoration => 1 << 2,
        }
    }
}

/// One placed object inside a leaf sector
#[derive(Clone, Debug)]
pub struct Placement {
    pub kind: PlacementKind,
    /// Index into the terrain's instance groups, or -1 for standalone brushes
    pub group_index: i32,
    pub geometry: Option<GeometryHandle>,
    pub material: Option<String>,
    pub position: Vec3,
    pub scale: f32,
    pub rotation_z: f32,
    pub layer_id: u16,
}

/// Renderable state owned only by leaf sectors
#[derive(Debug, Default)]
pub struct LeafData {
    pub mesh: Option<Arc<SectorMesh>>,
    pub placements: Vec<Placement>,
}

/// One quadtree sector
#[derive(Debug)]
pub struct TerrainNode {
    /// Origin in heightmap units
    pub origin_x: u32,
    pub origin_y: u32,
    /// 0 at the leaves, increasing toward the root
    pub tree_level: u8,
    pub children: Option<Box<[TerrainNode; 4]>>,
    /// World-space bounds including object extension above the heightfield
    pub bbox: Aabb,
    /// Extra height added to the bbox by placed objects
    pub bbox_extension: f32,
    pub range_info: RangeInfo,
    /// Cached max height deviation of dropping one resolution step
    geom_error: f32,
    /// Geometry LOD the sector last rendered at
    pub geom_lod: u8,
    /// Frame counter of the last time this sector was used
    pub last_time_used: u32,
    pub has_holes: bool,
    pub leaf_data: Option<Box<LeafData>>,
}

impl TerrainNode {
    pub fn new(origin_x: u32, origin_y: u32, tree_level: u8) -> Self {
        Self {
            origin_x,
            origin_y,
            tree_level,
            children: None,
            bbox: Aabb::RESET,
            bbox_extension: 0.0,
            range_info: RangeInfo::default(),
            geom_error: GEOM_ERROR_NOT_SET,
            geom_lod: 0,
            last_time_used: 0,
            has_holes: false,
            leaf_data: None,
        }
    }

    pub fn key(&self) -> SectorKey {
        SectorKey {
            x: self.origin_x,
            y: self.origin_y,
            level: self.tree_level,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Edge length in heightmap units at this node's level
    pub fn units_span(&self, units_to_sector_shift: u32) -> u32 {
        1 << (units_to_sector_shift + self.tree_level as u32)
    }

    /// Recompute this node's world bbox from its cell grid, lifted by the
    /// object extension, then fold in the children
    pub fn update_bbox(&mut self, unit_size: f32, units_to_sector_shift: u32) {
        let span = self.units_span(units_to_sector_shift) as f32 * unit_size;
        let (z_min, z_max) = self.range_info.height_bounds();
        let min = Vec3::new(
            self.origin_x as f32 * unit_size,
            self.origin_y as f32 * unit_size,
            z_min,
        );
        let max = Vec3::new(
            min.x + span,
            min.y + span,
            z_max + self.bbox_extension,
        );
        self.bbox = Aabb::new(min, max);
        if let Some(children) = &self.children {
            for child in children.iter() {
                self.bbox.add_aabb(&child.bbox);
            }
        }
        self.has_holes = self.range_info.has_holes();
    }

    /// Raise the bbox to cover an object reaching `top_z`
    pub fn extend_bbox_for_object(&mut self, top_z: f32) {
        if top_z > self.bbox.max.z {
            self.bbox_extension = self
                .bbox_extension
                .max(top_z - (self.bbox.max.z - self.bbox_extension));
            self.bbox.max.z = self.bbox.max.z.max(top_z);
        }
    }

    /// Geometric error of rendering this sector one resolution step
    /// coarser, computed on first use and cached until the grid changes
    pub fn geom_error(&mut self) -> f32 {
        if self.geom_error == GEOM_ERROR_NOT_SET || self.range_info.modified {
            self.geom_error = compute_geom_error(&self.range_info);
            self.range_info.modified = false;
        }
        self.geom_error
    }

    /// Invalidate the cached error after edits
    pub fn invalidate_geom_error(&mut self) {
        self.geom_error = GEOM_ERROR_NOT_SET;
    }

    /// Pick the geometry LOD for a viewer at `distance` meters.
    ///
    /// Starts at full resolution and coarsens while the screen-space
    /// error stays inside the budget; each step doubles the world-space
    /// error, so the permitted error grows linearly with distance.
    pub fn select_lod(&mut self, distance: f32, cfg: &LodConfig) -> u8 {
        let base_error = self.geom_error().max(cfg.min_geom_error);
        let mut lod = 0u32;
        while lod < cfg.max_lod
            && base_error * (1u32 << (lod + 1)) as f32 <= distance * cfg.error_ratio
        {
            lod += 1;
        }
        self.geom_lod = lod as u8;
        self.geom_lod
    }

    /// Mark the node used this frame
    pub fn touch(&mut self, frame: u32) {
        self.last_time_used = frame;
    }

    /// Collect keys of the leaf sectors whose bbox intersects `area`
    pub fn intersect_box(&self, area: &Aabb, out: &mut Vec<SectorKey>) {
        if !self.bbox.intersects(area) {
            return;
        }
        match &self.children {
            Some(children) => {
                for child in children.iter() {
                    child.intersect_box(area, out);
                }
            }
            None => out.push(self.key()),
        }
    }

    /// Smallest node whose bbox fully contains `area`
    pub fn find_min_node_containing_box(&self, area: &Aabb) -> Option<&TerrainNode> {
        if !self.bbox.contains_aabb(area) {
            return None;
        }
        if let Some(children) = &self.children {
            for child in children.iter() {
                if let Some(found) = child.find_min_node_containing_box(area) {
                    return Some(found);
                }
            }
        }
        Some(self)
    }

    /// Drop built meshes, optionally limited to an area, optionally
    /// descending into children
    pub fn release_geometry(&mut self, area: Option<&Aabb>, recursive: bool) {
        if let Some(area) = area {
            if !self.bbox.intersects(area) {
                return;
            }
        }
        if let Some(leaf) = &mut self.leaf_data {
            leaf.mesh = None;
        }
        if recursive {
            if let Some(children) = &mut self.children {
                for child in children.iter_mut() {
                    child.release_geometry(area, true);
                }
            }
        }
    }

    /// Visit every leaf under this node
    pub fn for_each_leaf<'a>(&'a self, visit: &mut dyn FnMut(&'a TerrainNode)) {
        match &self.children {
            Some(children) => {
                for child in children.iter() {
                    child.for_each_leaf(visit);
                }
            }
            None => visit(self),
        }
    }

    pub fn for_each_leaf_mut(&mut self, visit: &mut dyn FnMut(&mut TerrainNode)) {
        match &mut self.children {
            Some(children) => {
                for child in children.iter_mut() {
                    child.for_each_leaf_mut(visit);
                }
            }
            None => visit(self),
        }
    }

    /// Find a node by key
    pub fn find_node_mut(&mut self, key: SectorKey) -> Option<&mut TerrainNode> {
        if self.key() == key {
            return Some(self);
        }
        if self.tree_level <= key.level {
            return None;
        }
        if let Some(children) = &mut self.children {
            for child in children.iter_mut() {
                if let Some(found) = child.find_node_mut(key) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Total node count of this subtree
    pub fn count_nodes(&self) -> usize {
        1 + self
            .children
            .as_ref()
            .map(|c| c.iter().map(|n| n.count_nodes()).sum())
            .unwrap_or(0)
    }
}

/// Max height deviation introduced by skipping every other grid vertex.
///
/// Odd vertices are compared against the linear interpolation of their
/// even neighbors, which is exactly what a one-step-coarser mesh renders
/// in their place.
fn compute_geom_error(range: &RangeInfo) -> f32 {
    let size = range.size as usize;
    if size < 3 {
        return 0.0;
    }
    let h = |x: usize, y: usize| range.dequantize(range.cell(x, y).height_raw());
    let mut worst = 0.0f32;
    for y in 0..size {
        for x in 0..size {
            let interp = match (x & 1, y & 1) {
                (0, 0) => continue,
                (1, 0) => (h(x - 1, y) + h(x + 1, y)) * 0.5,
                (0, 1) => (h(x, y - 1) + h(x, y + 1)) * 0.5,
                _ => (h(x - 1, y - 1) + h(x + 1, y + 1)) * 0.5,
            };
            worst = worst.max((h(x, y) - interp).abs());
        }
    }
    worst
}
