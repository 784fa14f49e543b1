//! Terrain quadtree
//!
//! Owns the root node, the global heightmap parameters, and the instance
//! groups shared by vegetation placements. Building samples a heightfield
//! source top-down; subdivision stops early over regions whose height
//! span stays inside the flatness threshold, so the tree is sparse over
//! oceans and plains.

use crate::assets::{GeometryHandle, GeometryPool};
use crate::codec::InstanceGroupChunk;
use crate::core::Error;
use crate::core::config::TerrainConfig;
use crate::core::types::{Result, Vec3};
use crate::dispatch::{SectorMesh, SectorSnapshot};
use crate::math::Aabb;
use crate::terrain::cell::{HeightCell, SurfaceBlend};
use crate::terrain::node::{Placement, PlacementKind, SectorKey, TerrainNode};
use crate::terrain::range::RangeInfo;
use std::sync::Arc;

/// Samples feeding the terrain build
pub trait HeightfieldSource {
    /// Height in meters at a unit position
    fn height_at(&self, x_units: u32, y_units: u32) -> f32;

    /// Global surface type id at a unit position
    fn surface_at(&self, x_units: u32, y_units: u32) -> u8;

    /// True where the terrain has a hole
    fn is_hole(&self, _x_units: u32, _y_units: u32) -> bool {
        false
    }
}

/// Receiver for authoritative height data. Notified once per structural
/// rebuild, never per frame.
pub trait HeightfieldSink {
    fn heightfield_rebuilt(&mut self, region: &Aabb, terrain: &Terrain);
}

/// Runtime form of an instance group: the serialized record plus a live
/// handle on its geometry
pub struct InstanceGroup {
    pub chunk: InstanceGroupChunk,
    /// Material name, resolved through the shared tables on load
    pub material: Option<String>,
    pub handle: Option<GeometryHandle>,
}

/// The terrain quadtree and its global parameters
pub struct Terrain {
    pub root: TerrainNode,
    /// Meters per heightmap unit
    pub unit_size: f32,
    /// Heightmap units along one edge
    pub terrain_size_units: u32,
    /// Units per leaf sector
    pub sector_size: i32,
    /// log2 of `sector_size`
    pub units_to_sector_shift: u32,
    /// Leaf sectors along one edge
    pub sectors_table_size: i32,
    /// Meters per global quantization step
    pub height_ratio: f32,
    pub ocean_level: f32,
    pub groups: Vec<InstanceGroup>,
    /// Bumped whenever the tree is rebuilt from scratch
    pub(crate) rebuild_serial: u64,
    pub(crate) published_serial: u64,
}

impl Terrain {
    /// Build a terrain by sampling `source` over a square heightmap.
    ///
    /// `terrain_size_units` and the configured sector size must both be
    /// powers of two.
    pub fn build(
        cfg: &TerrainConfig,
        terrain_size_units: u32,
        source: &dyn HeightfieldSource,
    ) -> Result<Terrain> {
        let sector_size = cfg.sector_size;
        if sector_size <= 0 || !(sector_size as u32).is_power_of_two() {
            return Err(Error::Config(format!(
                "sector_size {} is not a power of two",
                sector_size
            )));
        }
        if terrain_size_units < sector_size as u32 || !terrain_size_units.is_power_of_two() {
            return Err(Error::Config(format!(
                "terrain size {} units is not a power-of-two multiple of sector size {}",
                terrain_size_units, sector_size
            )));
        }

        let units_to_sector_shift = (sector_size as u32).trailing_zeros();
        let root_level = (terrain_size_units / sector_size as u32).trailing_zeros() as u8;

        let mut terrain = Terrain {
            root: TerrainNode::new(0, 0, root_level),
            unit_size: cfg.unit_size,
            terrain_size_units,
            sector_size,
            units_to_sector_shift,
            sectors_table_size: (terrain_size_units / sector_size as u32) as i32,
            height_ratio: 0.0,
            ocean_level: cfg.ocean_level,
            groups: Vec::new(),
            rebuild_serial: 1,
            published_serial: 0,
        };

        let mut root = TerrainNode::new(0, 0, root_level);
        terrain.build_node(&mut root, source, cfg.flatness_threshold);
        terrain.height_ratio = root.range_info.scale;
        terrain.root = root;

        log::info!(
            "built terrain: {} units, {} levels, {} nodes",
            terrain_size_units,
            root_level + 1,
            terrain.root.count_nodes()
        );
        Ok(terrain)
    }

    fn build_node(
        &self,
        node: &mut TerrainNode,
        source: &dyn HeightfieldSource,
        flatness_threshold: f32,
    ) {
        let grid_size = self.sector_size as u16 + 1;
        let step = 1u32 << node.tree_level;
        let mut range = RangeInfo::with_size(grid_size);

        let sample_clamped = |ux: u32, uy: u32| {
            let max = self.terrain_size_units - 1;
            (ux.min(max), uy.min(max))
        };

        let mut lo = f32::MAX;
        let mut hi = f32::MIN;
        for gy in 0..grid_size as u32 {
            for gx in 0..grid_size as u32 {
                let (ux, uy) = sample_clamped(node.origin_x + gx * step, node.origin_y + gy * step);
                let h = source.height_at(ux, uy);
                lo = lo.min(h);
                hi = hi.max(h);
            }
        }
        range.set_range(lo, hi);

        for gy in 0..grid_size as u32 {
            for gx in 0..grid_size as u32 {
                let (ux, uy) = sample_clamped(node.origin_x + gx * step, node.origin_y + gy * step);
                let raw = range.quantize(source.height_at(ux, uy));
                let surface = if source.is_hole(ux, uy) {
                    SurfaceBlend::hole()
                } else {
                    SurfaceBlend::single(range.palette.local(source.surface_at(ux, uy)))
                };
                range.set_cell(gx as usize, gy as usize, HeightCell::new(raw, surface.encode()));
            }
        }
        range.update_bit_shift(self.units_to_sector_shift + node.tree_level as u32);
        range.modified = false;
        node.range_info = range;

        let span = hi - lo;
        // a stride sample misses holes between samples; holes must reach a
        // full-resolution leaf
        let subdivide = node.tree_level > 0
            && (span > flatness_threshold || self.region_has_hole(node, source));
        if subdivide {
            let half = (self.sector_size as u32) << (node.tree_level as u32 - 1);
            let mut children = Vec::with_capacity(4);
            for iy in 0..2u32 {
                for ix in 0..2u32 {
                    let mut child = TerrainNode::new(
                        node.origin_x + ix * half,
                        node.origin_y + iy * half,
                        node.tree_level - 1,
                    );
                    self.build_node(&mut child, source, flatness_threshold);
                    children.push(child);
                }
            }
            match <[TerrainNode; 4]>::try_from(children) {
                Ok(array) => node.children = Some(Box::new(array)),
                Err(_) => unreachable!(),
            }
        } else {
            node.leaf_data = Some(Box::default());
        }
        node.update_bbox(self.unit_size, self.units_to_sector_shift);
    }

    /// Unit-resolution hole scan over a node's footprint
    fn region_has_hole(&self, node: &TerrainNode, source: &dyn HeightfieldSource) -> bool {
        let span = (self.sector_size as u32) << node.tree_level as u32;
        let x1 = (node.origin_x + span).min(self.terrain_size_units);
        let y1 = (node.origin_y + span).min(self.terrain_size_units);
        for uy in node.origin_y..y1 {
            for ux in node.origin_x..x1 {
                if source.is_hole(ux, uy) {
                    return true;
                }
            }
        }
        false
    }

    /// Register an instance group, acquiring its geometry from the pool.
    /// Returns the group index placements refer to.
    pub fn register_group(&mut self, pool: &GeometryPool, chunk: InstanceGroupChunk) -> i32 {
        let handle = if chunk.geometry_path.is_empty() {
            None
        } else {
            Some(pool.acquire(&chunk.geometry_path))
        };
        self.groups.push(InstanceGroup {
            chunk,
            material: None,
            handle,
        });
        (self.groups.len() - 1) as i32
    }

    fn world_to_units(&self, x: f32, y: f32) -> Option<(u32, u32)> {
        if x < 0.0 || y < 0.0 {
            return None;
        }
        let ux = (x / self.unit_size) as u32;
        let uy = (y / self.unit_size) as u32;
        if ux >= self.terrain_size_units || uy >= self.terrain_size_units {
            return None;
        }
        Some((ux, uy))
    }

    /// Terrain height at a world position, ocean level outside the map
    pub fn height_at(&self, x: f32, y: f32) -> f32 {
        let Some((ux, uy)) = self.world_to_units(x, y) else {
            return self.ocean_level;
        };
        let mut node = &self.root;
        while let Some(children) = &node.children {
            let half = (1u32 << (self.units_to_sector_shift + node.tree_level as u32)) / 2;
            let ix = ((ux - node.origin_x) >= half) as usize;
            let iy = ((uy - node.origin_y) >= half) as usize;
            node = &children[iy * 2 + ix];
        }
        node.range_info
            .height_at_units(ux - node.origin_x, uy - node.origin_y)
    }

    /// True when the cell at a world position is a hole
    pub fn is_hole_at(&self, x: f32, y: f32) -> bool {
        let Some((ux, uy)) = self.world_to_units(x, y) else {
            return false;
        };
        let mut node = &self.root;
        while let Some(children) = &node.children {
            let half = (1u32 << (self.units_to_sector_shift + node.tree_level as u32)) / 2;
            let ix = ((ux - node.origin_x) >= half) as usize;
            let iy = ((uy - node.origin_y) >= half) as usize;
            node = &children[iy * 2 + ix];
        }
        node.range_info
            .cell_at_units(ux - node.origin_x, uy - node.origin_y)
            .is_hole()
    }

    /// Place a vegetation instance from a registered group
    pub fn add_vegetation(
        &mut self,
        group_index: i32,
        position: Vec3,
        scale: f32,
        rotation_z: f32,
        layer_id: u16,
    ) -> Result<()> {
        let group = self
            .groups
            .get(group_index as usize)
            .ok_or_else(|| Error::Asset(format!("unknown instance group {}", group_index)))?;
        let placement = Placement {
            kind: PlacementKind::Vegetation,
            group_index,
            geometry: group.handle.clone(),
            material: None,
            position,
            scale,
            rotation_z,
            layer_id,
        };
        let top_z = position.z + group.chunk.size * scale;
        self.insert_placement(placement, top_z)
    }

    /// Place a standalone brush object
    #[allow(clippy::too_many_arguments)]
    pub fn add_brush(
        &mut self,
        pool: &GeometryPool,
        geometry_path: &str,
        material: Option<String>,
        position: Vec3,
        scale: f32,
        rotation_z: f32,
        layer_id: u16,
        height: f32,
    ) -> Result<()> {
        let placement = Placement {
            kind: PlacementKind::Brush,
            group_index: -1,
            geometry: Some(pool.acquire(geometry_path)),
            material,
            position,
            scale,
            rotation_z,
            layer_id,
        };
        self.insert_placement(placement, position.z + height * scale)
    }

    pub fn insert_placement(&mut self, placement: Placement, top_z: f32) -> Result<()> {
        let Some((ux, uy)) = self.world_to_units(placement.position.x, placement.position.y)
        else {
            return Err(Error::Asset(format!(
                "placement at ({}, {}) is outside the terrain",
                placement.position.x, placement.position.y
            )));
        };
        let sector_shift = self.units_to_sector_shift;
        let mut node = &mut self.root;
        loop {
            node.extend_bbox_for_object(top_z);
            if node.children.is_none() {
                break;
            }
            let half = (1u32 << (sector_shift + node.tree_level as u32)) / 2;
            let ix = ((ux - node.origin_x) >= half) as usize;
            let iy = ((uy - node.origin_y) >= half) as usize;
            let children = node.children.as_mut().unwrap_or_else(|| unreachable!());
            node = &mut children[iy * 2 + ix];
        }
        node.leaf_data.get_or_insert_with(Box::default).placements.push(placement);
        Ok(())
    }

    /// Keys of leaf sectors intersecting a world-space box
    pub fn sectors_in_box(&self, area: &Aabb) -> Vec<SectorKey> {
        let mut keys = Vec::new();
        self.root.intersect_box(area, &mut keys);
        keys
    }

    /// Immutable snapshot of one sector's cell grid for off-thread meshing
    pub fn sector_snapshot(&self, key: SectorKey) -> Option<SectorSnapshot> {
        let node = self.find_node(key)?;
        Some(SectorSnapshot {
            key,
            origin: Vec3::new(
                node.origin_x as f32 * self.unit_size,
                node.origin_y as f32 * self.unit_size,
                0.0,
            ),
            step: self.unit_size * (1 << node.tree_level) as f32,
            range: node.range_info.clone(),
        })
    }

    fn find_node(&self, key: SectorKey) -> Option<&TerrainNode> {
        let mut node = &self.root;
        loop {
            if node.key() == key {
                return Some(node);
            }
            let children = node.children.as_ref()?;
            if node.tree_level <= key.level {
                return None;
            }
            let half = (1u32 << (self.units_to_sector_shift + node.tree_level as u32)) / 2;
            let ix = ((key.x - node.origin_x) >= half) as usize;
            let iy = ((key.y - node.origin_y) >= half) as usize;
            node = &children[iy * 2 + ix];
        }
    }

    /// Renderable mesh for a sector, if one is resident
    pub fn mesh_for(&self, key: SectorKey) -> Option<Arc<SectorMesh>> {
        self.find_node(key)?.leaf_data.as_ref()?.mesh.clone()
    }

    /// Publish a built mesh into its sector. Unknown keys (the sector was
    /// reloaded or trimmed while the job ran) are ignored.
    pub fn apply_mesh(&mut self, key: SectorKey, mesh: SectorMesh) -> bool {
        let Some(node) = self.root.find_node_mut(key) else {
            log::debug!(
                "dropping mesh for stale sector ({}, {}) level {}",
                key.x,
                key.y,
                key.level
            );
            return false;
        };
        node.leaf_data.get_or_insert_with(Box::default).mesh = Some(Arc::new(mesh));
        true
    }

    /// Drop resident sector meshes intersecting `area`, or everything when
    /// `area` is `None`. Nodes and cells stay; only geometry is released.
    pub fn release_geometry(&mut self, area: Option<&Aabb>) {
        self.root.release_geometry(area, true);
    }

    /// Notify `sink` of the current height data if the tree was rebuilt
    /// since the last publish. Returns whether a notification went out.
    pub fn publish_heightfield(&mut self, sink: &mut dyn HeightfieldSink) -> bool {
        if self.published_serial == self.rebuild_serial {
            return false;
        }
        self.published_serial = self.rebuild_serial;
        let region = self.root.bbox;
        sink.heightfield_rebuilt(&region, self);
        true
    }

    pub fn node_count(&self) -> usize {
        self.root.count_nodes()
    }
}

/// Constant-height source for tests and empty maps
pub struct FlatSource {
    pub height: f32,
    pub surface: u8,
}

impl HeightfieldSource for FlatSource {
    fn height_at(&self, _x: u32, _y: u32) -> f32 {
        self.height
    }

    fn surface_at(&self, _x: u32, _y: u32) -> u8 {
        self.surface
    }
}

/// Closure-backed source for tests
pub struct FnSource<H, S>
where
    H: Fn(u32, u32) -> f32,
    S: Fn(u32, u32) -> u8,
{
    pub height: H,
    pub surface: S,
    pub holes: fn(u32, u32) -> bool,
}

impl<H, S> HeightfieldSource for FnSource<H, S>
where
    H: Fn(u32, u32) -> f32,
    S: Fn(u32, u32) -> u8,
{
    fn height_at(&self, x: u32, y: u32) -> f32 {
        (self.height)(x, y)
    }

    fn surface_at(&self, x: u32, y: u32) -> u8 {
        (self.surface)(x, y)
    }

    fn is_hole(&self, x: u32, y: u32) -> bool {
        (self.holes)(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hilly_source() -> impl HeightfieldSource {
        FnSource {
            height: |x, y| (x as f32 * 0.7).sin() * 20.0 + (y as f32 * 0.3).cos() * 12.0 + 40.0,
            surface: |x, _y| if x > 32 { 3 } else { 1 },
            holes: |_x, _y| false,
        }
    }

    fn small_cfg() -> TerrainConfig {
        TerrainConfig {
            sector_size: 16,
            unit_size: 1.0,
            flatness_threshold: 0.0,
            ocean_level: -5.0,
        }
    }

    #[test]
    fn test_build_full_tree() {
        let terrain = Terrain::build(&small_cfg(), 64, &hilly_source()).expect("build failed");
        assert_eq!(terrain.root.tree_level, 2);
        assert_eq!(terrain.sectors_table_size, 4);
        // full quadtree: 1 + 4 + 16
        assert_eq!(terrain.node_count(), 21);
    }

    #[test]
    fn test_flat_regions_stop_subdividing() {
        let cfg = TerrainConfig {
            flatness_threshold: 1.0,
            ..small_cfg()
        };
        let terrain =
            Terrain::build(&cfg, 64, &FlatSource { height: 10.0, surface: 0 }).expect("build failed");
        assert_eq!(terrain.node_count(), 1);
        assert!(terrain.root.is_leaf());
    }

    #[test]
    fn test_bad_sizes_rejected() {
        assert!(Terrain::build(&small_cfg(), 60, &FlatSource { height: 0.0, surface: 0 }).is_err());
        let cfg = TerrainConfig { sector_size: 48, ..small_cfg() };
        assert!(Terrain::build(&cfg, 64, &FlatSource { height: 0.0, surface: 0 }).is_err());
    }

    #[test]
    fn test_height_query_matches_source() {
        let terrain = Terrain::build(&small_cfg(), 64, &hilly_source()).expect("build failed");
        let source = hilly_source();
        for (x, y) in [(0u32, 0u32), (13, 7), (33, 50), (63, 63)] {
            let sampled = terrain.height_at(x as f32, y as f32);
            let expected = source.height_at(x, y);
            let step = terrain.height_ratio.max(0.05);
            assert!(
                (sampled - expected).abs() <= step * 2.0,
                "({}, {}): {} vs {}",
                x,
                y,
                sampled,
                expected
            );
        }
    }

    #[test]
    fn test_height_outside_map_is_ocean() {
        let terrain = Terrain::build(&small_cfg(), 64, &hilly_source()).expect("build failed");
        assert_eq!(terrain.height_at(-10.0, 5.0), -5.0);
        assert_eq!(terrain.height_at(5.0, 1000.0), -5.0);
    }

    #[test]
    fn test_holes_survive_build() {
        let source = FnSource {
            height: |_x, _y| 5.0,
            surface: |_x, _y| 0,
            holes: |x, y| x == 5 && y == 5,
        };
        let cfg = small_cfg();
        let terrain = Terrain::build(&cfg, 64, &source).expect("build failed");
        assert!(terrain.is_hole_at(5.0, 5.0));
        assert!(!terrain.is_hole_at(20.0, 20.0));
        // only the quadrants on the path to the hole subdivide
        assert_eq!(terrain.node_count(), 9);
    }

    #[test]
    fn test_flat_region_with_hole_subdivides_to_leaf() {
        let source = FnSource {
            height: |_x, _y| 5.0,
            surface: |_x, _y| 0,
            holes: |x, y| x == 37 && y == 50,
        };
        let cfg = TerrainConfig {
            flatness_threshold: 1.0,
            ..small_cfg()
        };
        let terrain = Terrain::build(&cfg, 64, &source).expect("build failed");
        assert!(terrain.is_hole_at(37.0, 50.0));
        assert!(!terrain.is_hole_at(36.0, 50.0));
        let key = SectorKey { x: 32, y: 48, level: 0 };
        let snapshot = terrain.sector_snapshot(key).expect("snapshot failed");
        assert!(snapshot.range.has_holes());
    }

    #[test]
    fn test_placement_lands_in_containing_leaf() {
        let mut terrain = Terrain::build(&small_cfg(), 64, &hilly_source()).expect("build failed");
        let pool = GeometryPool::new(0.0);
        terrain
            .add_brush(
                &pool,
                "rocks/boulder_a",
                None,
                Vec3::new(40.0, 10.0, 30.0),
                1.0,
                0.0,
                0,
                4.0,
            )
            .expect("add failed");

        let mut placed = 0;
        terrain.root.for_each_leaf(&mut |leaf| {
            if let Some(data) = &leaf.leaf_data {
                placed += data.placements.len();
                if !data.placements.is_empty() {
                    assert_eq!(leaf.origin_x, 32);
                    assert_eq!(leaf.origin_y, 0);
                }
            }
        });
        assert_eq!(placed, 1);
        // bbox extension propagated down the path
        assert!(terrain.root.bbox.max.z >= 34.0);
    }

    #[test]
    fn test_placement_outside_map_rejected() {
        let mut terrain = Terrain::build(&small_cfg(), 64, &hilly_source()).expect("build failed");
        let pool = GeometryPool::new(0.0);
        let result = terrain.add_brush(
            &pool,
            "rocks/boulder_a",
            None,
            Vec3::new(-4.0, 10.0, 0.0),
            1.0,
            0.0,
            0,
            4.0,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_vegetation_shares_group_geometry() {
        let mut terrain = Terrain::build(&small_cfg(), 64, &hilly_source()).expect("build failed");
        let pool = GeometryPool::new(0.0);
        let group = terrain.register_group(
            &pool,
            InstanceGroupChunk {
                geometry_path: "trees/pine_01".into(),
                size: 8.0,
                ..Default::default()
            },
        );
        terrain
            .add_vegetation(group, Vec3::new(10.0, 10.0, 42.0), 1.0, 0.0, 0)
            .expect("add failed");
        terrain
            .add_vegetation(group, Vec3::new(12.0, 10.0, 42.0), 1.0, 0.0, 0)
            .expect("add failed");

        // group handle + two placement clones
        assert_eq!(pool.entry_count(), 1);
        let handle = pool.acquire("trees/pine_01");
        assert_eq!(handle.entry().refcount(), 4);
    }

    #[test]
    fn test_apply_mesh_ignores_unknown_key() {
        let mut terrain = Terrain::build(&small_cfg(), 64, &hilly_source()).expect("build failed");
        let mesh = SectorMesh {
            vertices: Vec::new(),
            indices: Vec::new(),
            lod: 0,
        };
        assert!(!terrain.apply_mesh(SectorKey { x: 999, y: 0, level: 0 }, mesh));
    }

    #[test]
    fn test_mesh_for_returns_published_mesh() {
        let mut terrain = Terrain::build(&small_cfg(), 64, &hilly_source()).expect("build failed");
        let key = SectorKey { x: 0, y: 0, level: 0 };
        assert!(terrain.mesh_for(key).is_none());

        let mesh = SectorMesh {
            vertices: Vec::new(),
            indices: vec![0, 1, 2],
            lod: 1,
        };
        assert!(terrain.apply_mesh(key, mesh));
        let resident = terrain.mesh_for(key).expect("mesh missing");
        assert_eq!(resident.lod, 1);
        assert_eq!(resident.indices.len(), 3);
    }

    #[test]
    fn test_sectors_in_box() {
        let terrain = Terrain::build(&small_cfg(), 64, &hilly_source()).expect("build failed");
        let keys = terrain.sectors_in_box(&Aabb::new(
            Vec3::new(2.0, 2.0, 0.0),
            Vec3::new(6.0, 6.0, 100.0),
        ));
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0], SectorKey { x: 0, y: 0, level: 0 });
    }

    #[test]
    fn test_heightfield_published_once_per_rebuild() {
        struct CountingSink {
            notified: usize,
            last_region: Option<Aabb>,
        }
        impl HeightfieldSink for CountingSink {
            fn heightfield_rebuilt(&mut self, region: &Aabb, _terrain: &Terrain) {
                self.notified += 1;
                self.last_region = Some(*region);
            }
        }

        let mut terrain = Terrain::build(&small_cfg(), 64, &hilly_source()).expect("build failed");
        let mut sink = CountingSink {
            notified: 0,
            last_region: None,
        };

        assert!(terrain.publish_heightfield(&mut sink));
        assert!(!terrain.publish_heightfield(&mut sink));
        assert_eq!(sink.notified, 1);
        let region = sink.last_region.expect("no region");
        assert_eq!(region.min.x, 0.0);
        assert_eq!(region.max.x, 64.0);
    }
}
