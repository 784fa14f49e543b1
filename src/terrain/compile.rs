//! Terrain serialization
//!
//! A compiled terrain is one chunk: a versioned header, the shared name
//! and group tables, then the node tree depth-first. Export runs the
//! identical write path twice, once counting and once writing, so the
//! reported size always matches the produced bytes. Import parses into a
//! fresh tree and only replaces the live terrain when the whole chunk
//! parsed cleanly.

use crate::assets::GeometryPool;
use crate::codec::{
    ChunkSink, ChunkSource, Endian, FLAG_INSTANCES_PRESORTED, FLAG_SECTOR_PALETTES, FileSource,
    InstanceGroupChunk, SharedTables, SliceSource, TABLE_NONE, TERRAIN_CHUNK_VERSION,
    TerrainChunkHeader, TerrainInfo, table_get,
};
use crate::core::Error;
use crate::core::types::{Result, Vec3};
use crate::math::Aabb;
use crate::terrain::cell::HeightCell;
use crate::terrain::node::{Placement, PlacementKind, TerrainNode};
use crate::terrain::range::{RangeInfo, SurfacePalette};
use crate::terrain::terrain::{InstanceGroup, Terrain};

/// Version of the per-node record inside the chunk body
const NODE_RECORD_VERSION: i16 = 5;

const NODE_HAS_HOLES: i16 = 1 << 0;
const NODE_HAS_CHILDREN: i16 = 1 << 1;
const NODE_HAS_CELLS: i16 = 1 << 2;

/// Per-layer visibility and id remapping applied on export
#[derive(Clone, Debug, Default)]
pub struct LayerVisibility {
    /// Indexed by layer id; ids past the end stay visible
    pub visible: Vec<bool>,
    /// Indexed by layer id; ids past the end are written unchanged
    pub translation: Vec<u16>,
}

impl LayerVisibility {
    fn is_visible(&self, layer: u16) -> bool {
        self.visible.get(layer as usize).copied().unwrap_or(true)
    }

    fn translate(&self, layer: u16) -> u16 {
        self.translation.get(layer as usize).copied().unwrap_or(layer)
    }
}

/// What an export includes
#[derive(Clone, Debug)]
pub struct ExportFilter {
    /// Only placements inside this world-space box are written
    pub area_box: Option<Aabb>,
    /// Placement kinds to include, as `PlacementKind::bit` flags
    pub object_mask: u32,
    pub include_heightmap: bool,
    pub layer_visibility: Option<LayerVisibility>,
}

impl Default for ExportFilter {
    fn default() -> Self {
        Self {
            area_box: None,
            object_mask: u32::MAX,
            include_heightmap: true,
            layer_visibility: None,
        }
    }
}

impl ExportFilter {
    fn keeps(&self, placement: &Placement) -> bool {
        if placement.kind.bit() & self.object_mask == 0 {
            return false;
        }
        if let Some(vis) = &self.layer_visibility {
            if !vis.is_visible(placement.layer_id) {
                return false;
            }
        }
        if let Some(area) = &self.area_box {
            if !area.contains_point(placement.position) {
                return false;
            }
        }
        true
    }
}

impl Terrain {
    /// Exact size in bytes `get_compiled_data` will produce for the same
    /// filter
    pub fn get_compiled_data_size(&self, filter: &ExportFilter) -> usize {
        let mut tables = self.build_export_tables(filter);
        let mut sink = ChunkSink::counting(Endian::Little);
        self.write_body(&mut sink, &mut tables, filter);
        TerrainChunkHeader::SIZE + sink.len()
    }

    /// Serialize the terrain to one chunk in the requested byte order
    pub fn get_compiled_data(&self, filter: &ExportFilter, endian: Endian) -> Result<Vec<u8>> {
        let mut tables = self.build_export_tables(filter);
        let mut body = ChunkSink::writing(endian);
        self.write_body(&mut body, &mut tables, filter);
        let body = body.into_bytes();

        let header = TerrainChunkHeader {
            version: TERRAIN_CHUNK_VERSION,
            flags: FLAG_SECTOR_PALETTES | FLAG_INSTANCES_PRESORTED,
            chunk_size: (TerrainChunkHeader::SIZE + body.len()) as i32,
            info: TerrainInfo {
                heightmap_units: self.terrain_size_units as i32,
                unit_size: self.unit_size,
                sector_size: self.sector_size,
                sectors_table_size: self.sectors_table_size,
                height_ratio: self.height_ratio,
                ocean_level: self.ocean_level,
            },
        };
        let mut out = ChunkSink::writing(endian);
        header.write(&mut out);
        let mut out = out.into_bytes();
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Replace this terrain with a parsed chunk.
    ///
    /// Parses into a fresh tree first; on any error the current terrain is
    /// left untouched. Returns the shared tables for tooling.
    pub fn set_compiled_data(&mut self, data: &[u8], pool: &GeometryPool) -> Result<SharedTables> {
        let mut src = SliceSource::new(data);
        self.read_compiled(&mut src, data.len(), pool)
    }

    /// `set_compiled_data` over a chunk file, streamed rather than read
    /// into memory first
    pub fn load_compiled_file(
        &mut self,
        path: &std::path::Path,
        pool: &GeometryPool,
    ) -> Result<SharedTables> {
        let mut src = FileSource::open(path)?;
        let len = src.remaining();
        self.read_compiled(&mut src, len, pool)
    }

    fn read_compiled(
        &mut self,
        src: &mut dyn ChunkSource,
        actual_len: usize,
        pool: &GeometryPool,
    ) -> Result<SharedTables> {
        let (header, endian) = TerrainChunkHeader::read(src, actual_len)?;
        let info = header.info;

        if info.sector_size <= 0 || !(info.sector_size as u32).is_power_of_two() {
            return Err(Error::Corrupt(format!(
                "sector size {} is not a power of two",
                info.sector_size
            )));
        }
        if info.heightmap_units <= 0
            || !(info.heightmap_units as u32).is_power_of_two()
            || info.heightmap_units < info.sector_size
        {
            return Err(Error::Corrupt(format!(
                "heightmap size {} does not fit sector size {}",
                info.heightmap_units, info.sector_size
            )));
        }

        let tables = SharedTables::read(&mut *src, endian)?;

        let units_to_sector_shift = (info.sector_size as u32).trailing_zeros();
        let root_level =
            (info.heightmap_units as u32 / info.sector_size as u32).trailing_zeros() as u8;

        let mut groups = Vec::with_capacity(tables.groups.len());
        for chunk in &tables.groups {
            let material = if chunk.material_index == TABLE_NONE {
                None
            } else {
                Some(table_get(&tables.materials, chunk.material_index, "material")?.clone())
            };
            let handle = if chunk.geometry_path.is_empty() {
                None
            } else {
                Some(pool.acquire(&chunk.geometry_path))
            };
            groups.push(InstanceGroup {
                chunk: chunk.clone(),
                material,
                handle,
            });
        }

        let mut loaded = Terrain {
            root: TerrainNode::new(0, 0, root_level),
            unit_size: info.unit_size,
            terrain_size_units: info.heightmap_units as u32,
            sector_size: info.sector_size,
            units_to_sector_shift,
            sectors_table_size: info.sectors_table_size,
            height_ratio: info.height_ratio,
            ocean_level: info.ocean_level,
            groups,
            rebuild_serial: self.rebuild_serial + 1,
            published_serial: self.published_serial,
        };

        let palettes = header.flags & FLAG_SECTOR_PALETTES != 0;
        let mut root = TerrainNode::new(0, 0, root_level);
        loaded.read_node(&mut root, &mut *src, endian, &tables, pool, palettes)?;
        if src.remaining() != 0 {
            return Err(Error::Corrupt(format!(
                "{} trailing bytes after node tree",
                src.remaining()
            )));
        }
        loaded.root = root;

        log::info!(
            "loaded terrain: {} units, {} nodes, {} groups",
            loaded.terrain_size_units,
            loaded.node_count(),
            loaded.groups.len()
        );
        *self = loaded;
        Ok(tables)
    }

    /// Intern every name the export will reference, in write order
    fn build_export_tables(&self, filter: &ExportFilter) -> SharedTables {
        let mut tables = SharedTables::new();
        for group in &self.groups {
            let mut chunk = group.chunk.clone();
            chunk.material_index = match &group.material {
                Some(name) => tables.intern_material(name),
                None => TABLE_NONE,
            };
            tables.push_group(chunk);
        }
        self.root.for_each_leaf(&mut |leaf| {
            let Some(data) = &leaf.leaf_data else { return };
            for placement in data.placements.iter().filter(|p| filter.keeps(p)) {
                if placement.group_index == TABLE_NONE {
                    if let Some(handle) = &placement.geometry {
                        tables.intern_geometry(handle.name());
                    }
                }
                if let Some(material) = &placement.material {
                    tables.intern_material(material);
                }
            }
        });
        tables
    }

    fn write_body(&self, sink: &mut ChunkSink, tables: &mut SharedTables, filter: &ExportFilter) {
        tables.write(sink);
        self.write_node(&self.root, sink, tables, filter);
    }

    fn write_node(
        &self,
        node: &TerrainNode,
        sink: &mut ChunkSink,
        tables: &mut SharedTables,
        filter: &ExportFilter,
    ) {
        let has_cells = filter.include_heightmap && !node.range_info.cells.is_empty();
        let mut flags = 0i16;
        if node.has_holes {
            flags |= NODE_HAS_HOLES;
        }
        if node.children.is_some() {
            flags |= NODE_HAS_CHILDREN;
        }
        if has_cells {
            flags |= NODE_HAS_CELLS;
        }

        sink.write_i16(NODE_RECORD_VERSION);
        sink.write_i16(flags);
        sink.write_u32(node.origin_x);
        sink.write_u32(node.origin_y);
        sink.write_u8(node.tree_level);
        sink.write_f32(node.bbox_extension);

        if has_cells {
            let range = &node.range_info;
            sink.write_f32(range.offset);
            sink.write_f32(range.scale);
            sink.write_u16(range.size);
            sink.write_bytes(&range.palette.0);
            for cell in &range.cells {
                sink.write_u32(cell.0);
            }
        }

        let placements: Vec<&Placement> = match &node.leaf_data {
            Some(data) => {
                let mut kept: Vec<&Placement> =
                    data.placements.iter().filter(|p| filter.keeps(p)).collect();
                kept.sort_by_key(|p| (p.kind.bit(), p.group_index));
                kept
            }
            None => Vec::new(),
        };
        sink.write_u32(placements.len() as u32);
        for placement in placements {
            self.write_placement(placement, sink, tables, filter);
        }

        if let Some(children) = &node.children {
            for child in children.iter() {
                self.write_node(child, sink, tables, filter);
            }
        }
    }

    fn write_placement(
        &self,
        placement: &Placement,
        sink: &mut ChunkSink,
        tables: &mut SharedTables,
        filter: &ExportFilter,
    ) {
        let kind = match placement.kind {
            PlacementKind::Vegetation => 0u8,
            PlacementKind::Brush => 1,
            PlacementKind::Decoration => 2,
        };
        let geometry_index = if placement.group_index == TABLE_NONE {
            placement
                .geometry
                .as_ref()
                .map(|h| tables.intern_geometry(h.name()))
                .unwrap_or(TABLE_NONE)
        } else {
            TABLE_NONE
        };
        let material_index = placement
            .material
            .as_ref()
            .map(|m| tables.intern_material(m))
            .unwrap_or(TABLE_NONE);
        let layer_id = match &filter.layer_visibility {
            Some(vis) => vis.translate(placement.layer_id),
            None => placement.layer_id,
        };

        sink.write_u8(kind);
        sink.write_i32(placement.group_index);
        sink.write_i32(geometry_index);
        sink.write_i32(material_index);
        sink.write_f32(placement.position.x);
        sink.write_f32(placement.position.y);
        sink.write_f32(placement.position.z);
        sink.write_f32(placement.scale);
        sink.write_f32(placement.rotation_z);
        sink.write_u16(layer_id);
    }

    fn read_node(
        &self,
        node: &mut TerrainNode,
        src: &mut dyn ChunkSource,
        endian: Endian,
        tables: &SharedTables,
        pool: &GeometryPool,
        palettes: bool,
    ) -> Result<()> {
        let version = src.read_i16(endian)?;
        if version != NODE_RECORD_VERSION {
            return Err(Error::Corrupt(format!(
                "node record version {} (current is {})",
                version, NODE_RECORD_VERSION
            )));
        }
        let flags = src.read_i16(endian)?;
        let origin_x = src.read_u32(endian)?;
        let origin_y = src.read_u32(endian)?;
        let level = src.read_u8()?;
        if origin_x != node.origin_x || origin_y != node.origin_y || level != node.tree_level {
            return Err(Error::Corrupt(format!(
                "node at ({}, {}) level {} where ({}, {}) level {} was expected",
                origin_x, origin_y, level, node.origin_x, node.origin_y, node.tree_level
            )));
        }
        node.bbox_extension = src.read_f32(endian)?;

        if flags & NODE_HAS_CELLS != 0 {
            let offset = src.read_f32(endian)?;
            let scale = src.read_f32(endian)?;
            let size = src.read_u16(endian)?;
            if size as usize > 4096 {
                return Err(Error::Corrupt(format!("sector grid size {}", size)));
            }
            let mut palette = SurfacePalette::default();
            if palettes {
                src.read_bytes(&mut palette.0)?;
            }
            let mut range = RangeInfo::with_size(size);
            range.offset = offset;
            range.scale = scale;
            range.palette = palette;
            for cell in range.cells.iter_mut() {
                *cell = HeightCell(src.read_u32(endian)?);
            }
            range.update_bit_shift(self.units_to_sector_shift + node.tree_level as u32);
            range.modified = false;
            node.range_info = range;
        }

        let placement_count = src.read_u32(endian)? as usize;
        if placement_count > 0 {
            let data = node.leaf_data.get_or_insert_with(Box::default);
            data.placements.reserve(placement_count);
            for _ in 0..placement_count {
                let placement = self.read_placement(src, endian, tables, pool)?;
                data.placements.push(placement);
            }
        }

        if flags & NODE_HAS_CHILDREN != 0 {
            if node.tree_level == 0 {
                return Err(Error::Corrupt("leaf-level node claims children".into()));
            }
            let half = (self.sector_size as u32) << (node.tree_level as u32 - 1);
            let mut children = Vec::with_capacity(4);
            for iy in 0..2u32 {
                for ix in 0..2u32 {
                    let mut child = TerrainNode::new(
                        node.origin_x + ix * half,
                        node.origin_y + iy * half,
                        node.tree_level - 1,
                    );
                    self.read_node(&mut child, src, endian, tables, pool, palettes)?;
                    children.push(child);
                }
            }
            match <[TerrainNode; 4]>::try_from(children) {
                Ok(array) => node.children = Some(Box::new(array)),
                Err(_) => unreachable!(),
            }
        } else if node.leaf_data.is_none() {
            node.leaf_data = Some(Box::default());
        }

        node.update_bbox(self.unit_size, self.units_to_sector_shift);
        if flags & NODE_HAS_CELLS == 0 {
            node.has_holes = flags & NODE_HAS_HOLES != 0;
        }
        Ok(())
    }

    fn read_placement(
        &self,
        src: &mut dyn ChunkSource,
        endian: Endian,
        tables: &SharedTables,
        pool: &GeometryPool,
    ) -> Result<Placement> {
        let kind = match src.read_u8()? {
            0 => PlacementKind::Vegetation,
            1 => PlacementKind::Brush,
            2 => PlacementKind::Decoration,
            other => {
                return Err(Error::Corrupt(format!("placement kind {}", other)));
            }
        };
        let group_index = src.read_i32(endian)?;
        let geometry_index = src.read_i32(endian)?;
        let material_index = src.read_i32(endian)?;
        let position = Vec3::new(
            src.read_f32(endian)?,
            src.read_f32(endian)?,
            src.read_f32(endian)?,
        );
        let scale = src.read_f32(endian)?;
        let rotation_z = src.read_f32(endian)?;
        let layer_id = src.read_u16(endian)?;

        let geometry = if group_index != TABLE_NONE {
            let group: &InstanceGroup = if group_index >= 0
                && (group_index as usize) < self.groups.len()
            {
                &self.groups[group_index as usize]
            } else {
                return Err(Error::Corrupt(format!(
                    "group index {} out of range ({} groups)",
                    group_index,
                    self.groups.len()
                )));
            };
            group.handle.clone()
        } else if geometry_index != TABLE_NONE {
            let name = table_get(&tables.geometry, geometry_index, "geometry")?;
            Some(pool.acquire(name))
        } else {
            None
        };
        let material = if material_index == TABLE_NONE {
            None
        } else {
            Some(table_get(&tables.materials, material_index, "material")?.clone())
        };

        Ok(Placement {
            kind,
            group_index,
            geometry,
            material,
            position,
            scale,
            rotation_z,
            layer_id,
        })
    }
}
