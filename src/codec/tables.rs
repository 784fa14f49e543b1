//! Shared name and group tables
//!
//! Per-sector records never embed geometry or material names directly.
//! Export interns every name into one of these tables and writes a compact
//! index instead; import resolves indices back through `table_get`, which
//! treats any out-of-range index as corruption rather than trusting it.

use crate::codec::{ChunkSink, ChunkSource, Endian};
use crate::core::Error;
use crate::core::types::Result;

/// Index value meaning "no entry"
pub const TABLE_NONE: i32 = -1;

/// Bounds-checked table lookup for a deserialized index
pub fn table_get<'a, T>(table: &'a [T], index: i32, what: &str) -> Result<&'a T> {
    if index < 0 || index as usize >= table.len() {
        return Err(Error::Corrupt(format!(
            "{} index {} out of range ({} entries)",
            what,
            index,
            table.len()
        )));
    }
    Ok(&table[index as usize])
}

/// Serialized description of a vegetation / instance group
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceGroupChunk {
    pub geometry_path: String,
    pub material_index: i32,
    pub flags: u32,
    pub density: f32,
    pub size: f32,
    pub size_var: f32,
    pub slope_min: f32,
    pub slope_max: f32,
    pub elevation_min: f32,
    pub elevation_max: f32,
    pub lod_dist_ratio: f32,
    pub max_view_dist_ratio: f32,
    pub id: i32,
}

impl Default for InstanceGroupChunk {
    fn default() -> Self {
        Self {
            geometry_path: String::new(),
            material_index: TABLE_NONE,
            flags: 0,
            density: 1.0,
            size: 1.0,
            size_var: 0.0,
            slope_min: 0.0,
            slope_max: 90.0,
            elevation_min: 0.0,
            elevation_max: 4096.0,
            lod_dist_ratio: 1.0,
            max_view_dist_ratio: 1.0,
            id: TABLE_NONE,
        }
    }
}

impl InstanceGroupChunk {
    fn write(&self, sink: &mut ChunkSink) {
        sink.write_string(&self.geometry_path);
        sink.write_i32(self.material_index);
        sink.write_u32(self.flags);
        sink.write_f32(self.density);
        sink.write_f32(self.size);
        sink.write_f32(self.size_var);
        sink.write_f32(self.slope_min);
        sink.write_f32(self.slope_max);
        sink.write_f32(self.elevation_min);
        sink.write_f32(self.elevation_max);
        sink.write_f32(self.lod_dist_ratio);
        sink.write_f32(self.max_view_dist_ratio);
        sink.write_i32(self.id);
    }

    fn read(src: &mut dyn ChunkSource, endian: Endian) -> Result<Self> {
        Ok(Self {
            geometry_path: src.read_string(endian)?,
            material_index: src.read_i32(endian)?,
            flags: src.read_u32(endian)?,
            density: src.read_f32(endian)?,
            size: src.read_f32(endian)?,
            size_var: src.read_f32(endian)?,
            slope_min: src.read_f32(endian)?,
            slope_max: src.read_f32(endian)?,
            elevation_min: src.read_f32(endian)?,
            elevation_max: src.read_f32(endian)?,
            lod_dist_ratio: src.read_f32(endian)?,
            max_view_dist_ratio: src.read_f32(endian)?,
            id: src.read_i32(endian)?,
        })
    }
}

/// Interned tables shared by every sector record in a chunk.
///
/// Indices are assigned in first-seen order so a save / load / save cycle
/// reproduces identical tables. Path lookups are case-insensitive because
/// asset references come from hand-edited files.
#[derive(Clone, Debug, Default)]
pub struct SharedTables {
    pub groups: Vec<InstanceGroupChunk>,
    pub geometry: Vec<String>,
    pub materials: Vec<String>,
}

impl SharedTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a geometry path, returning its table index
    pub fn intern_geometry(&mut self, path: &str) -> i32 {
        intern_path(&mut self.geometry, path)
    }

    /// Intern a material name, returning its table index
    pub fn intern_material(&mut self, name: &str) -> i32 {
        intern_path(&mut self.materials, name)
    }

    /// Append a group record, returning its table index
    pub fn push_group(&mut self, group: InstanceGroupChunk) -> i32 {
        self.groups.push(group);
        (self.groups.len() - 1) as i32
    }

    /// Serialize all three tables in fixed order
    pub fn write(&self, sink: &mut ChunkSink) {
        sink.write_u32(self.groups.len() as u32);
        for group in &self.groups {
            group.write(sink);
        }
        sink.write_u32(self.geometry.len() as u32);
        for path in &self.geometry {
            sink.write_string(path);
        }
        sink.write_u32(self.materials.len() as u32);
        for name in &self.materials {
            sink.write_string(name);
        }
    }

    pub fn read(src: &mut dyn ChunkSource, endian: Endian) -> Result<Self> {
        let group_count = src.read_u32(endian)? as usize;
        let mut groups = Vec::with_capacity(group_count.min(4096));
        for _ in 0..group_count {
            groups.push(InstanceGroupChunk::read(src, endian)?);
        }

        let geometry = read_string_table(src, endian)?;
        let materials = read_string_table(src, endian)?;

        Ok(Self {
            groups,
            geometry,
            materials,
        })
    }
}

fn intern_path(table: &mut Vec<String>, path: &str) -> i32 {
    if let Some(i) = table.iter().position(|p| p.eq_ignore_ascii_case(path)) {
        return i as i32;
    }
    table.push(path.to_string());
    (table.len() - 1) as i32
}

fn read_string_table(src: &mut dyn ChunkSource, endian: Endian) -> Result<Vec<String>> {
    let count = src.read_u32(endian)? as usize;
    let mut table = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        table.push(src.read_string(endian)?);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SliceSource;

    #[test]
    fn test_intern_first_seen_order() {
        let mut tables = SharedTables::new();
        assert_eq!(tables.intern_geometry("rocks/boulder_a.mesh"), 0);
        assert_eq!(tables.intern_geometry("trees/pine_01.mesh"), 1);
        assert_eq!(tables.intern_geometry("rocks/boulder_a.mesh"), 0);
        assert_eq!(tables.geometry.len(), 2);
    }

    #[test]
    fn test_intern_is_case_insensitive() {
        let mut tables = SharedTables::new();
        assert_eq!(tables.intern_geometry("Rocks/Boulder_A.mesh"), 0);
        assert_eq!(tables.intern_geometry("rocks/boulder_a.MESH"), 0);
        assert_eq!(tables.geometry.len(), 1);
    }

    #[test]
    fn test_tables_roundtrip() {
        let mut tables = SharedTables::new();
        let mat = tables.intern_material("materials/forest");
        tables.push_group(InstanceGroupChunk {
            geometry_path: "trees/pine_01.mesh".into(),
            material_index: mat,
            density: 0.4,
            id: 7,
            ..Default::default()
        });
        tables.intern_geometry("rocks/boulder_a.mesh");

        let mut sink = ChunkSink::writing(Endian::Little);
        tables.write(&mut sink);
        let bytes = sink.into_bytes();

        let mut src = SliceSource::new(&bytes);
        let parsed = SharedTables::read(&mut src, Endian::Little).expect("read failed");
        assert_eq!(parsed.groups, tables.groups);
        assert_eq!(parsed.geometry, tables.geometry);
        assert_eq!(parsed.materials, tables.materials);
        assert_eq!(src.remaining(), 0);
    }

    #[test]
    fn test_table_get_bounds() {
        let table = vec!["a".to_string(), "b".to_string()];
        assert_eq!(table_get(&table, 1, "geometry").expect("lookup failed"), "b");
        assert!(matches!(table_get(&table, 2, "geometry"), Err(Error::Corrupt(_))));
        assert!(matches!(table_get(&table, -1, "geometry"), Err(Error::Corrupt(_))));
    }
}
