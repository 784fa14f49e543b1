//! Visibility areas
//!
//! Indoor volumes, portals, and occluders are stored apart from the
//! terrain in their own chunk with the same header discipline. An area is
//! a closed 2D contour extruded to a height; portals are areas that
//! connect the volumes they touch.

use crate::codec::{
    ChunkSink, ChunkSource, Endian, SliceSource, VISAREA_CHUNK_VERSION, VisAreaChunkHeader,
};
use crate::core::Error;
use crate::core::types::{Result, Vec3};
use crate::math::Aabb;

/// Area is affected by outdoor lights
pub const AREA_AFFECTED_BY_OUT_LIGHTS: u32 = 1 << 0;
/// Area skips the skybox when rendered from inside
pub const AREA_SKIP_SKY: u32 = 1 << 1;
/// Double-sided portal
pub const AREA_DOUBLE_SIDE: u32 = 1 << 2;

/// One visibility volume: a contour extruded upward by `height`
#[derive(Clone, Debug, PartialEq)]
pub struct VisArea {
    pub name: String,
    pub points: Vec<Vec3>,
    pub height: f32,
    pub flags: u32,
    pub bbox: Aabb,
}

impl VisArea {
    pub fn new(name: &str, points: Vec<Vec3>, height: f32, flags: u32) -> Self {
        let mut area = Self {
            name: name.to_string(),
            points,
            height,
            flags,
            bbox: Aabb::RESET,
        };
        area.update_bbox();
        area
    }

    /// Recompute the bbox from the contour and extrusion height
    pub fn update_bbox(&mut self) {
        let mut bbox = Aabb::RESET;
        for p in &self.points {
            bbox.add_point(*p);
            bbox.add_point(Vec3::new(p.x, p.y, p.z + self.height));
        }
        self.bbox = bbox;
    }

    /// Point-in-volume test: inside the vertical extent and the 2D contour
    pub fn contains_point(&self, p: Vec3) -> bool {
        if self.bbox.is_reset() || !self.bbox.contains_point(p) {
            return false;
        }
        // 2D even-odd rule over the contour
        let mut inside = false;
        let n = self.points.len();
        if n < 3 {
            return false;
        }
        let mut j = n - 1;
        for i in 0..n {
            let (a, b) = (self.points[i], self.points[j]);
            if (a.y > p.y) != (b.y > p.y)
                && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    fn write(&self, sink: &mut ChunkSink) {
        sink.write_string(&self.name);
        sink.write_u32(self.flags);
        sink.write_f32(self.height);
        sink.write_u32(self.points.len() as u32);
        for p in &self.points {
            sink.write_f32(p.x);
            sink.write_f32(p.y);
            sink.write_f32(p.z);
        }
    }

    fn read(src: &mut dyn ChunkSource, endian: Endian) -> Result<Self> {
        let name = src.read_string(endian)?;
        let flags = src.read_u32(endian)?;
        let height = src.read_f32(endian)?;
        let count = src.read_u32(endian)? as usize;
        if count > 65536 {
            return Err(Error::Corrupt(format!("contour of {} points", count)));
        }
        let mut points = Vec::with_capacity(count);
        for _ in 0..count {
            points.push(Vec3::new(
                src.read_f32(endian)?,
                src.read_f32(endian)?,
                src.read_f32(endian)?,
            ));
        }
        Ok(Self::new(&name, points, height, flags))
    }
}

/// All visibility volumes of a level
#[derive(Clone, Debug, Default)]
pub struct VisAreaManager {
    pub areas: Vec<VisArea>,
    pub portals: Vec<VisArea>,
    pub occluders: Vec<VisArea>,
}

impl VisAreaManager {
    /// Exact size `get_compiled_data` will produce
    pub fn get_compiled_data_size(&self) -> usize {
        let mut sink = ChunkSink::counting(Endian::Little);
        self.write_body(&mut sink);
        VisAreaChunkHeader::SIZE + sink.len()
    }

    pub fn get_compiled_data(&self, endian: Endian) -> Result<Vec<u8>> {
        let mut body = ChunkSink::writing(endian);
        self.write_body(&mut body);
        let body = body.into_bytes();

        let header = VisAreaChunkHeader {
            version: VISAREA_CHUNK_VERSION,
            flags: 0,
            chunk_size: (VisAreaChunkHeader::SIZE + body.len()) as i32,
            area_count: self.areas.len() as i32,
            portal_count: self.portals.len() as i32,
            occluder_count: self.occluders.len() as i32,
        };
        let mut out = ChunkSink::writing(endian);
        header.write(&mut out);
        let mut out = out.into_bytes();
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Replace the manager with a parsed chunk; untouched on error
    pub fn set_compiled_data(&mut self, data: &[u8]) -> Result<()> {
        let mut src = SliceSource::new(data);
        let (header, endian) = VisAreaChunkHeader::read(&mut src, data.len())?;

        let read_list = |src: &mut SliceSource, count: i32| -> Result<Vec<VisArea>> {
            if count < 0 {
                return Err(Error::Corrupt(format!("negative area count {}", count)));
            }
            let mut list = Vec::with_capacity(count as usize);
            for _ in 0..count {
                list.push(VisArea::read(src, endian)?);
            }
            Ok(list)
        };

        let areas = read_list(&mut src, header.area_count)?;
        let portals = read_list(&mut src, header.portal_count)?;
        let occluders = read_list(&mut src, header.occluder_count)?;
        if src.remaining() != 0 {
            return Err(Error::Corrupt(format!(
                "{} trailing bytes after visibility areas",
                src.remaining()
            )));
        }

        self.areas = areas;
        self.portals = portals;
        self.occluders = occluders;
        log::info!(
            "loaded {} areas, {} portals, {} occluders",
            self.areas.len(),
            self.portals.len(),
            self.occluders.len()
        );
        Ok(())
    }

    fn write_body(&self, sink: &mut ChunkSink) {
        for area in self.areas.iter().chain(&self.portals).chain(&self.occluders) {
            area.write(sink);
        }
    }

    /// Area containing a world point, if any
    pub fn area_containing_point(&self, p: Vec3) -> Option<&VisArea> {
        self.areas.iter().find(|a| a.contains_point(p))
    }

    /// Portals whose bbox touches an area's bbox
    pub fn portals_connected_to(&self, area: &VisArea) -> Vec<&VisArea> {
        self.portals
            .iter()
            .filter(|p| p.bbox.intersects(&area.bbox))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_area(name: &str, origin: f32, size: f32) -> VisArea {
        VisArea::new(
            name,
            vec![
                Vec3::new(origin, origin, 0.0),
                Vec3::new(origin + size, origin, 0.0),
                Vec3::new(origin + size, origin + size, 0.0),
                Vec3::new(origin, origin + size, 0.0),
            ],
            4.0,
            AREA_AFFECTED_BY_OUT_LIGHTS,
        )
    }

    fn sample_manager() -> VisAreaManager {
        VisAreaManager {
            areas: vec![square_area("hall", 0.0, 10.0), square_area("vault", 20.0, 6.0)],
            portals: vec![square_area("door", 9.0, 2.0)],
            occluders: vec![square_area("wall", 40.0, 1.0)],
        }
    }

    #[test]
    fn test_contains_point() {
        let area = square_area("hall", 0.0, 10.0);
        assert!(area.contains_point(Vec3::new(5.0, 5.0, 2.0)));
        assert!(!area.contains_point(Vec3::new(5.0, 5.0, 9.0)));
        assert!(!area.contains_point(Vec3::new(15.0, 5.0, 2.0)));
    }

    #[test]
    fn test_roundtrip() {
        let manager = sample_manager();
        let data = manager.get_compiled_data(Endian::Little).expect("export failed");
        assert_eq!(manager.get_compiled_data_size(), data.len());

        let mut loaded = VisAreaManager::default();
        loaded.set_compiled_data(&data).expect("load failed");
        assert_eq!(loaded.areas, manager.areas);
        assert_eq!(loaded.portals, manager.portals);
        assert_eq!(loaded.occluders, manager.occluders);
    }

    #[test]
    fn test_big_endian_roundtrip() {
        let manager = sample_manager();
        let data = manager.get_compiled_data(Endian::Big).expect("export failed");
        let mut loaded = VisAreaManager::default();
        loaded.set_compiled_data(&data).expect("load failed");
        assert_eq!(loaded.areas, manager.areas);
    }

    #[test]
    fn test_bad_version_leaves_manager_untouched() {
        let manager = sample_manager();
        let mut data = manager.get_compiled_data(Endian::Little).expect("export failed");
        data[0] = data[0].wrapping_add(1);

        let mut target = VisAreaManager::default();
        let err = target.set_compiled_data(&data).unwrap_err();
        assert!(matches!(err, Error::VersionMismatch { .. }));
        assert!(target.areas.is_empty());
    }

    #[test]
    fn test_portal_connectivity() {
        let manager = sample_manager();
        let connected = manager.portals_connected_to(&manager.areas[0]);
        assert_eq!(connected.len(), 1);
        assert_eq!(connected[0].name, "door");
        assert!(manager.portals_connected_to(&manager.areas[1]).is_empty());
    }

    #[test]
    fn test_area_lookup() {
        let manager = sample_manager();
        assert_eq!(
            manager
                .area_containing_point(Vec3::new(22.0, 22.0, 1.0))
                .map(|a| a.name.as_str()),
            Some("vault")
        );
        assert!(manager.area_containing_point(Vec3::new(50.0, 50.0, 0.0)).is_none());
    }
}
