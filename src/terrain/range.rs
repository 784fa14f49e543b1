//! Per-sector heightmap storage
//!
//! Each quadtree node owns a small grid of packed cells covering its area
//! at that node's step. Heights are quantized against a per-sector offset
//! and scale so 12 bits cover the sector's actual height range, and
//! surface ids are remapped through a 16-entry local palette.

use crate::terrain::cell::{
    GLOBAL_HOLE, GLOBAL_UNDEFINED, HeightCell, LOCAL_HOLE, LOCAL_UNDEFINED, MAX_HEIGHT_RAW,
    PALETTE_SIZE,
};

/// Local-to-global surface id palette.
///
/// Slots 0..13 map local ids to global surface types. The two top slots
/// are reserved markers and always map to the global undefined and hole
/// ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfacePalette(pub [u8; PALETTE_SIZE]);

impl Default for SurfacePalette {
    fn default() -> Self {
        let mut slots = [GLOBAL_UNDEFINED; PALETTE_SIZE];
        slots[LOCAL_HOLE as usize] = GLOBAL_HOLE;
        Self(slots)
    }
}

impl SurfacePalette {
    /// Global id for a local id
    pub fn global(&self, local: u8) -> u8 {
        self.0[(local as usize) & (PALETTE_SIZE - 1)]
    }

    /// Find or insert the local id for a global surface type.
    ///
    /// Returns `LOCAL_UNDEFINED` when the palette is full; the cell keeps
    /// rendering with its dominant neighbors instead of corrupting slots.
    pub fn local(&mut self, global: u8) -> u8 {
        if global == GLOBAL_HOLE {
            return LOCAL_HOLE;
        }
        if global == GLOBAL_UNDEFINED {
            return LOCAL_UNDEFINED;
        }
        for (i, slot) in self.0[..LOCAL_UNDEFINED as usize].iter().enumerate() {
            if *slot == global {
                return i as u8;
            }
        }
        for (i, slot) in self.0[..LOCAL_UNDEFINED as usize].iter_mut().enumerate() {
            if *slot == GLOBAL_UNDEFINED {
                *slot = global;
                return i as u8;
            }
        }
        log::warn!("surface palette full, dropping global surface type {}", global);
        LOCAL_UNDEFINED
    }

    /// Number of assigned slots
    pub fn used(&self) -> usize {
        self.0[..LOCAL_UNDEFINED as usize]
            .iter()
            .filter(|&&s| s != GLOBAL_UNDEFINED)
            .count()
    }
}

/// Quantized cell grid for one sector
#[derive(Clone, Debug, Default)]
pub struct RangeInfo {
    /// Height in meters of raw value 0
    pub offset: f32,
    /// Meters per raw height step
    pub scale: f32,
    /// Cells along one grid edge, including the duplicated far row
    pub size: u16,
    /// Right-shift from heightmap units to this grid's step
    pub unit_bit_shift: u32,
    pub cells: Vec<HeightCell>,
    pub palette: SurfacePalette,
    pub modified: bool,
}

impl RangeInfo {
    /// Allocate a grid of `size * size` zeroed cells
    pub fn with_size(size: u16) -> Self {
        Self {
            size,
            cells: vec![HeightCell::default(); size as usize * size as usize],
            ..Default::default()
        }
    }

    /// Set quantization to cover `[min_height, max_height]`
    pub fn set_range(&mut self, min_height: f32, max_height: f32) {
        self.offset = min_height;
        let span = (max_height - min_height).max(0.0);
        self.scale = if span > 0.0 {
            span / MAX_HEIGHT_RAW as f32
        } else {
            0.0
        };
    }

    /// Recompute the unit shift for a sector spanning `1 << units_shift`
    /// heightmap units
    pub fn update_bit_shift(&mut self, units_shift: u32) {
        self.unit_bit_shift = 0;
        if self.size < 2 {
            return;
        }
        let mut n = (1u32 << units_shift) / (self.size as u32 - 1);
        while n > 1 {
            self.unit_bit_shift += 1;
            n >>= 1;
        }
    }

    pub fn quantize(&self, height: f32) -> u32 {
        if self.scale <= 0.0 {
            return 0;
        }
        let raw = ((height - self.offset) / self.scale).round();
        (raw.max(0.0) as u32).min(MAX_HEIGHT_RAW)
    }

    pub fn dequantize(&self, raw: u32) -> f32 {
        self.offset + raw as f32 * self.scale
    }

    pub fn cell(&self, x: usize, y: usize) -> HeightCell {
        self.cells[y * self.size as usize + x]
    }

    pub fn set_cell(&mut self, x: usize, y: usize, cell: HeightCell) {
        self.cells[y * self.size as usize + x] = cell;
        self.modified = true;
    }

    /// Cell for a position given in heightmap units relative to the sector
    /// origin, snapped down to this grid's step
    pub fn cell_at_units(&self, x_units: u32, y_units: u32) -> HeightCell {
        if self.cells.is_empty() {
            return HeightCell::default();
        }
        let max = self.size as usize - 1;
        let x = ((x_units >> self.unit_bit_shift) as usize).min(max);
        let y = ((y_units >> self.unit_bit_shift) as usize).min(max);
        self.cell(x, y)
    }

    /// Height in meters at a relative unit position
    pub fn height_at_units(&self, x_units: u32, y_units: u32) -> f32 {
        self.dequantize(self.cell_at_units(x_units, y_units).height_raw())
    }

    /// True when any cell carries the hole marker
    pub fn has_holes(&self) -> bool {
        self.cells.iter().any(|c| c.is_hole())
    }

    /// Min and max dequantized heights over the grid
    pub fn height_bounds(&self) -> (f32, f32) {
        let mut lo = u32::MAX;
        let mut hi = 0u32;
        for cell in &self.cells {
            let raw = cell.height_raw();
            lo = lo.min(raw);
            hi = hi.max(raw);
        }
        if lo == u32::MAX {
            (self.offset, self.offset)
        } else {
            (self.dequantize(lo), self.dequantize(hi))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::cell::SurfaceBlend;

    #[test]
    fn test_palette_find_or_insert() {
        let mut palette = SurfacePalette::default();
        let a = palette.local(30);
        let b = palette.local(42);
        assert_eq!(palette.local(30), a);
        assert_ne!(a, b);
        assert_eq!(palette.global(a), 30);
        assert_eq!(palette.global(b), 42);
        assert_eq!(palette.used(), 2);
    }

    #[test]
    fn test_palette_reserved_markers() {
        let mut palette = SurfacePalette::default();
        assert_eq!(palette.local(GLOBAL_HOLE), LOCAL_HOLE);
        assert_eq!(palette.local(GLOBAL_UNDEFINED), LOCAL_UNDEFINED);
        assert_eq!(palette.global(LOCAL_HOLE), GLOBAL_HOLE);
        assert_eq!(palette.global(LOCAL_UNDEFINED), GLOBAL_UNDEFINED);
    }

    #[test]
    fn test_palette_full_returns_undefined() {
        let mut palette = SurfacePalette::default();
        for g in 0..LOCAL_UNDEFINED {
            palette.local(g + 30);
        }
        assert_eq!(palette.local(99), LOCAL_UNDEFINED);
    }

    #[test]
    fn test_quantize_roundtrip_within_one_step() {
        let mut range = RangeInfo::with_size(3);
        range.set_range(10.0, 200.0);
        for h in [10.0f32, 57.3, 142.0, 200.0] {
            let raw = range.quantize(h);
            assert!((range.dequantize(raw) - h).abs() <= range.scale);
        }
    }

    #[test]
    fn test_flat_range_quantizes_to_zero() {
        let mut range = RangeInfo::with_size(3);
        range.set_range(50.0, 50.0);
        assert_eq!(range.quantize(50.0), 0);
        assert_eq!(range.dequantize(0), 50.0);
    }

    #[test]
    fn test_unit_bit_shift() {
        // 64-unit sector stored as a 65-cell grid keeps full resolution
        let mut range = RangeInfo::with_size(65);
        range.update_bit_shift(6);
        assert_eq!(range.unit_bit_shift, 0);

        // same sector stored as 17 cells snaps every 4 units
        let mut coarse = RangeInfo::with_size(17);
        coarse.update_bit_shift(6);
        assert_eq!(coarse.unit_bit_shift, 2);
    }

    #[test]
    fn test_cell_at_units_snaps_and_clamps() {
        let mut range = RangeInfo::with_size(3);
        range.update_bit_shift(2);
        range.set_cell(1, 0, HeightCell::new(7, 0));
        assert_eq!(range.unit_bit_shift, 1);
        assert_eq!(range.cell_at_units(2, 0).height_raw(), 7);
        assert_eq!(range.cell_at_units(3, 0).height_raw(), 7);
        // unit past the far edge clamps to the last cell
        assert_eq!(range.cell_at_units(100, 0), range.cell(2, 0));
    }

    #[test]
    fn test_has_holes() {
        let mut range = RangeInfo::with_size(2);
        assert!(!range.has_holes());
        range.set_cell(0, 1, HeightCell::new(0, SurfaceBlend::hole().encode()));
        assert!(range.has_holes());
    }

    #[test]
    fn test_height_bounds() {
        let mut range = RangeInfo::with_size(2);
        range.set_range(0.0, 409.5);
        range.set_cell(0, 0, HeightCell::new(range.quantize(10.0), 0));
        range.set_cell(1, 0, HeightCell::new(range.quantize(300.0), 0));
        let (lo, hi) = range.height_bounds();
        assert!(lo <= 10.0 + range.scale);
        assert!(hi >= 300.0 - range.scale);
    }
}
