//! Packed heightmap cells
//!
//! Each cell is a single `u32`: a 12-bit quantized height in the top bits
//! and a 20-bit surface word below it. The surface word holds up to three
//! 4-bit local surface ids plus two explicit 4-bit blend weights; the
//! first weight is implicit so the three always sum to `MAX_WEIGHT`.

/// Bits of quantized height per cell
pub const HEIGHT_BITS: u32 = 12;
/// Bits of packed surface data per cell
pub const SURFACE_BITS: u32 = 20;
/// Maximum quantized height value
pub const MAX_HEIGHT_RAW: u32 = (1 << HEIGHT_BITS) - 1;
/// Surface types blended per cell
pub const MAX_BLEND_TYPES: usize = 3;
/// Blend weights sum to this
pub const MAX_WEIGHT: u8 = 15;

/// Local id meaning "no surface assigned"
pub const LOCAL_UNDEFINED: u8 = 14;
/// Local id marking a hole in the terrain
pub const LOCAL_HOLE: u8 = 15;
/// Entries in a sector's local-to-global palette
pub const PALETTE_SIZE: usize = 16;

/// Global id meaning "no surface assigned"
pub const GLOBAL_UNDEFINED: u8 = 127;
/// Global id marking a hole in the terrain
pub const GLOBAL_HOLE: u8 = 128;

/// Up to three local surface types with blend weights
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceBlend {
    pub ty: [u8; MAX_BLEND_TYPES],
    pub we: [u8; MAX_BLEND_TYPES],
}

impl Default for SurfaceBlend {
    fn default() -> Self {
        Self {
            ty: [LOCAL_UNDEFINED; MAX_BLEND_TYPES],
            we: [MAX_WEIGHT, 0, 0],
        }
    }
}

impl SurfaceBlend {
    /// Single fully-weighted surface type
    pub fn single(ty: u8) -> Self {
        Self {
            ty: [ty, LOCAL_UNDEFINED, LOCAL_UNDEFINED],
            we: [MAX_WEIGHT, 0, 0],
        }
    }

    /// Hole marker
    pub fn hole() -> Self {
        Self::single(LOCAL_HOLE)
    }

    pub fn is_hole(&self) -> bool {
        self.ty[0] == LOCAL_HOLE
    }

    /// Pack into the 20-bit surface word.
    ///
    /// Layout: byte 0 holds types 0 and 1, byte 1 holds type 2 and
    /// weight 1, the low nibble of byte 2 holds weight 2. Weight 0 is
    /// recovered on decode as `MAX_WEIGHT - we1 - we2`.
    pub fn encode(&self) -> u32 {
        debug_assert!(self.ty.iter().all(|&t| t <= LOCAL_HOLE));
        debug_assert!(self.we[1] <= MAX_WEIGHT && self.we[2] <= MAX_WEIGHT);
        let b0 = (self.ty[0] & 0xF) | ((self.ty[1] & 0xF) << 4);
        let b1 = (self.ty[2] & 0xF) | ((self.we[1] & 0xF) << 4);
        let b2 = self.we[2] & 0xF;
        (b0 as u32) | ((b1 as u32) << 8) | ((b2 as u32) << 16)
    }

    /// Unpack from the 20-bit surface word
    pub fn decode(value: u32) -> Self {
        let b0 = (value & 0xFF) as u8;
        let b1 = ((value >> 8) & 0xFF) as u8;
        let b2 = ((value >> 16) & 0xF) as u8;
        let we1 = b1 >> 4;
        let we2 = b2;
        let we0 = MAX_WEIGHT.saturating_sub(we1).saturating_sub(we2);
        Self {
            ty: [b0 & 0xF, b0 >> 4, b1 & 0xF],
            we: [we0, we1, we2],
        }
    }
}

/// One packed heightmap cell
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeightCell(pub u32);

impl HeightCell {
    pub fn new(height_raw: u32, surface: u32) -> Self {
        debug_assert!(height_raw <= MAX_HEIGHT_RAW);
        Self((height_raw << SURFACE_BITS) | (surface & ((1 << SURFACE_BITS) - 1)))
    }

    /// Quantized 12-bit height
    pub fn height_raw(&self) -> u32 {
        self.0 >> SURFACE_BITS
    }

    /// Packed 20-bit surface word
    pub fn surface(&self) -> u32 {
        self.0 & ((1 << SURFACE_BITS) - 1)
    }

    pub fn blend(&self) -> SurfaceBlend {
        SurfaceBlend::decode(self.surface())
    }

    pub fn is_hole(&self) -> bool {
        self.blend().is_hole()
    }

    pub fn with_height_raw(&self, height_raw: u32) -> Self {
        Self::new(height_raw, self.surface())
    }

    pub fn with_surface(&self, surface: u32) -> Self {
        Self::new(self.height_raw(), surface)
    }
}
