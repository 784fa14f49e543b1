//! Noise-based procedural heightfields
//!
//! A fractal Brownian motion source for building terrains without
//! authored data, plus a deterministic vegetation scatter that respects
//! each group's density, slope, and elevation constraints.

use crate::core::types::{Result, Vec3};
use crate::terrain::terrain::{HeightfieldSource, Terrain};
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

/// Parameters controlling terrain generation
#[derive(Clone, Debug)]
pub struct GeneratorParams {
    pub seed: u32,
    /// Horizontal scale in units (larger = smoother)
    pub scale: f32,
    /// Max height in meters
    pub height_scale: f32,
    pub octaves: u32,
    pub persistence: f32,
    pub lacunarity: f32,
    /// Surface type band edges as fractions of `height_scale`
    pub surface_bands: [f32; 3],
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            scale: 100.0,
            height_scale: 64.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
            surface_bands: [0.25, 0.55, 0.8],
        }
    }
}

/// Procedural heightfield using fractal Brownian motion
pub struct NoiseHeightfield {
    params: GeneratorParams,
    noise: Fbm<Perlin>,
}

impl NoiseHeightfield {
    pub fn new(params: GeneratorParams) -> Self {
        let noise = Fbm::<Perlin>::new(params.seed)
            .set_octaves(params.octaves as usize)
            .set_persistence(params.persistence as f64)
            .set_lacunarity(params.lacunarity as f64);
        Self { params, noise }
    }

    pub fn params(&self) -> &GeneratorParams {
        &self.params
    }

    fn height(&self, x: f32, y: f32) -> f32 {
        let nx = (x / self.params.scale) as f64;
        let ny = (y / self.params.scale) as f64;
        let noise_value = self.noise.get([nx, ny]);
        let normalized = (noise_value + 1.0) / 2.0;
        (normalized * self.params.height_scale as f64) as f32
    }
}

impl HeightfieldSource for NoiseHeightfield {
    fn height_at(&self, x_units: u32, y_units: u32) -> f32 {
        self.height(x_units as f32, y_units as f32)
    }

    fn surface_at(&self, x_units: u32, y_units: u32) -> u8 {
        let h = self.height(x_units as f32, y_units as f32);
        let t = h / self.params.height_scale;
        let bands = self.params.surface_bands;
        if t < bands[0] {
            0 // shoreline
        } else if t < bands[1] {
            1 // grassland
        } else if t < bands[2] {
            2 // rock
        } else {
            3 // snow
        }
    }
}

/// Deterministic per-position hash in [0, 1)
fn hash01(seed: u32, x: u32, y: u32) -> f32 {
    let mut h = seed ^ x.wrapping_mul(0x9E37_79B9) ^ y.wrapping_mul(0x85EB_CA6B);
    h ^= h >> 16;
    h = h.wrapping_mul(0x7FEB_352D);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846C_A68B);
    h ^= h >> 16;
    (h >> 8) as f32 / (1u32 << 24) as f32
}

/// Scatter vegetation instances over a terrain from its registered groups.
///
/// Candidate positions lie on a fixed grid; each is accepted by a
/// position hash against the group's density, then checked against the
/// group's slope and elevation limits. The same seed always produces the
/// same placements. Returns the number of instances placed.
pub fn scatter_vegetation(terrain: &mut Terrain, seed: u32) -> Result<usize> {
    const CANDIDATE_STEP: u32 = 4;

    let mut placed = 0usize;
    let size = terrain.terrain_size_units;
    let groups: Vec<(i32, f32, f32, f32, f32, f32)> = terrain
        .groups
        .iter()
        .enumerate()
        .map(|(i, g)| {
            (
                i as i32,
                g.chunk.density,
                g.chunk.slope_min,
                g.chunk.slope_max,
                g.chunk.elevation_min,
                g.chunk.elevation_max,
            )
        })
        .collect();

    for (group_index, density, slope_min, slope_max, elev_min, elev_max) in groups {
        let accept = (density * 0.25).clamp(0.0, 1.0);
        let group_seed = seed.wrapping_add(group_index as u32).wrapping_mul(0x9E37_79B9);
        for uy in (0..size).step_by(CANDIDATE_STEP as usize) {
            for ux in (0..size).step_by(CANDIDATE_STEP as usize) {
                if hash01(group_seed, ux, uy) >= accept {
                    continue;
                }
                let x = ux as f32 * terrain.unit_size;
                let y = uy as f32 * terrain.unit_size;
                if terrain.is_hole_at(x, y) {
                    continue;
                }
                let h = terrain.height_at(x, y);
                if h < elev_min || h > elev_max {
                    continue;
                }
                let ahead = terrain.height_at(x + terrain.unit_size, y);
                let slope_deg = ((ahead - h) / terrain.unit_size).atan().to_degrees().abs();
                if slope_deg < slope_min || slope_deg > slope_max {
                    continue;
                }
                let scale = 0.8 + 0.4 * hash01(group_seed ^ 1, ux, uy);
                let rotation = std::f32::consts::TAU * hash01(group_seed ^ 2, ux, uy);
                terrain.add_vegetation(group_index, Vec3::new(x, y, h), scale, rotation, 0)?;
                placed += 1;
            }
        }
    }

    log::info!("scattered {} vegetation instances", placed);
    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::GeometryPool;
    use crate::codec::InstanceGroupChunk;
    use crate::core::config::TerrainConfig;

    fn cfg() -> TerrainConfig {
        TerrainConfig {
            sector_size: 16,
            unit_size: 1.0,
            flatness_threshold: 0.0,
            ocean_level: 0.0,
        }
    }

    #[test]
    fn test_heights_in_range_and_deterministic() {
        let source = NoiseHeightfield::new(GeneratorParams::default());
        let again = NoiseHeightfield::new(GeneratorParams::default());
        for (x, y) in [(0u32, 0u32), (17, 91), (500, 3)] {
            let h = source.height_at(x, y);
            assert!((0.0..=64.0).contains(&h));
            assert_eq!(h, again.height_at(x, y));
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = NoiseHeightfield::new(GeneratorParams::default());
        let b = NoiseHeightfield::new(GeneratorParams {
            seed: 999,
            ..GeneratorParams::default()
        });
        let differs = (0..32u32).any(|i| a.height_at(i * 7, i * 13) != b.height_at(i * 7, i * 13));
        assert!(differs);
    }

    #[test]
    fn test_surface_bands_follow_elevation() {
        let source = NoiseHeightfield::new(GeneratorParams::default());
        for (x, y) in [(0u32, 0u32), (50, 80), (200, 10)] {
            let t = source.height_at(x, y) / 64.0;
            let surface = source.surface_at(x, y);
            if t < 0.25 {
                assert_eq!(surface, 0);
            } else if t >= 0.8 {
                assert_eq!(surface, 3);
            }
        }
    }

    #[test]
    fn test_scatter_is_deterministic() {
        let source = NoiseHeightfield::new(GeneratorParams::default());
        let pool = GeometryPool::new(0.0);

        let mut count_placements = |seed: u32| -> usize {
            let mut terrain = Terrain::build(&cfg(), 64, &source).expect("build failed");
            terrain.register_group(
                &pool,
                InstanceGroupChunk {
                    geometry_path: "trees/pine_01".into(),
                    density: 2.0,
                    size: 8.0,
                    ..Default::default()
                },
            );
            scatter_vegetation(&mut terrain, seed).expect("scatter failed")
        };

        let first = count_placements(42);
        assert!(first > 0);
        assert_eq!(count_placements(42), first);
    }

    #[test]
    fn test_scatter_respects_elevation_limits() {
        let source = NoiseHeightfield::new(GeneratorParams::default());
        let pool = GeometryPool::new(0.0);
        let mut terrain = Terrain::build(&cfg(), 64, &source).expect("build failed");
        terrain.register_group(
            &pool,
            InstanceGroupChunk {
                geometry_path: "trees/pine_01".into(),
                density: 4.0,
                elevation_min: 1000.0,
                elevation_max: 2000.0,
                ..Default::default()
            },
        );
        // nothing on this map reaches the required elevation
        assert_eq!(
            scatter_vegetation(&mut terrain, 7).expect("scatter failed"),
            0
        );
    }
}
