//! Terrain quadtree, cells, and serialization

pub mod cell;
pub mod compile;
pub mod generator;
pub mod node;
pub mod range;
pub mod terrain;

pub use cell::{HeightCell, SurfaceBlend};
pub use compile::{ExportFilter, LayerVisibility};
pub use generator::{GeneratorParams, NoiseHeightfield, scatter_vegetation};
pub use node::{LeafData, Placement, PlacementKind, SectorKey, TerrainNode};
pub use range::{RangeInfo, SurfacePalette};
pub use terrain::{FlatSource, FnSource, HeightfieldSink, HeightfieldSource, InstanceGroup, Terrain};
