//! Update dispatch
//!
//! Sector mesh rebuilds run off the main thread on a bounded worker pool
//! with preallocated scratch buffers.

pub mod dispatcher;
pub mod mesher;
pub mod scratch;

pub use dispatcher::UpdateDispatcher;
pub use mesher::{SectorMesh, SectorSnapshot, TerrainVertex, build_sector_mesh};
pub use scratch::{ScratchSlot, SlotPool};
