//! Geometry streaming
//!
//! Priority-driven loading of pooled geometry against a memory budget:
//! an async loader for disk I/O, importance scoring from the camera, and
//! a per-tick coordinator that decides what loads, what releases, and
//! what gets collected.

pub mod budget;
pub mod coordinator;
pub mod loader;
pub mod priority;

pub use budget::StreamBudget;
pub use coordinator::{StreamingCoordinator, TickStats};
pub use loader::{AssetLoader, LoadRequest, LoadResult};
pub use priority::{CameraState, compute_importance};
