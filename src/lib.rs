//! Terrasect - a quadtree terrain streaming and LOD engine

pub mod core;
pub mod math;
pub mod codec;
pub mod assets;
pub mod terrain;
pub mod visarea;
pub mod streaming;
pub mod dispatch;
