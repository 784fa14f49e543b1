//! Asset deduplication pool
//!
//! Geometry payloads are shared across every placement that names them.
//! The pool hands out refcounted handles, the coordinator streams payloads
//! in and out, and a deferred garbage pass reclaims entries nothing holds.

pub mod geometry;
pub mod pool;

pub use geometry::{
    GeometryAsset, GeometryData, compress_geometry, decompress_geometry, geometry_path,
    load_geometry, save_geometry,
};
pub use pool::{AssetState, GeometryEntry, GeometryHandle, GeometryPool};
