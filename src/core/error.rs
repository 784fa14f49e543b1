//! Error types for the Terrasect engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Debug, Error)]
pub enum Error {
    /// Stored chunk was written by an incompatible format version.
    #[error("chunk version mismatch: file has {found}, expected {expected}")]
    VersionMismatch { expected: i32, found: i32 },

    /// The header's declared size disagrees with the bytes actually present.
    #[error("chunk size mismatch: header declares {declared} bytes, {actual} available")]
    SizeMismatch { declared: usize, actual: usize },

    /// Structural damage: bad table index, truncated payload, impossible counts.
    #[error("corrupt chunk data: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("asset error: {0}")]
    Asset(String),

    #[error("streaming error: {0}")]
    Streaming(String),

    #[error("config error: {0}")]
    Config(String),
}
