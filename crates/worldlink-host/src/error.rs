//! Error types for the host layer.
//!
//! `InvalidSize`, `OutOfBounds` and `WorldNotFound` are shown to peers
//! verbatim.

/// Errors returned by host operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("Invalid size. Must be between 3 and 100.")]
    InvalidSize(i64),

    /// Part of the footprint falls outside the coordinate range.
    #[error("Structure at ({x}, {y}, {z}) does not fit inside the world bounds.")]
    OutOfBounds { x: i64, y: i64, z: i64 },

    #[error("World not found: {0}")]
    WorldNotFound(String),

    /// The update thread has stopped or dropped the request.
    #[error("host update loop is unavailable")]
    Unavailable,
}
