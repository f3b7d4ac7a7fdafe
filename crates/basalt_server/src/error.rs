//! # Server Error Kinds
//!
//! One connection's error never reaches another connection: everything
//! here is handled at connection scope (close and log) or request scope
//! (drop the packet). Only bind failures abort startup.

use basalt_procedural::ChunkCoord;

use crate::protocol::WireError;

/// Pipeline and bus failures.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Socket-level failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or oversized frame.
    #[error("protocol error: {0}")]
    Wire(#[from] WireError),

    /// A peer stopped responding within the I/O timeout.
    #[error("i/o timed out")]
    Timeout,

    /// Chunk or mesh construction died (builder panicked).
    ///
    /// The cache entry is left absent so a retry can succeed.
    #[error("build failed for chunk {coord:?}")]
    Build {
        /// The chunk that failed to build.
        coord: ChunkCoord,
    },
}

impl From<tokio::time::error::Elapsed> for ServerError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}
