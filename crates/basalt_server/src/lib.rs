//! # BASALT Server
//!
//! The network-facing core of the voxel-terrain server:
//!
//! - **TCP chunk pipeline**: framed requests, length-prefixed mesh
//!   responses, per-connection write permits, edit broadcasts
//! - **Mesh cache**: bounded, approximate-LRU, per-coordinate
//!   single-flight builds on the blocking pool
//! - **Tick loop**: 60 Hz pacing, telemetry summaries, cleanup scheduling
//! - **Entity bus**: UDP player state with server-side movement
//!   validation and best-effort fan-out
//!
//! One `TerrainServer` owns the world, both sockets, and every loop; a
//! single shutdown handle cancels all of it.

#![deny(missing_docs)]

pub mod bus;
pub mod cache;
pub mod error;
pub mod metrics;
pub mod net;
pub mod protocol;
pub mod tick;

pub use bus::{MovementUpdate, MovementValidator, PlayerId, PlayerRegistry, PlayerState};
pub use cache::MeshCache;
pub use error::ServerError;
pub use metrics::{Metrics, MetricsSnapshot};
pub use net::{ShutdownHandle, StreamRegistry, TerrainServer};
pub use tick::TickPacer;
