//! # BASALT Core
//!
//! Shared foundation for the BASALT voxel-terrain server:
//!
//! - `math`: the small `f32` vector type the mesher and validator share
//! - `block`: stable block identities (part of the wire contract)
//! - `config`: process-wide settings, loaded once at startup
//!
//! Everything here is dependency-light and allocation-free so the
//! generation and meshing hot paths can use it without ceremony.

#![deny(missing_docs)]

pub mod block;
pub mod config;
pub mod math;

pub use block::BlockType;
pub use config::{ConfigError, ServerConfig};
pub use math::Vec3;

/// Below this Y level the world is unconditionally solid.
pub const Y_BEDROCK: i32 = -64;

/// At and above this Y level the world is unconditionally air.
pub const Y_SKY: i32 = 128;

/// The density iso-contour separating solid from air.
pub const ISO_LEVEL: f32 = 0.5;

/// Hard cap on any single length-prefixed payload (100 MB).
pub const MAX_PAYLOAD_BYTES: usize = 100 * 1024 * 1024;
