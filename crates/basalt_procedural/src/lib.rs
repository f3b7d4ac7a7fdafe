//! # BASALT Procedural Generation
//!
//! Deterministic world generation for an infinite, reproducible terrain.
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: same seed = same world, always, on any platform
//! 2. **Column-pure**: per-(x, z) data never reads neighbor columns
//! 3. **Continuous**: the density field has no steps, so meshes built per
//!    chunk agree exactly along shared faces
//! 4. **Bounded**: the column cache is capacity-limited with clock-sweep
//!    eviction
//!
//! ## Core Components
//!
//! - `SimplexNoise`: seed-derived 2D/3D fractal noise
//! - `ClimateSampler`: smooth four-biome partition and height blending
//! - `WorldContext`: density field, cave carving, block classification,
//!   edit overlay
//! - `ChunkManager`: column cache and chunk voxel assembly

#![deny(missing_docs)]

pub mod biome;
pub mod chunk;
pub mod column;
pub mod edits;
pub mod manager;
pub mod noise;
pub mod world;

pub use biome::{Biome, BiomeWeights, ClimateSampler};
pub use chunk::{ChunkCoord, ChunkVoxels, CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z};
pub use column::ColumnData;
pub use edits::{CarveSite, EditOverlay, EditSnapshot, BLOCK_BREAK_RADIUS, BLOCK_BREAK_STRENGTH};
pub use manager::{ChunkManager, ChunkSampler};
pub use noise::{SimplexNoise, WorldSeed};
pub use world::WorldContext;
