//! # BASALT Mesh
//!
//! Marching-cubes surface extraction over the BASALT density field,
//! producing two aligned outputs per chunk:
//!
//! - a **render mesh**: flat `f32` buffer, 7 floats per vertex
//!   `(x, y, z, nx, ny, nz, block_type)`, three vertices per triangle
//! - a **collision mesh**: deduplicated positions plus triangle indices
//!
//! Both cover the same triangulation. Extraction samples density one voxel
//! past each chunk face so surfaces continue seamlessly into neighbors.

#![deny(missing_docs)]

pub mod marching;
pub mod tables;

pub use marching::{
    extract, ChunkField, CollisionMesh, DensitySource, RenderMesh, DEGENERATE_AREA_SQ,
    FLOATS_PER_VERTEX, INTERP_EPSILON,
};
