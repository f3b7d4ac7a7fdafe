//! # Surface Extraction
//!
//! Marching cubes over one chunk, producing two aligned outputs from the
//! same triangulation: a flat render buffer (position, normal, block type
//! per vertex) and an indexed collision mesh.
//!
//! Seam contract: every emitted vertex position is a function of two
//! corner world coordinates and their densities only. Densities are pure
//! in world coordinates, so two adjacent chunks compute bit-identical
//! positions along their shared face. Nothing in here may depend on which
//! chunk a cube was visited from.

use std::collections::HashMap;

use basalt_core::{BlockType, Vec3, ISO_LEVEL};
use basalt_procedural::chunk::{CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z};
use basalt_procedural::{ChunkCoord, ChunkSampler, ChunkVoxels};

use crate::tables::{CORNER_OFFSETS, EDGE_CORNERS, EDGE_TABLE, TRI_TABLE};

/// Floor on the interpolation denominator.
pub const INTERP_EPSILON: f32 = 1e-6;

/// Triangles with squared area below this are dropped.
pub const DEGENERATE_AREA_SQ: f32 = 1e-10;

/// Floats per render vertex: `(x, y, z, nx, ny, nz, block_type)`.
pub const FLOATS_PER_VERTEX: usize = 7;

/// Anything the extractor can sample.
///
/// Implementations must be pure in world coordinates for the seam
/// contract to hold.
pub trait DensitySource {
    /// Density at an integer world coordinate.
    fn density(&self, x: i32, y: i32, z: i32) -> f32;
    /// Block type at an integer world coordinate.
    fn block_type(&self, x: i32, y: i32, z: i32) -> BlockType;
}

impl DensitySource for ChunkSampler {
    fn density(&self, x: i32, y: i32, z: i32) -> f32 {
        ChunkSampler::density(self, x, y, z)
    }

    fn block_type(&self, x: i32, y: i32, z: i32) -> BlockType {
        ChunkSampler::block_type(self, x, y, z)
    }
}

/// A sampler paired with the chunk's assembled voxel array.
///
/// Density queries go to the sampler; block-type queries inside the chunk
/// are answered from the voxels without reclassifying.
pub struct ChunkField<'a> {
    sampler: &'a ChunkSampler,
    voxels: &'a ChunkVoxels,
}

impl<'a> ChunkField<'a> {
    /// Pairs a sampler with the voxels assembled through it.
    #[must_use]
    pub fn new(sampler: &'a ChunkSampler, voxels: &'a ChunkVoxels) -> Self {
        Self { sampler, voxels }
    }
}

impl DensitySource for ChunkField<'_> {
    fn density(&self, x: i32, y: i32, z: i32) -> f32 {
        self.sampler.density(x, y, z)
    }

    fn block_type(&self, x: i32, y: i32, z: i32) -> BlockType {
        let (ox, oy, oz) = self.sampler.origin();
        let lx = x - ox;
        let ly = y - oy;
        let lz = z - oz;
        if lx >= 0
            && (lx as usize) < CHUNK_SIZE_X
            && ly >= 0
            && (ly as usize) < CHUNK_SIZE_Y
            && lz >= 0
            && (lz as usize) < CHUNK_SIZE_Z
        {
            self.voxels.get(lx as usize, ly as usize, lz as usize)
        } else {
            self.sampler.block_type(x, y, z)
        }
    }
}

/// Shaded render mesh: a flat buffer of [`FLOATS_PER_VERTEX`] floats per
/// vertex, three vertices per triangle, positions in world space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderMesh {
    /// The flat vertex buffer.
    pub data: Vec<f32>,
}

impl RenderMesh {
    /// Number of vertices (always a multiple of 3).
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.data.len() / FLOATS_PER_VERTEX
    }

    /// Number of triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.vertex_count() / 3
    }

    /// True when the mesh has no triangles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Position of vertex `i`.
    #[must_use]
    pub fn position(&self, i: usize) -> Vec3 {
        let base = i * FLOATS_PER_VERTEX;
        Vec3::new(self.data[base], self.data[base + 1], self.data[base + 2])
    }

    /// Normal of vertex `i`.
    #[must_use]
    pub fn normal(&self, i: usize) -> Vec3 {
        let base = i * FLOATS_PER_VERTEX + 3;
        Vec3::new(self.data[base], self.data[base + 1], self.data[base + 2])
    }

    /// Block type of vertex `i`.
    #[must_use]
    pub fn block_type(&self, i: usize) -> BlockType {
        BlockType::from_u8(self.data[i * FLOATS_PER_VERTEX + 6] as u8)
    }
}

/// Collision mesh: deduplicated positions plus triangle indices, covering
/// the same surface as the render mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollisionMesh {
    /// Unique vertex positions in world space.
    pub vertices: Vec<Vec3>,
    /// Triangle indices, three per triangle.
    pub indices: Vec<u32>,
}

impl CollisionMesh {
    /// Number of triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// True when the mesh has no triangles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Extracts the iso-surface of one chunk.
///
/// Never fails: a chunk whose corner grid is entirely solid or entirely
/// air yields two empty (but valid) meshes.
#[must_use]
pub fn extract<S: DensitySource>(source: &S, coord: ChunkCoord) -> (RenderMesh, CollisionMesh) {
    let (ox, oy, oz) = coord.origin();

    // One density sample per cube corner, shared by the up-to-8 cubes that
    // touch it. The grid spans one voxel past each face.
    const GRID_X: usize = CHUNK_SIZE_X + 1;
    const GRID_Y: usize = CHUNK_SIZE_Y + 1;
    const GRID_Z: usize = CHUNK_SIZE_Z + 1;
    let grid_index = |lx: usize, ly: usize, lz: usize| (ly * GRID_Z + lz) * GRID_X + lx;

    let mut grid = vec![0.0f32; GRID_X * GRID_Y * GRID_Z];
    let mut any_solid = false;
    let mut any_air = false;
    for ly in 0..GRID_Y {
        for lz in 0..GRID_Z {
            for lx in 0..GRID_X {
                let d = source.density(ox + lx as i32, oy + ly as i32, oz + lz as i32);
                if d < ISO_LEVEL {
                    any_air = true;
                } else {
                    any_solid = true;
                }
                grid[grid_index(lx, ly, lz)] = d;
            }
        }
    }

    let mut render = RenderMesh::default();
    let mut collision = CollisionMesh::default();

    // Uniform region: no iso crossing anywhere, nothing to extract.
    if !(any_solid && any_air) {
        return (render, collision);
    }

    let mut dedup: HashMap<(u32, u32, u32), u32> = HashMap::new();
    let mut corner_density = [0.0f32; 8];
    let mut corner_pos = [Vec3::ZERO; 8];
    let mut edge_vertex = [Vec3::ZERO; 12];

    for ly in 0..CHUNK_SIZE_Y {
        for lz in 0..CHUNK_SIZE_Z {
            for lx in 0..CHUNK_SIZE_X {
                let mut cube_index = 0usize;
                for (i, &(dx, dy, dz)) in CORNER_OFFSETS.iter().enumerate() {
                    let gx = lx + dx as usize;
                    let gy = ly + dy as usize;
                    let gz = lz + dz as usize;
                    let d = grid[grid_index(gx, gy, gz)];
                    corner_density[i] = d;
                    corner_pos[i] = Vec3::new(
                        (ox + gx as i32) as f32,
                        (oy + gy as i32) as f32,
                        (oz + gz as i32) as f32,
                    );
                    if d < ISO_LEVEL {
                        cube_index |= 1 << i;
                    }
                }

                let edge_mask = EDGE_TABLE[cube_index];
                if edge_mask == 0 {
                    continue;
                }

                for (edge, &(a, b)) in EDGE_CORNERS.iter().enumerate() {
                    if edge_mask & (1 << edge) == 0 {
                        continue;
                    }
                    edge_vertex[edge] = interpolate_edge(
                        corner_pos[a],
                        corner_pos[b],
                        corner_density[a],
                        corner_density[b],
                    );
                }

                emit_cube_triangles(
                    source,
                    cube_index,
                    &edge_vertex,
                    &mut render,
                    &mut collision,
                    &mut dedup,
                );
            }
        }
    }

    (render, collision)
}

/// Vertex position on an edge crossing the iso level.
///
/// The endpoints are put in a canonical order first: two neighboring
/// chunks visit the same world edge with opposite corner order, and
/// `lerp(a, b, t)` is not bit-identical to `lerp(b, a, 1 - t)` in f32.
/// After canonicalization the result depends only on the edge's world
/// coordinates and densities, never on the visiting chunk.
#[inline]
fn interpolate_edge(pa: Vec3, pb: Vec3, da: f32, db: f32) -> Vec3 {
    let (pa, pb, da, db) = if (pb.x, pb.y, pb.z) < (pa.x, pa.y, pa.z) {
        (pb, pa, db, da)
    } else {
        (pa, pb, da, db)
    };

    let denom = db - da;
    let t = if denom.abs() < INTERP_EPSILON {
        0.5
    } else {
        ((ISO_LEVEL - da) / denom).clamp(0.0, 1.0)
    };
    pa.lerp(pb, t)
}

/// Emits the triangles of one cube into both meshes.
fn emit_cube_triangles<S: DensitySource>(
    source: &S,
    cube_index: usize,
    edge_vertex: &[Vec3; 12],
    render: &mut RenderMesh,
    collision: &mut CollisionMesh,
    dedup: &mut HashMap<(u32, u32, u32), u32>,
) {
    let row = &TRI_TABLE[cube_index];
    let mut slot = 0;
    while slot < 16 && row[slot] >= 0 {
        let v0 = edge_vertex[row[slot] as usize];
        let v1 = edge_vertex[row[slot + 1] as usize];
        let v2 = edge_vertex[row[slot + 2] as usize];
        slot += 3;

        let cross = v1.sub(v0).cross(v2.sub(v0));
        let area_sq = cross.length_squared() * 0.25;
        if area_sq < DEGENERATE_AREA_SQ {
            continue;
        }
        let normal = cross.normalized_or_up(1e-10);

        let block = triangle_block(source, v0, v1, v2, normal);
        let block_f = f32::from(block.as_u8());

        for v in [v0, v1, v2] {
            render.data.extend_from_slice(&[
                v.x, v.y, v.z, normal.x, normal.y, normal.z, block_f,
            ]);
            let index = collision_index(collision, dedup, v);
            collision.indices.push(index);
        }
    }
}

/// Index of `v` in the collision vertex list, inserting on first sight.
fn collision_index(
    collision: &mut CollisionMesh,
    dedup: &mut HashMap<(u32, u32, u32), u32>,
    v: Vec3,
) -> u32 {
    let key = (v.x.to_bits(), v.y.to_bits(), v.z.to_bits());
    if let Some(&index) = dedup.get(&key) {
        return index;
    }
    let index = collision.vertices.len() as u32;
    collision.vertices.push(v);
    dedup.insert(key, index);
    index
}

/// Block type for a triangle: the voxel under the rounded centroid.
///
/// Right at the surface the rounded centroid can land on the air side;
/// probe one half-step against the normal, then fall back to stone.
fn triangle_block<S: DensitySource>(source: &S, v0: Vec3, v1: Vec3, v2: Vec3, normal: Vec3) -> BlockType {
    let centroid = v0.add(v1).add(v2).scale(1.0 / 3.0);
    let block = source.block_type(
        centroid.x.round() as i32,
        centroid.y.round() as i32,
        centroid.z.round() as i32,
    );
    if block != BlockType::Air {
        return block;
    }

    let inside = centroid.sub(normal.scale(0.5));
    let block = source.block_type(
        inside.x.round() as i32,
        inside.y.round() as i32,
        inside.z.round() as i32,
    );
    if block != BlockType::Air {
        return block;
    }
    BlockType::Stone
}
