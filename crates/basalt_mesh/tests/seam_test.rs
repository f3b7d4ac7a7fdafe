//! # Seam Integration Test
//!
//! Extracts neighboring chunks from a real world and proves the meshes
//! agree exactly along shared faces, plus the well-formedness contract on
//! real terrain.

use std::collections::HashSet;
use std::sync::Arc;

use basalt_core::{BlockType, Y_BEDROCK};
use basalt_mesh::{extract, ChunkField, CollisionMesh, RenderMesh, DEGENERATE_AREA_SQ};
use basalt_procedural::{ChunkCoord, ChunkManager, WorldContext, WorldSeed, CHUNK_SIZE_Y};

const SEED: u64 = 69_420;

fn build(manager: &ChunkManager, coord: ChunkCoord) -> (RenderMesh, CollisionMesh) {
    let sampler = manager.sampler(coord);
    let voxels = sampler.assemble(coord);
    let field = ChunkField::new(&sampler, &voxels);
    extract(&field, coord)
}

fn manager() -> ChunkManager {
    ChunkManager::new(Arc::new(WorldContext::new(WorldSeed::new(SEED))), 20_000)
}

#[test]
fn test_surface_chunk_well_formed() {
    let mgr = manager();
    let (render, collision) = build(&mgr, ChunkCoord::new(0, 0, 0));

    // The surface crosses the y=0 chunk band, so this is never empty.
    assert!(!render.is_empty());
    assert_eq!(render.data.len() % 21, 0, "render buffer not whole triangles");
    assert_eq!(collision.indices.len() % 3, 0);
    assert_eq!(render.triangle_count(), collision.triangle_count());

    for i in 0..render.vertex_count() {
        let n = render.normal(i);
        assert!(
            (n.length() - 1.0).abs() < 1e-4,
            "vertex {i} normal length {}",
            n.length()
        );
        assert_ne!(render.block_type(i), BlockType::Air, "vertex {i} typed as air");
    }

    for t in 0..render.triangle_count() {
        let a = render.position(t * 3);
        let b = render.position(t * 3 + 1);
        let c = render.position(t * 3 + 2);
        let area_sq = b.sub(a).cross(c.sub(a)).length_squared() * 0.25;
        assert!(area_sq >= DEGENERATE_AREA_SQ, "triangle {t} degenerate");
    }

    for &index in &collision.indices {
        assert!((index as usize) < collision.vertices.len(), "index out of range");
    }
}

/// Collects the vertex positions of `render` lying on the plane `x = px`,
/// as bit patterns so comparison is exact.
fn face_vertices(render: &RenderMesh, px: f32) -> HashSet<(u32, u32, u32)> {
    let mut set = HashSet::new();
    for i in 0..render.vertex_count() {
        let p = render.position(i);
        if (p.x - px).abs() < 1e-5 {
            set.insert((p.x.to_bits(), p.y.to_bits(), p.z.to_bits()));
        }
    }
    set
}

#[test]
fn test_seam_vertices_identical_between_neighbors() {
    let mgr = manager();
    let (left, _) = build(&mgr, ChunkCoord::new(0, 0, 0));
    let (right, _) = build(&mgr, ChunkCoord::new(1, 0, 0));

    let left_face = face_vertices(&left, 32.0);
    let right_face = face_vertices(&right, 32.0);

    assert!(
        !left_face.is_empty(),
        "no surface crosses the x=32 plane; seam test has nothing to compare"
    );
    assert_eq!(
        left_face, right_face,
        "seam vertex sets diverge between chunk (0,0,0) and (1,0,0)"
    );
}

#[test]
fn test_seam_survives_cache_eviction_between_builds() {
    // Tiny column cache: the right chunk's build evicts everything the
    // left build cached, so any cache-order dependence would show here.
    let mgr = ChunkManager::new(Arc::new(WorldContext::new(WorldSeed::new(SEED))), 40);
    let (left, _) = build(&mgr, ChunkCoord::new(0, 0, 0));
    let (right, _) = build(&mgr, ChunkCoord::new(1, 0, 0));

    assert_eq!(face_vertices(&left, 32.0), face_vertices(&right, 32.0));
}

#[test]
fn test_rebuild_bit_identical() {
    let mgr = manager();
    let coord = ChunkCoord::new(3, 0, -2);

    let (render_a, collision_a) = build(&mgr, coord);
    // Interleave other work, then rebuild.
    let _ = build(&mgr, ChunkCoord::new(-5, 0, 5));
    let (render_b, collision_b) = build(&mgr, coord);

    assert_eq!(render_a, render_b);
    assert_eq!(collision_a, collision_b);
}

#[test]
fn test_below_bedrock_chunk_is_solid_and_meshless() {
    let mgr = manager();
    // Entire chunk below Y_BEDROCK: cy such that cy*96 + 96 <= -64.
    let cy = (Y_BEDROCK - CHUNK_SIZE_Y as i32) / CHUNK_SIZE_Y as i32 - 1;
    let coord = ChunkCoord::new(0, cy, 0);

    let sampler = mgr.sampler(coord);
    let voxels = sampler.assemble(coord);
    assert!(voxels.solid_count() > 0, "bedrock interior must be solid");

    let field = ChunkField::new(&sampler, &voxels);
    let (render, collision) = extract(&field, coord);
    assert!(render.is_empty(), "fully solid chunk has no iso surface");
    assert!(collision.is_empty());
}

#[test]
fn test_sky_chunk_is_empty() {
    let mgr = manager();
    let coord = ChunkCoord::new(0, 2, 0); // y in [192, 288), far above Y_SKY

    let sampler = mgr.sampler(coord);
    let voxels = sampler.assemble(coord);
    assert_eq!(voxels.solid_count(), 0);

    let field = ChunkField::new(&sampler, &voxels);
    let (render, collision) = extract(&field, coord);
    assert!(render.is_empty());
    assert!(collision.is_empty());
}

#[test]
fn test_edit_changes_mesh() {
    let mgr = manager();
    let coord = ChunkCoord::new(0, 0, 0);
    let (before, _) = build(&mgr, coord);

    // Break a block right at the surface in the middle of the chunk.
    let world = mgr.world();
    let surface = world.column_data(16, 16).height.floor() as i32;
    world.apply_edit(
        (16, surface, 16),
        basalt_procedural::BLOCK_BREAK_RADIUS,
        basalt_procedural::BLOCK_BREAK_STRENGTH,
    );

    let (after, _) = build(&mgr, coord);
    assert_ne!(before, after, "surface edit must change the extracted mesh");
}
