//! # Chunk Manager
//!
//! The column cache and the chunk assembly path.
//!
//! Columns are immutable once computed, so the cache is read-heavy: a
//! `RwLock<HashMap>` where hits take the read lock and set a referenced
//! bit, and misses compute under the write lock (which doubles as the
//! per-key single-flight guard - two racing misses serialize, the loser
//! finds the entry on its double-check). Eviction is a clock sweep:
//! referenced entries get a second chance, cold entries leave first.
//!
//! Chunk and mesh builds go through a [`ChunkSampler`], which prefetches
//! every column the build can touch (including the one-voxel apron past
//! each face) and pins an edit-overlay snapshot, so per-voxel sampling is
//! lock-free and the build sees one consistent edit state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use basalt_core::BlockType;
use parking_lot::RwLock;

use crate::chunk::{ChunkCoord, ChunkVoxels, CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z};
use crate::column::ColumnData;
use crate::edits::EditSnapshot;
use crate::world::WorldContext;

/// One cached column with its clock-sweep bit.
struct ColumnSlot {
    data: Arc<ColumnData>,
    referenced: AtomicBool,
}

/// Bounded column cache plus chunk assembly.
pub struct ChunkManager {
    world: Arc<WorldContext>,
    columns: RwLock<HashMap<(i32, i32), ColumnSlot>>,
    capacity: usize,
    columns_built: AtomicU64,
}

impl ChunkManager {
    /// Creates a manager over a world with the given column capacity.
    #[must_use]
    pub fn new(world: Arc<WorldContext>, max_cached_columns: usize) -> Self {
        Self {
            world,
            columns: RwLock::new(HashMap::with_capacity(max_cached_columns.min(4096))),
            capacity: max_cached_columns.max(1),
            columns_built: AtomicU64::new(0),
        }
    }

    /// The world this manager samples.
    #[inline]
    #[must_use]
    pub fn world(&self) -> &Arc<WorldContext> {
        &self.world
    }

    /// Number of columns currently cached.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.read().len()
    }

    /// Total columns ever computed (cache misses).
    #[must_use]
    pub fn columns_built(&self) -> u64 {
        self.columns_built.load(Ordering::Relaxed)
    }

    /// Column data at `(x, z)`, cached.
    #[must_use]
    pub fn column(&self, x: i32, z: i32) -> Arc<ColumnData> {
        let key = (x, z);

        if let Some(slot) = self.columns.read().get(&key) {
            slot.referenced.store(true, Ordering::Relaxed);
            return Arc::clone(&slot.data);
        }

        let mut map = self.columns.write();
        // Double-check: a racing miss may have filled the slot.
        if let Some(slot) = map.get(&key) {
            slot.referenced.store(true, Ordering::Relaxed);
            return Arc::clone(&slot.data);
        }

        let data = Arc::new(self.world.column_data(x, z));
        self.columns_built.fetch_add(1, Ordering::Relaxed);

        if map.len() >= self.capacity {
            Self::sweep(&mut map, self.capacity);
        }
        map.insert(
            key,
            ColumnSlot {
                data: Arc::clone(&data),
                referenced: AtomicBool::new(true),
            },
        );
        data
    }

    /// Clock sweep: clear referenced bits, evict cold entries down to 75%
    /// of capacity. If every entry was hot, a second pass force-evicts.
    fn sweep(map: &mut HashMap<(i32, i32), ColumnSlot>, capacity: usize) {
        let target = capacity - capacity / 4;

        let mut excess = map.len().saturating_sub(target);
        map.retain(|_, slot| {
            if excess == 0 {
                return true;
            }
            if slot.referenced.swap(false, Ordering::Relaxed) {
                true
            } else {
                excess -= 1;
                false
            }
        });

        if map.len() > target {
            let mut excess = map.len() - target;
            map.retain(|_, _| {
                if excess > 0 {
                    excess -= 1;
                    false
                } else {
                    true
                }
            });
        }
    }

    /// Density at any world coordinate, tolerant of out-of-chunk positions.
    ///
    /// The mesher's apron path: a cached column plus the live overlay.
    #[must_use]
    pub fn sample_density_fast(&self, x: i32, y: i32, z: i32) -> f32 {
        let column = self.column(x, z);
        self.world.sample_density_live(&column, x, y, z)
    }

    /// Builds a sampler for one chunk, prefetching its columns and pinning
    /// an edit snapshot.
    #[must_use]
    pub fn sampler(&self, coord: ChunkCoord) -> ChunkSampler {
        let (ox, oy, oz) = coord.origin();
        let span_x = CHUNK_SIZE_X + 1;
        let span_z = CHUNK_SIZE_Z + 1;

        let mut columns = Vec::with_capacity(span_x * span_z);
        for lz in 0..span_z {
            for lx in 0..span_x {
                columns.push(self.column(ox + lx as i32, oz + lz as i32));
            }
        }

        let snapshot = self.world.edits().snapshot_region(
            (ox - 1, oy - 1, oz - 1),
            (
                ox + CHUNK_SIZE_X as i32 + 1,
                oy + CHUNK_SIZE_Y as i32 + 1,
                oz + CHUNK_SIZE_Z as i32 + 1,
            ),
        );

        ChunkSampler {
            world: Arc::clone(&self.world),
            origin: (ox, oy, oz),
            columns,
            snapshot,
        }
    }

    /// Assembles the dense voxel array for a chunk.
    ///
    /// One column lookup per `(x, z)`, one density sample per voxel (plus
    /// the row above for exposure), classified into block types.
    #[must_use]
    pub fn chunk(&self, coord: ChunkCoord) -> ChunkVoxels {
        let sampler = self.sampler(coord);
        sampler.assemble(coord)
    }
}

/// Lock-free sampling view for one chunk build.
///
/// Holds every column in the chunk footprint plus the one-voxel apron, and
/// the edit-overlay snapshot taken when the build started.
pub struct ChunkSampler {
    world: Arc<WorldContext>,
    origin: (i32, i32, i32),
    /// `(CHUNK_SIZE_X + 1) * (CHUNK_SIZE_Z + 1)` columns, row-major in z.
    columns: Vec<Arc<ColumnData>>,
    snapshot: EditSnapshot,
}

impl ChunkSampler {
    /// The world origin of the sampled chunk.
    #[inline]
    #[must_use]
    pub const fn origin(&self) -> (i32, i32, i32) {
        self.origin
    }

    /// The edit snapshot this build sees.
    #[inline]
    #[must_use]
    pub const fn snapshot(&self) -> &EditSnapshot {
        &self.snapshot
    }

    /// Prefetched column at world `(x, z)`, or a fresh computation when the
    /// coordinate falls outside the prefetched footprint.
    #[must_use]
    pub fn column(&self, x: i32, z: i32) -> Arc<ColumnData> {
        let lx = x - self.origin.0;
        let lz = z - self.origin.2;
        let span_x = (CHUNK_SIZE_X + 1) as i32;
        let span_z = (CHUNK_SIZE_Z + 1) as i32;
        if lx >= 0 && lx < span_x && lz >= 0 && lz < span_z {
            Arc::clone(&self.columns[(lz * span_x + lx) as usize])
        } else {
            Arc::new(self.world.column_data(x, z))
        }
    }

    /// Density at a world coordinate under this build's edit snapshot.
    #[inline]
    #[must_use]
    pub fn density(&self, x: i32, y: i32, z: i32) -> f32 {
        let column = self.column(x, z);
        self.world.sample_density_with(&column, &self.snapshot, x, y, z)
    }

    /// Block type at a world coordinate under this build's edit snapshot.
    #[must_use]
    pub fn block_type(&self, x: i32, y: i32, z: i32) -> BlockType {
        let column = self.column(x, z);
        let here = self.world.sample_density_with(&column, &self.snapshot, x, y, z);
        let above = self.world.sample_density_with(&column, &self.snapshot, x, y + 1, z);
        self.world.classify(&column, x, y, z, here, above)
    }

    /// Assembles the voxel array for `coord` through this sampler.
    #[must_use]
    pub fn assemble(&self, coord: ChunkCoord) -> ChunkVoxels {
        let (ox, oy, oz) = coord.origin();
        let mut voxels = ChunkVoxels::new(coord);
        let mut density_column = [0.0f32; CHUNK_SIZE_Y + 1];

        for lz in 0..CHUNK_SIZE_Z {
            for lx in 0..CHUNK_SIZE_X {
                let wx = ox + lx as i32;
                let wz = oz + lz as i32;
                let column = self.column(wx, wz);

                for (ly, slot) in density_column.iter_mut().enumerate() {
                    *slot = self.world.sample_density_with(
                        &column,
                        &self.snapshot,
                        wx,
                        oy + ly as i32,
                        wz,
                    );
                }

                for ly in 0..CHUNK_SIZE_Y {
                    let block = self.world.classify(
                        &column,
                        wx,
                        oy + ly as i32,
                        wz,
                        density_column[ly],
                        density_column[ly + 1],
                    );
                    voxels.set(lx, ly, lz, block);
                }
            }
        }

        voxels
    }
}
