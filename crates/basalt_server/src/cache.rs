//! # Mesh Cache
//!
//! Bounded concurrent map from chunk coordinate to its extracted mesh
//! pair, with per-coordinate single-flight builds.
//!
//! `get_or_build` takes the coordinate's build permit before building, and
//! re-checks the map while holding it (double-checked pattern). Under
//! contention for one coordinate, exactly one caller builds; the rest wait
//! on the permit and then observe the cached result. The build itself runs
//! on the blocking pool so it never occupies an I/O worker.
//!
//! Eviction is approximate LRU: entries carry a generation stamp refreshed
//! on every hit; the periodic cleanup drops the oldest quarter when the
//! map exceeds capacity. Explicit invalidation (edits) removes exact
//! coordinates, along with their build permits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use basalt_mesh::{CollisionMesh, RenderMesh};
use basalt_procedural::ChunkCoord;
use parking_lot::{Mutex, RwLock};

use crate::error::ServerError;

/// A cached mesh pair.
struct MeshEntry {
    render: Arc<RenderMesh>,
    collision: Arc<CollisionMesh>,
    last_accessed: AtomicU64,
}

/// Bounded mesh cache with per-coord single-flight.
pub struct MeshCache {
    entries: RwLock<HashMap<ChunkCoord, MeshEntry>>,
    permits: Mutex<HashMap<ChunkCoord, Arc<tokio::sync::Mutex<()>>>>,
    capacity: usize,
    clock: AtomicU64,
    builds_started: AtomicU64,
}

impl MeshCache {
    /// Creates a cache holding at most `capacity` mesh pairs.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            permits: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            clock: AtomicU64::new(0),
            builds_started: AtomicU64::new(0),
        }
    }

    /// Number of cached mesh pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// How many builds have ever started (the single-flight hook).
    #[must_use]
    pub fn builds_started(&self) -> u64 {
        self.builds_started.load(Ordering::Relaxed)
    }

    /// Cached pair for `coord`, refreshing its access stamp.
    #[must_use]
    pub fn get(&self, coord: ChunkCoord) -> Option<(Arc<RenderMesh>, Arc<CollisionMesh>)> {
        let entries = self.entries.read();
        let entry = entries.get(&coord)?;
        entry
            .last_accessed
            .store(self.clock.fetch_add(1, Ordering::Relaxed), Ordering::Relaxed);
        Some((Arc::clone(&entry.render), Arc::clone(&entry.collision)))
    }

    /// The build permit for one coordinate, created on demand.
    fn permit(&self, coord: ChunkCoord) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.permits
                .lock()
                .entry(coord)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Returns the cached pair, building it at most once under contention.
    ///
    /// A builder panic surfaces as [`ServerError::Build`] and leaves the
    /// entry absent, so a later request can retry.
    pub async fn get_or_build<F>(
        &self,
        coord: ChunkCoord,
        build: F,
    ) -> Result<(Arc<RenderMesh>, Arc<CollisionMesh>), ServerError>
    where
        F: FnOnce() -> (RenderMesh, CollisionMesh) + Send + 'static,
    {
        if let Some(pair) = self.get(coord) {
            return Ok(pair);
        }

        let permit = self.permit(coord);
        let _guard = permit.lock().await;

        // A racing caller may have finished while we waited.
        if let Some(pair) = self.get(coord) {
            return Ok(pair);
        }

        self.builds_started.fetch_add(1, Ordering::Relaxed);
        let (render, collision) = tokio::task::spawn_blocking(build)
            .await
            .map_err(|_| ServerError::Build { coord })?;

        let render = Arc::new(render);
        let collision = Arc::new(collision);
        self.entries.write().insert(
            coord,
            MeshEntry {
                render: Arc::clone(&render),
                collision: Arc::clone(&collision),
                last_accessed: AtomicU64::new(self.clock.fetch_add(1, Ordering::Relaxed)),
            },
        );
        Ok((render, collision))
    }

    /// Drops the oldest ~25% of entries when the map exceeds capacity.
    ///
    /// Returns how many entries were evicted. After cleanup the map never
    /// exceeds capacity.
    pub fn cleanup(&self) -> usize {
        let mut entries = self.entries.write();
        if entries.len() <= self.capacity {
            return 0;
        }

        let excess = entries.len() - self.capacity;
        let remove_n = (entries.len() / 4).max(excess);

        let mut stamped: Vec<(ChunkCoord, u64)> = entries
            .iter()
            .map(|(coord, entry)| (*coord, entry.last_accessed.load(Ordering::Relaxed)))
            .collect();
        stamped.sort_by_key(|&(_, stamp)| stamp);

        let victims: Vec<ChunkCoord> = stamped.iter().take(remove_n).map(|&(c, _)| c).collect();
        for coord in &victims {
            entries.remove(coord);
        }
        drop(entries);

        let mut permits = self.permits.lock();
        for coord in &victims {
            permits.remove(coord);
        }
        victims.len()
    }

    /// Removes one coordinate and its permit. Returns true if present.
    pub fn invalidate(&self, coord: ChunkCoord) -> bool {
        let removed = self.entries.write().remove(&coord).is_some();
        self.permits.lock().remove(&coord);
        removed
    }

    /// Invalidates every cached chunk whose voxel AABB intersects the box
    /// `[center - radius, center + radius]`. Returns the removed coords.
    pub fn invalidate_sphere(&self, center: (i32, i32, i32), radius: f32) -> Vec<ChunkCoord> {
        let min = (
            (center.0 as f32 - radius).floor() as i32,
            (center.1 as f32 - radius).floor() as i32,
            (center.2 as f32 - radius).floor() as i32,
        );
        let max = (
            (center.0 as f32 + radius).ceil() as i32,
            (center.1 as f32 + radius).ceil() as i32,
            (center.2 as f32 + radius).ceil() as i32,
        );

        let lo = ChunkCoord::from_world_pos(min.0, min.1, min.2);
        let hi = ChunkCoord::from_world_pos(max.0, max.1, max.2);

        let mut removed = Vec::new();
        let mut entries = self.entries.write();
        for cx in lo.x..=hi.x {
            for cy in lo.y..=hi.y {
                for cz in lo.z..=hi.z {
                    let coord = ChunkCoord::new(cx, cy, cz);
                    if coord.intersects_box(min, max) && entries.remove(&coord).is_some() {
                        removed.push(coord);
                    }
                }
            }
        }
        drop(entries);

        let mut permits = self.permits.lock();
        for coord in &removed {
            permits.remove(coord);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn dummy_pair() -> (RenderMesh, CollisionMesh) {
        (RenderMesh::default(), CollisionMesh::default())
    }

    #[tokio::test]
    async fn test_get_or_build_caches() {
        let cache = MeshCache::new(100);
        let coord = ChunkCoord::new(1, 0, 1);

        let first = cache.get_or_build(coord, dummy_pair).await.unwrap();
        let second = cache
            .get_or_build(coord, || panic!("must not rebuild"))
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first.0, &second.0));
        assert_eq!(cache.builds_started(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_single_flight() {
        let cache = Arc::new(MeshCache::new(100));
        let coord = ChunkCoord::new(5, 0, 5);
        let invocations = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let cache = Arc::clone(&cache);
            let invocations = Arc::clone(&invocations);
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_build(coord, move || {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        // Widen the race window
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        dummy_pair()
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }

        assert_eq!(invocations.load(Ordering::SeqCst), 1, "builder ran more than once");
        for pair in &results {
            assert!(Arc::ptr_eq(&pair.0, &results[0].0));
        }
    }

    #[tokio::test]
    async fn test_build_panic_does_not_poison() {
        let cache = MeshCache::new(100);
        let coord = ChunkCoord::new(9, 0, 9);

        let failed = cache
            .get_or_build(coord, || panic!("synthetic build failure"))
            .await;
        assert!(matches!(failed, Err(ServerError::Build { .. })));
        assert_eq!(cache.len(), 0);

        // Retry succeeds.
        let retried = cache.get_or_build(coord, dummy_pair).await;
        assert!(retried.is_ok());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_bounds_and_prefers_old() {
        let cache = MeshCache::new(8);
        for i in 0..16 {
            cache
                .get_or_build(ChunkCoord::new(i, 0, 0), dummy_pair)
                .await
                .unwrap();
        }
        // Refresh a handful so they are the newest.
        for i in 12..16 {
            assert!(cache.get(ChunkCoord::new(i, 0, 0)).is_some());
        }

        let removed = cache.cleanup();
        assert!(removed >= 8, "removed only {removed}");
        assert!(cache.len() <= 8, "cache still holds {}", cache.len());

        // The freshly touched entries survive.
        for i in 12..16 {
            assert!(
                cache.get(ChunkCoord::new(i, 0, 0)).is_some(),
                "hot entry {i} was evicted"
            );
        }
    }

    #[tokio::test]
    async fn test_cleanup_noop_under_capacity() {
        let cache = MeshCache::new(100);
        for i in 0..10 {
            cache
                .get_or_build(ChunkCoord::new(i, 0, 0), dummy_pair)
                .await
                .unwrap();
        }
        assert_eq!(cache.cleanup(), 0);
        assert_eq!(cache.len(), 10);
    }

    #[tokio::test]
    async fn test_invalidate_sphere_exact_set() {
        let cache = MeshCache::new(1000);
        for cx in -1..=1 {
            for cy in -1..=1 {
                for cz in -1..=1 {
                    cache
                        .get_or_build(ChunkCoord::new(cx, cy, cz), dummy_pair)
                        .await
                        .unwrap();
                }
            }
        }

        // A small sphere in the middle of chunk (0,0,0): only that chunk
        // intersects.
        let removed = cache.invalidate_sphere((16, 48, 16), 1.5);
        assert_eq!(removed, vec![ChunkCoord::new(0, 0, 0)]);

        // A sphere straddling the x face between chunks 0 and 1.
        cache
            .get_or_build(ChunkCoord::new(0, 0, 0), dummy_pair)
            .await
            .unwrap();
        let removed = cache.invalidate_sphere((32, 48, 16), 1.5);
        let set: std::collections::HashSet<_> = removed.into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&ChunkCoord::new(0, 0, 0)));
        assert!(set.contains(&ChunkCoord::new(1, 0, 0)));
    }

    #[tokio::test]
    async fn test_invalidate_sphere_corner_hits_eight() {
        let cache = MeshCache::new(1000);
        for cx in 0..2 {
            for cy in 0..2 {
                for cz in 0..2 {
                    cache
                        .get_or_build(ChunkCoord::new(cx, cy, cz), dummy_pair)
                        .await
                        .unwrap();
                }
            }
        }

        // Centered on the shared corner at world (32, 96, 32).
        let removed = cache.invalidate_sphere((32, 96, 32), 1.5);
        assert_eq!(removed.len(), 8, "corner edit must hit all 8 chunks: {removed:?}");
    }
}
