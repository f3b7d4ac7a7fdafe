//! # Tick Loop
//!
//! Fixed-timestep pacing for the server: 60 ticks per second by default.
//! Tick work itself is currently empty - the pipeline is reactive - but
//! the loop paces cache cleanup and emits the telemetry summaries, and it
//! is the cadence any future server-authoritative simulation will hang
//! off.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::cache::MeshCache;
use crate::metrics::Metrics;

/// Accumulator-based fixed-timestep pacer.
///
/// Real elapsed time accumulates; each call to [`Self::advance`] converts
/// whole tick durations into tick count and returns how many ticks
/// elapsed, carrying the remainder forward.
pub struct TickPacer {
    tick_duration: Duration,
    last: Instant,
    accumulator: Duration,
    tick_count: u64,
}

impl TickPacer {
    /// Creates a pacer at `tick_rate` ticks per second.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        Self {
            tick_duration: Duration::from_micros(1_000_000 / u64::from(tick_rate.max(1))),
            last: Instant::now(),
            accumulator: Duration::ZERO,
            tick_count: 0,
        }
    }

    /// Total ticks elapsed since creation.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// One tick's duration.
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Folds elapsed real time into the accumulator and advances the tick
    /// count by the number of whole ticks it covers.
    pub fn advance(&mut self, now: Instant) -> u64 {
        self.accumulator += now.duration_since(self.last);
        self.last = now;

        let mut elapsed = 0;
        while self.accumulator >= self.tick_duration {
            self.accumulator -= self.tick_duration;
            elapsed += 1;
        }
        self.tick_count += elapsed;
        elapsed
    }

    /// Time left until the next tick is due.
    #[must_use]
    pub fn remainder(&self) -> Duration {
        self.tick_duration.saturating_sub(self.accumulator)
    }
}

/// Runs the tick loop until `shutdown` flips.
///
/// Every `5 * tick_rate` ticks: one telemetry summary. Every 60 seconds:
/// a cache cleanup pass, on the blocking pool so the scan stays off the
/// I/O path.
pub async fn run_tick_loop(
    cache: Arc<MeshCache>,
    metrics: Arc<Metrics>,
    tick_rate: u32,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut pacer = TickPacer::new(tick_rate);
    let telemetry_interval = u64::from(tick_rate) * 5;
    let cleanup_interval = u64::from(tick_rate) * 60;
    let mut next_telemetry = telemetry_interval;
    let mut next_cleanup = cleanup_interval;

    loop {
        tokio::select! {
            () = tokio::time::sleep(pacer.remainder()) => {}
            _ = shutdown.changed() => {
                tracing::info!(ticks = pacer.tick_count(), "tick loop stopping");
                return;
            }
        }

        if pacer.advance(Instant::now()) == 0 {
            continue;
        }

        if pacer.tick_count() >= next_telemetry {
            next_telemetry += telemetry_interval;
            let snap = metrics.snapshot();
            tracing::info!(
                requests = snap.requests_served,
                chunks = snap.chunks_generated,
                meshes = snap.meshes_built,
                edits = snap.edits_applied,
                chunk_us = snap.chunk_time_us,
                mesh_us = snap.mesh_time_us,
                send_us = snap.send_time_us,
                cached_meshes = cache.len(),
                "telemetry"
            );
        }

        if pacer.tick_count() >= next_cleanup {
            next_cleanup += cleanup_interval;
            let cache = Arc::clone(&cache);
            let evicted = tokio::task::spawn_blocking(move || cache.cleanup()).await;
            match evicted {
                Ok(0) | Err(_) => {}
                Ok(n) => tracing::info!(evicted = n, "mesh cache cleanup"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacer_counts_whole_ticks() {
        let mut pacer = TickPacer::new(100); // 10ms ticks
        let start = Instant::now();

        // Synthetic clock: 35ms elapsed = 3 ticks, 5ms remainder.
        pacer.last = start;
        let ticks = pacer.advance(start + Duration::from_millis(35));
        assert_eq!(ticks, 3);
        assert_eq!(pacer.tick_count(), 3);
        assert_eq!(pacer.remainder(), Duration::from_millis(5));

        // Another 5ms completes the fourth tick exactly.
        let ticks = pacer.advance(start + Duration::from_millis(40));
        assert_eq!(ticks, 1);
        assert_eq!(pacer.tick_count(), 4);
    }

    #[test]
    fn test_pacer_zero_elapsed() {
        let mut pacer = TickPacer::new(60);
        let now = pacer.last;
        assert_eq!(pacer.advance(now), 0);
        assert_eq!(pacer.tick_count(), 0);
    }

    #[test]
    fn test_tick_duration_for_60hz() {
        let pacer = TickPacer::new(60);
        assert_eq!(pacer.tick_duration(), Duration::from_micros(16_666));
    }

    #[tokio::test]
    async fn test_loop_exits_on_shutdown() {
        let cache = Arc::new(MeshCache::new(10));
        let metrics = Arc::new(Metrics::new());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_tick_loop(cache, metrics, 60, rx));
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("tick loop did not stop")
            .unwrap();
    }
}
