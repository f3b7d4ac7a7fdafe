//! # Pipeline Metrics
//!
//! Atomic counters and rolling microsecond averages. Updates are frequent
//! but contention is low, so everything is relaxed atomics; the telemetry
//! loop reads a consistent-enough snapshot every few seconds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Rolling average over roughly the last 16 samples.
#[derive(Debug, Default)]
pub struct RollingAverage(AtomicU64);

impl RollingAverage {
    /// Records one sample.
    pub fn record(&self, value_us: u64) {
        // (avg * 15 + x) / 16, racy by design
        let avg = self.0.load(Ordering::Relaxed);
        let next = if avg == 0 { value_us } else { (avg * 15 + value_us) / 16 };
        self.0.store(next, Ordering::Relaxed);
    }

    /// Records one duration sample.
    pub fn record_duration(&self, d: Duration) {
        self.record(d.as_micros() as u64);
    }

    /// Current average in microseconds.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters for the whole pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Chunk requests answered.
    pub requests_served: AtomicU64,
    /// Chunk voxel arrays assembled (cache misses).
    pub chunks_generated: AtomicU64,
    /// Mesh pairs extracted (cache misses).
    pub meshes_built: AtomicU64,
    /// Block-break edits accepted.
    pub edits_applied: AtomicU64,
    /// TCP broadcasts written.
    pub broadcasts_sent: AtomicU64,
    /// Datagrams received on the entity bus.
    pub datagrams_received: AtomicU64,
    /// Player positions accepted by validation.
    pub positions_accepted: AtomicU64,
    /// Player positions rejected by validation.
    pub positions_rejected: AtomicU64,
    /// Rolling chunk assembly time.
    pub chunk_time: RollingAverage,
    /// Rolling mesh extraction time.
    pub mesh_time: RollingAverage,
    /// Rolling response send time.
    pub send_time: RollingAverage,
}

/// Point-in-time copy of the counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricsSnapshot {
    /// Chunk requests answered.
    pub requests_served: u64,
    /// Chunk voxel arrays assembled.
    pub chunks_generated: u64,
    /// Mesh pairs extracted.
    pub meshes_built: u64,
    /// Block-break edits accepted.
    pub edits_applied: u64,
    /// TCP broadcasts written.
    pub broadcasts_sent: u64,
    /// Datagrams received.
    pub datagrams_received: u64,
    /// Positions accepted.
    pub positions_accepted: u64,
    /// Positions rejected.
    pub positions_rejected: u64,
    /// Rolling chunk assembly time, microseconds.
    pub chunk_time_us: u64,
    /// Rolling mesh extraction time, microseconds.
    pub mesh_time_us: u64,
    /// Rolling send time, microseconds.
    pub send_time_us: u64,
}

impl Metrics {
    /// Creates zeroed metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one to a counter.
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads every counter.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_served: self.requests_served.load(Ordering::Relaxed),
            chunks_generated: self.chunks_generated.load(Ordering::Relaxed),
            meshes_built: self.meshes_built.load(Ordering::Relaxed),
            edits_applied: self.edits_applied.load(Ordering::Relaxed),
            broadcasts_sent: self.broadcasts_sent.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            positions_accepted: self.positions_accepted.load(Ordering::Relaxed),
            positions_rejected: self.positions_rejected.load(Ordering::Relaxed),
            chunk_time_us: self.chunk_time.get(),
            mesh_time_us: self.mesh_time.get(),
            send_time_us: self.send_time.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_average_converges() {
        let avg = RollingAverage::default();
        avg.record(1000);
        assert_eq!(avg.get(), 1000);

        for _ in 0..200 {
            avg.record(2000);
        }
        let settled = avg.get();
        assert!(
            (1900..=2000).contains(&settled),
            "average {settled} did not settle near 2000"
        );
    }

    #[test]
    fn test_snapshot_reads_counters() {
        let metrics = Metrics::new();
        Metrics::bump(&metrics.requests_served);
        Metrics::bump(&metrics.requests_served);
        Metrics::bump(&metrics.chunks_generated);

        let snap = metrics.snapshot();
        assert_eq!(snap.requests_served, 2);
        assert_eq!(snap.chunks_generated, 1);
        assert_eq!(snap.meshes_built, 0);
    }
}
