//! # Edit Overlay
//!
//! The authoritative record of terrain edits. The world is otherwise a
//! pure function of the seed; edits are the one mutable layer, kept as a
//! set of carve spheres whose density deltas are *summed* onto the base
//! field. Density sampling therefore stays a pure function of
//! `(seed, coords, edits)` where `edits` is a snapshot taken at build time.

use parking_lot::RwLock;

/// Influence radius of a single block-break edit.
pub const BLOCK_BREAK_RADIUS: f32 = 1.5;

/// Peak density subtraction of a single block-break edit.
pub const BLOCK_BREAK_STRENGTH: f32 = 3.0;

/// One carve sphere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CarveSite {
    /// Sphere center, world voxel coordinates.
    pub center: (i32, i32, i32),
    /// Influence radius in world units.
    pub radius: f32,
    /// Peak density subtraction at the center.
    pub strength: f32,
}

impl CarveSite {
    /// Density delta contributed at a world point, with cosine falloff.
    #[must_use]
    pub fn delta_at(&self, x: f64, y: f64, z: f64) -> f32 {
        let dx = x - f64::from(self.center.0);
        let dy = y - f64::from(self.center.1);
        let dz = z - f64::from(self.center.2);
        let dist = (dx * dx + dy * dy + dz * dz).sqrt() as f32;
        if dist >= self.radius {
            return 0.0;
        }
        let falloff = 0.5 * (1.0 + (std::f32::consts::PI * dist / self.radius).cos());
        -self.strength * falloff
    }

    /// Inclusive world-space AABB of the influence sphere.
    #[must_use]
    pub fn bounds(&self) -> ((i32, i32, i32), (i32, i32, i32)) {
        let r = self.radius.ceil() as i32;
        (
            (self.center.0 - r, self.center.1 - r, self.center.2 - r),
            (self.center.0 + r, self.center.1 + r, self.center.2 + r),
        )
    }
}

/// A point-in-time view of the overlay for one build.
///
/// Holds only the sites that can influence the region it was taken for,
/// so per-sample evaluation is a short linear scan.
#[derive(Clone, Debug, Default)]
pub struct EditSnapshot {
    sites: Vec<CarveSite>,
}

impl EditSnapshot {
    /// A snapshot with no edits.
    #[must_use]
    pub const fn empty() -> Self {
        Self { sites: Vec::new() }
    }

    /// Summed density delta at a world point.
    #[inline]
    #[must_use]
    pub fn delta_at(&self, x: f64, y: f64, z: f64) -> f32 {
        let mut delta = 0.0;
        for site in &self.sites {
            delta += site.delta_at(x, y, z);
        }
        delta
    }

    /// Number of sites in view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// True when no edits are in view.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

/// The mutable set of all accepted edits.
#[derive(Debug, Default)]
pub struct EditOverlay {
    inner: RwLock<OverlayInner>,
}

#[derive(Debug, Default)]
struct OverlayInner {
    sites: Vec<CarveSite>,
    generation: u64,
}

impl EditOverlay {
    /// Creates an empty overlay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a carve sphere. Repeating a center deepens the carve rather
    /// than duplicating the site. Returns the new overlay generation.
    pub fn apply(&self, center: (i32, i32, i32), radius: f32, strength: f32) -> u64 {
        let mut inner = self.inner.write();
        if let Some(site) = inner.sites.iter_mut().find(|s| s.center == center) {
            site.strength += strength;
            site.radius = site.radius.max(radius);
        } else {
            inner.sites.push(CarveSite {
                center,
                radius,
                strength,
            });
        }
        inner.generation += 1;
        inner.generation
    }

    /// Monotonic counter bumped by every accepted edit.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Total number of carve sites.
    #[must_use]
    pub fn site_count(&self) -> usize {
        self.inner.read().sites.len()
    }

    /// Summed delta at one world point, against the live overlay.
    #[must_use]
    pub fn delta_at(&self, x: f64, y: f64, z: f64) -> f32 {
        let inner = self.inner.read();
        let mut delta = 0.0;
        for site in &inner.sites {
            delta += site.delta_at(x, y, z);
        }
        delta
    }

    /// Snapshot of the sites whose influence AABB intersects
    /// `[min, max]` (inclusive, world coordinates).
    #[must_use]
    pub fn snapshot_region(&self, min: (i32, i32, i32), max: (i32, i32, i32)) -> EditSnapshot {
        let inner = self.inner.read();
        let sites = inner
            .sites
            .iter()
            .filter(|site| {
                let (lo, hi) = site.bounds();
                lo.0 <= max.0
                    && hi.0 >= min.0
                    && lo.1 <= max.1
                    && hi.1 >= min.1
                    && lo.2 <= max.2
                    && hi.2 >= min.2
            })
            .copied()
            .collect();
        EditSnapshot { sites }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_peaks_at_center_and_vanishes_at_radius() {
        let site = CarveSite {
            center: (10, 20, 30),
            radius: 2.0,
            strength: 1.5,
        };

        assert!((site.delta_at(10.0, 20.0, 30.0) + 1.5).abs() < 1e-6);
        assert_eq!(site.delta_at(12.5, 20.0, 30.0), 0.0);

        // Falloff is monotone along a ray
        let near = site.delta_at(10.5, 20.0, 30.0);
        let far = site.delta_at(11.5, 20.0, 30.0);
        assert!(near < far && far < 0.0);
    }

    #[test]
    fn test_repeat_edit_deepens() {
        let overlay = EditOverlay::new();
        overlay.apply((0, 0, 0), 1.5, 1.0);
        overlay.apply((0, 0, 0), 1.5, 1.0);

        assert_eq!(overlay.site_count(), 1);
        assert!((overlay.delta_at(0.0, 0.0, 0.0) + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_generation_advances() {
        let overlay = EditOverlay::new();
        assert_eq!(overlay.generation(), 0);
        overlay.apply((1, 2, 3), 1.5, 1.0);
        overlay.apply((4, 5, 6), 1.5, 1.0);
        assert_eq!(overlay.generation(), 2);
    }

    #[test]
    fn test_snapshot_region_filters() {
        let overlay = EditOverlay::new();
        overlay.apply((0, 0, 0), 1.5, 1.0);
        overlay.apply((100, 0, 0), 1.5, 1.0);

        let snap = overlay.snapshot_region((-8, -8, -8), (8, 8, 8));
        assert_eq!(snap.len(), 1);
        assert!(snap.delta_at(0.0, 0.0, 0.0) < 0.0);
        assert_eq!(snap.delta_at(100.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_overlapping_edits_sum() {
        let overlay = EditOverlay::new();
        overlay.apply((0, 0, 0), 3.0, 1.0);
        overlay.apply((1, 0, 0), 3.0, 1.0);

        let midpoint = overlay.delta_at(0.5, 0.0, 0.0);
        let lone = CarveSite {
            center: (0, 0, 0),
            radius: 3.0,
            strength: 1.0,
        }
        .delta_at(0.5, 0.0, 0.0);
        assert!(midpoint < lone, "overlap should deepen the carve");
    }
}
