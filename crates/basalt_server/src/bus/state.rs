//! # Player Registry
//!
//! Per-player soft state keyed by a stable server-assigned `PlayerId`.
//! Endpoints map to ids in a small index, so a client that hops ports gets
//! a new identity and a fresh history rather than inheriting a stale one.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use basalt_core::Vec3;
use parking_lot::RwLock;

/// Stable server-assigned player identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlayerId(pub u32);

/// Length of the recent horizontal-speed window.
pub const SPEED_WINDOW: usize = 5;

/// Soft real-time state for one player.
#[derive(Clone, Debug)]
pub struct PlayerState {
    /// This player's identity.
    pub id: PlayerId,
    /// Source endpoint.
    pub addr: SocketAddr,
    /// Current (validated) position.
    pub position: Vec3,
    /// Current (validated) velocity.
    pub velocity: Vec3,
    /// View yaw in degrees.
    pub yaw: f32,
    /// View pitch in degrees.
    pub pitch: f32,
    /// Grounded flag as reported.
    pub grounded: bool,
    /// Recent horizontal speeds, ring-buffered.
    pub recent_speeds: [f32; SPEED_WINDOW],
    /// Valid entries in `recent_speeds`.
    pub speed_len: usize,
    /// Next write slot in `recent_speeds`.
    pub speed_cursor: usize,
    /// Consecutive-violation counter (decays on good packets).
    pub violations: u32,
    /// Last client sequence number seen.
    pub last_seq: u32,
    /// When the last accepted update arrived.
    pub last_update: Instant,
    /// False until the first packet initializes the history.
    pub has_history: bool,
}

impl PlayerState {
    fn new(id: PlayerId, addr: SocketAddr, now: Instant) -> Self {
        Self {
            id,
            addr,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            grounded: false,
            recent_speeds: [0.0; SPEED_WINDOW],
            speed_len: 0,
            speed_cursor: 0,
            violations: 0,
            last_seq: 0,
            last_update: now,
            has_history: false,
        }
    }

    /// Average of the recent-speed window, if any samples exist.
    #[must_use]
    pub fn average_speed(&self) -> Option<f32> {
        if self.speed_len == 0 {
            return None;
        }
        Some(self.recent_speeds[..self.speed_len].iter().sum::<f32>() / self.speed_len as f32)
    }

    /// Records one horizontal-speed sample.
    pub fn push_speed(&mut self, speed: f32) {
        self.recent_speeds[self.speed_cursor] = speed;
        self.speed_cursor = (self.speed_cursor + 1) % SPEED_WINDOW;
        self.speed_len = (self.speed_len + 1).min(SPEED_WINDOW);
    }

    /// Clears movement history (reconnect or long gap).
    pub fn reset_history(&mut self) {
        self.recent_speeds = [0.0; SPEED_WINDOW];
        self.speed_len = 0;
        self.speed_cursor = 0;
        self.violations = 0;
        self.has_history = false;
    }
}

#[derive(Default)]
struct RegistryInner {
    players: HashMap<u32, PlayerState>,
    by_addr: HashMap<SocketAddr, u32>,
}

/// Concurrent player-state map plus the endpoint index.
#[derive(Default)]
pub struct PlayerRegistry {
    inner: RwLock<RegistryInner>,
    next_id: AtomicU32,
}

impl PlayerRegistry {
    /// Number of known players.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().players.len()
    }

    /// True when no player is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().players.is_empty()
    }

    /// Runs `f` on the state for `addr`, creating it on first contact.
    pub fn with_state<R>(
        &self,
        addr: SocketAddr,
        now: Instant,
        f: impl FnOnce(&mut PlayerState) -> R,
    ) -> R {
        let mut inner = self.inner.write();
        let id = match inner.by_addr.get(&addr) {
            Some(&id) => id,
            None => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                inner.by_addr.insert(addr, id);
                inner
                    .players
                    .insert(id, PlayerState::new(PlayerId(id), addr, now));
                id
            }
        };
        let state = inner.players.get_mut(&id).expect("indexed player exists");
        f(state)
    }

    /// Read-only copy of one player's state.
    #[must_use]
    pub fn get(&self, addr: SocketAddr) -> Option<PlayerState> {
        let inner = self.inner.read();
        let id = inner.by_addr.get(&addr)?;
        inner.players.get(id).cloned()
    }

    /// Endpoints of every live player except `exclude`.
    #[must_use]
    pub fn broadcast_targets(
        &self,
        exclude: PlayerId,
        now: Instant,
        max_age: Duration,
    ) -> Vec<SocketAddr> {
        let inner = self.inner.read();
        inner
            .players
            .values()
            .filter(|p| p.id != exclude && now.duration_since(p.last_update) <= max_age)
            .map(|p| p.addr)
            .collect()
    }

    /// Drops players whose last update is older than `max_age`.
    pub fn gc_stale(&self, now: Instant, max_age: Duration) -> usize {
        let mut inner = self.inner.write();
        let stale: Vec<(u32, SocketAddr)> = inner
            .players
            .values()
            .filter(|p| now.duration_since(p.last_update) > max_age)
            .map(|p| (p.id.0, p.addr))
            .collect();
        for (id, addr) in &stale {
            inner.players.remove(id);
            inner.by_addr.remove(addr);
        }
        stale.len()
    }
}
