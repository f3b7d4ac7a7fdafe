//! # Movement Validation
//!
//! Server-side plausibility checks on client position reports, tuned for
//! fast arena movement with bunny-hopping headroom. The validator never
//! trusts a single bad packet: violations accumulate toward a threshold
//! (absorbing network jitter), good packets decay the counter, and a long
//! gap resets history so reconnects are not punished for the time away.

use std::time::{Duration, Instant};

use basalt_core::Vec3;

use super::state::PlayerState;

/// Movement plausibility predicate with its tuning constants.
#[derive(Clone, Copy, Debug)]
pub struct MovementValidator {
    /// Maximum vertical speed, m/s.
    pub max_vertical_speed: f32,
    /// Maximum horizontal speed, m/s (bunny-hop ceiling).
    pub max_horizontal_speed: f32,
    /// Allowed deviation from the recent-speed average, m/s² scaled by dt.
    pub accel_per_sec: f32,
    /// Multiplier of slack on the total Euclidean step.
    pub step_tolerance: f32,
    /// Violations tolerated before rejection takes effect.
    pub max_violations: u32,
}

impl Default for MovementValidator {
    fn default() -> Self {
        Self {
            max_vertical_speed: 60.0,
            max_horizontal_speed: 25.0,
            accel_per_sec: 150.0,
            step_tolerance: 1.3,
            max_violations: 5,
        }
    }
}

/// Shortest `dt` the predicate will divide by.
const MIN_DT: Duration = Duration::from_millis(1);

/// Longest `dt` the predicate will credit as movement time.
const MAX_DT: Duration = Duration::from_millis(500);

/// Gaps beyond this reset history and accept unconditionally.
const GAP_RESET: Duration = Duration::from_secs(1);

/// One accepted update's content.
#[derive(Clone, Copy, Debug)]
pub struct MovementUpdate {
    /// Reported position.
    pub position: Vec3,
    /// Reported velocity.
    pub velocity: Vec3,
    /// Reported yaw.
    pub yaw: f32,
    /// Reported pitch.
    pub pitch: f32,
    /// Reported grounded flag.
    pub grounded: bool,
    /// Client sequence number.
    pub seq: u32,
}

impl MovementValidator {
    /// Validates one update against the player's history.
    ///
    /// On accept, the state is advanced to the reported values and `true`
    /// is returned. On reject, the state keeps its last validated values
    /// (the caller acks those back as the correction).
    pub fn validate(&self, state: &mut PlayerState, update: &MovementUpdate, now: Instant) -> bool {
        let raw_dt = now.saturating_duration_since(state.last_update);

        // First contact or a long gap: take the report as the new truth.
        if !state.has_history || raw_dt > GAP_RESET {
            state.reset_history();
            Self::accept(state, update, Some(0.0), now);
            return true;
        }

        let dt = raw_dt.clamp(MIN_DT, MAX_DT).as_secs_f32();
        let delta = update.position.sub(state.position);
        let vertical_speed = (delta.y / dt).abs();
        let horizontal_speed = delta.horizontal_length() / dt;

        let mut violated = vertical_speed > self.max_vertical_speed
            || horizontal_speed > self.max_horizontal_speed;

        if let Some(average) = state.average_speed() {
            if (horizontal_speed - average).abs() > self.accel_per_sec * dt {
                violated = true;
            }
        }

        if delta.length() > self.max_horizontal_speed * dt * self.step_tolerance {
            violated = true;
        }

        if violated {
            state.violations += 1;
            if state.violations >= self.max_violations {
                return false;
            }
            // Absorbed as jitter: take the position but keep the implied
            // speed out of the window, or one spike would poison the
            // average and fail every later honest packet.
            Self::accept(state, update, None, now);
        } else {
            state.violations = state.violations.saturating_sub(1);
            Self::accept(state, update, Some(horizontal_speed), now);
        }
        true
    }

    fn accept(
        state: &mut PlayerState,
        update: &MovementUpdate,
        horizontal_speed: Option<f32>,
        now: Instant,
    ) {
        state.position = update.position;
        state.velocity = update.velocity;
        state.yaw = update.yaw;
        state.pitch = update.pitch;
        state.grounded = update.grounded;
        state.last_seq = update.seq;
        state.last_update = now;
        if let Some(speed) = horizontal_speed {
            state.push_speed(speed);
        }
        state.has_history = true;
    }
}
