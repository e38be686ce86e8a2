//! Display animation for the live gauges.
//!
//! The numeric readouts update immediately; only the visual roll dial and
//! speed bar ease toward their new targets over a bounded duration. Animation
//! state is display-only and never feeds back into stored values.

use std::time::{Duration, Instant};

/// Quadratic ease-in-out over `t ∈ [0, 1]`.
fn ease_in_out(t: f64) -> f64 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

/// A bounded-duration transition between two values.
#[derive(Debug, Clone, Copy)]
pub struct Tween {
    from: f64,
    to: f64,
    started: Instant,
    duration: Duration,
}

impl Tween {
    /// A tween resting at `value`.
    #[must_use]
    pub fn settled(value: f64, duration: Duration, now: Instant) -> Self {
        Self {
            from: value,
            to: value,
            started: now,
            duration,
        }
    }

    /// Value at `now`.
    #[must_use]
    pub fn value_at(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return self.to;
        }
        let elapsed = now.saturating_duration_since(self.started);
        let t = (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0);
        self.from + (self.to - self.from) * ease_in_out(t)
    }

    /// Start a new transition from wherever the current one is at `now`.
    pub fn retarget(&mut self, target: f64, now: Instant) {
        self.from = self.value_at(now);
        self.to = target;
        self.started = now;
    }

    /// Jump straight to `value` with no transition.
    pub fn snap(&mut self, value: f64, now: Instant) {
        *self = Self::settled(value, self.duration, now);
    }

    /// The value being animated toward.
    #[must_use]
    pub fn target(&self) -> f64 {
        self.to
    }

    /// Whether the transition has finished at `now`.
    #[must_use]
    pub fn is_settled(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= self.duration
    }
}

/// A tween whose targets are clamped to a fixed range.
#[derive(Debug, Clone, Copy)]
pub struct Gauge {
    tween: Tween,
    min: f64,
    max: f64,
}

impl Gauge {
    /// A gauge resting at the value in `[min, max]` closest to zero.
    #[must_use]
    pub fn new(min: f64, max: f64, duration: Duration, now: Instant) -> Self {
        Self {
            tween: Tween::settled(0.0_f64.clamp(min, max), duration, now),
            min,
            max,
        }
    }

    /// Animate toward `value`, clamped to the gauge range.
    pub fn set_target(&mut self, value: f64, now: Instant) {
        self.tween.retarget(value.clamp(self.min, self.max), now);
    }

    /// Jump to `value`, clamped to the gauge range.
    pub fn snap(&mut self, value: f64, now: Instant) {
        self.tween.snap(value.clamp(self.min, self.max), now);
    }

    /// Displayed position at `now`.
    #[must_use]
    pub fn value_at(&self, now: Instant) -> f64 {
        self.tween.value_at(now)
    }

    /// Clamped target position.
    #[must_use]
    pub fn target(&self) -> f64 {
        self.tween.target()
    }

    /// Whether the gauge has come to rest at `now`.
    #[must_use]
    pub fn is_settled(&self, now: Instant) -> bool {
        self.tween.is_settled(now)
    }
}
