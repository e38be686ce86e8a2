//! Hazard detection for ridelog.
//!
//! A single latch keyed by two causes: excessive speed and excessive lean.
//! The latch closes on the first breach of either threshold and only opens
//! again once both have cleared. Flags are captured when the latch closes and
//! are not re-evaluated while it stays closed.

use serde::{Deserialize, Serialize};

use crate::config::TelemetryConfig;

/// Thresholds above which a reading counts as hazardous.
///
/// Both comparisons are strict: a reading equal to the threshold is safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HazardThresholds {
    /// Speed limit in km/h.
    pub speed_kmh: u32,
    /// Lean limit in degrees, applied to the roll magnitude.
    pub roll_deg: u32,
}

impl Default for HazardThresholds {
    fn default() -> Self {
        Self {
            speed_kmh: 120,
            roll_deg: 35,
        }
    }
}

impl From<&TelemetryConfig> for HazardThresholds {
    fn from(config: &TelemetryConfig) -> Self {
        Self {
            speed_kmh: config.danger_speed_kmh,
            roll_deg: config.danger_roll_deg,
        }
    }
}

impl HazardThresholds {
    /// Whether the speed alone is hazardous.
    #[must_use]
    pub fn speed_exceeded(&self, speed_kmh: u32) -> bool {
        speed_kmh > self.speed_kmh
    }

    /// Whether the roll alone is hazardous.
    #[must_use]
    pub fn roll_exceeded(&self, roll_deg: i32) -> bool {
        roll_deg.unsigned_abs() > self.roll_deg
    }
}

/// Latched alert flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardState {
    /// Speed was over the limit when the latch closed.
    pub speed_beeping: bool,
    /// Roll was over the limit when the latch closed.
    pub roll_beeping: bool,
}

impl HazardState {
    /// Whether the latch is closed for any cause.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.speed_beeping || self.roll_beeping
    }
}

/// Outcome of feeding one reading into the latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HazardTransition {
    /// The latch just closed. Start the alert.
    Triggered {
        /// Speed breach at trigger time.
        speed: bool,
        /// Roll breach at trigger time.
        roll: bool,
    },
    /// The latch was already closed and a breach persists.
    Held,
    /// The latch just opened. Stop the alert.
    Cleared,
    /// Nothing hazardous before or now.
    Idle,
}

/// The hazard latch.
#[derive(Debug, Clone, Default)]
pub struct HazardLatch {
    thresholds: HazardThresholds,
    state: HazardState,
}

impl HazardLatch {
    /// Create an open latch with the given thresholds.
    #[must_use]
    pub fn new(thresholds: HazardThresholds) -> Self {
        Self {
            thresholds,
            state: HazardState::default(),
        }
    }

    /// Feed the current speed and roll into the latch.
    pub fn evaluate(&mut self, speed_kmh: u32, roll_deg: i32) -> HazardTransition {
        let speed = self.thresholds.speed_exceeded(speed_kmh);
        let roll = self.thresholds.roll_exceeded(roll_deg);

        if !(speed || roll) {
            let was_active = self.state.is_active();
            self.state = HazardState::default();
            return if was_active {
                HazardTransition::Cleared
            } else {
                HazardTransition::Idle
            };
        }

        if self.state.is_active() {
            return HazardTransition::Held;
        }

        self.state = HazardState {
            speed_beeping: speed,
            roll_beeping: roll,
        };
        HazardTransition::Triggered { speed, roll }
    }

    /// Open the latch without a reading, e.g. when a session ends.
    pub fn reset(&mut self) {
        self.state = HazardState::default();
    }

    /// Current flags.
    #[must_use]
    pub fn state(&self) -> HazardState {
        self.state
    }

    /// Thresholds in use.
    #[must_use]
    pub fn thresholds(&self) -> HazardThresholds {
        self.thresholds
    }
}
