//! Sensor feed abstraction.
//!
//! Location and orientation sources push [`SensorEvent`]s into a channel owned
//! by the sampler. Each subscription is identified by a [`SubscriptionHandle`]
//! carrying a shared liveness flag: sources stop sending once it is cleared,
//! and the sampler drops anything still queued for a handle that is no longer
//! live.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::telemetry::{AccelVector, LocationFix};

/// Identifier of one subscription.
pub type SubscriptionId = u64;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Which feed a subscription or event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    /// Position fixes.
    Location,
    /// Raw acceleration vectors.
    Orientation,
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Location => write!(f, "location"),
            Self::Orientation => write!(f, "orientation"),
        }
    }
}

/// Outcome of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Access granted.
    Granted,
    /// Access refused.
    Denied,
}

impl Permission {
    /// Whether access was granted.
    #[must_use]
    pub fn is_granted(self) -> bool {
        self == Self::Granted
    }
}

/// Positioning accuracy requested from the location source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyTier {
    /// Coarse, cell-level.
    Low,
    /// Block-level.
    Balanced,
    /// GPS-level.
    #[default]
    High,
}

/// Delivery options for a location subscription.
///
/// A fix is delivered once `min_interval` has elapsed or the rider has moved
/// `min_distance_m`, whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationOptions {
    /// Requested accuracy.
    pub accuracy: AccuracyTier,
    /// Minimum time between fixes.
    pub min_interval: Duration,
    /// Minimum movement between fixes, in meters.
    pub min_distance_m: f64,
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            accuracy: AccuracyTier::High,
            min_interval: Duration::from_secs(1),
            min_distance_m: 3.0,
        }
    }
}

impl From<&TelemetryConfig> for LocationOptions {
    fn from(config: &TelemetryConfig) -> Self {
        Self {
            accuracy: AccuracyTier::High,
            min_interval: config.location_interval(),
            min_distance_m: config.location_distance_m,
        }
    }
}

/// A single delivery from a sensor feed.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    /// A position fix.
    Location {
        /// Subscription that produced the fix.
        subscription: SubscriptionId,
        /// The fix.
        fix: LocationFix,
    },
    /// A raw acceleration vector.
    Orientation {
        /// Subscription that produced the vector.
        subscription: SubscriptionId,
        /// The vector.
        vector: AccelVector,
    },
    /// A payload the source could not decode.
    Malformed {
        /// Subscription that produced the payload.
        subscription: SubscriptionId,
        /// Feed the payload arrived on.
        feed: Feed,
        /// What was wrong with it.
        reason: String,
    },
}

impl SensorEvent {
    /// Subscription that produced this event.
    #[must_use]
    pub fn subscription(&self) -> SubscriptionId {
        match self {
            Self::Location { subscription, .. }
            | Self::Orientation { subscription, .. }
            | Self::Malformed { subscription, .. } => *subscription,
        }
    }

    /// Feed this event arrived on.
    #[must_use]
    pub fn feed(&self) -> Feed {
        match self {
            Self::Location { .. } => Feed::Location,
            Self::Orientation { .. } => Feed::Orientation,
            Self::Malformed { feed, .. } => *feed,
        }
    }
}

/// A handle to one active subscription.
///
/// Cheap to clone; every clone shares the same liveness flag.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    feed: Feed,
    live: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    /// Create a live handle with a fresh id.
    #[must_use]
    pub fn new(feed: Feed) -> Self {
        Self {
            id: NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed),
            feed,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Subscription id.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Feed this subscription belongs to.
    #[must_use]
    pub fn feed(&self) -> Feed {
        self.feed
    }

    /// Whether the subscription may still deliver events.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Mark the subscription cancelled. Idempotent.
    pub fn cancel(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    /// Whether `event` came from this subscription while it is still live.
    #[must_use]
    pub fn accepts(&self, event: &SensorEvent) -> bool {
        self.is_live() && event.subscription() == self.id && event.feed() == self.feed
    }
}

/// A source of position fixes.
#[async_trait::async_trait]
pub trait LocationSource: Send + Sync {
    /// Name of this source, for logging.
    fn name(&self) -> &'static str;

    /// Ask the platform for location access.
    async fn request_permission(&mut self) -> Permission;

    /// Begin delivering fixes into `tx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses to start the feed.
    fn subscribe(
        &mut self,
        options: &LocationOptions,
        tx: mpsc::Sender<SensorEvent>,
    ) -> Result<SubscriptionHandle>;

    /// Stop delivering fixes for `handle`. Safe to call more than once.
    fn unsubscribe(&mut self, handle: &SubscriptionHandle);
}

/// A source of raw acceleration vectors.
pub trait OrientationSource: Send + Sync {
    /// Name of this source, for logging.
    fn name(&self) -> &'static str;

    /// Set the interval between vectors for subsequent subscriptions.
    fn set_sample_interval(&mut self, interval: Duration);

    /// Begin delivering vectors into `tx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sensor is unavailable.
    fn subscribe(&mut self, tx: mpsc::Sender<SensorEvent>) -> Result<SubscriptionHandle>;

    /// Stop delivering vectors for `handle`. Safe to call more than once.
    fn unsubscribe(&mut self, handle: &SubscriptionHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_display() {
        assert_eq!(Feed::Location.to_string(), "location");
        assert_eq!(Feed::Orientation.to_string(), "orientation");
    }

    #[test]
    fn test_handle_ids_are_unique() {
        let a = SubscriptionHandle::new(Feed::Location);
        let b = SubscriptionHandle::new(Feed::Location);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_handle_cancel_is_shared_and_idempotent() {
        let handle = SubscriptionHandle::new(Feed::Orientation);
        let clone = handle.clone();
        assert!(clone.is_live());

        handle.cancel();
        handle.cancel();
        assert!(!clone.is_live());
    }

    #[test]
    fn test_handle_accepts_own_live_events_only() {
        let handle = SubscriptionHandle::new(Feed::Location);
        let own = SensorEvent::Location {
            subscription: handle.id(),
            fix: LocationFix::new(0.0, 0.0, None),
        };
        let other = SensorEvent::Location {
            subscription: handle.id() + 1000,
            fix: LocationFix::new(0.0, 0.0, None),
        };
        let wrong_feed = SensorEvent::Orientation {
            subscription: handle.id(),
            vector: AccelVector::new(0.0, 0.0, 1.0),
        };

        assert!(handle.accepts(&own));
        assert!(!handle.accepts(&other));
        assert!(!handle.accepts(&wrong_feed));

        handle.cancel();
        assert!(!handle.accepts(&own));
    }

    #[test]
    fn test_event_accessors() {
        let event = SensorEvent::Malformed {
            subscription: 7,
            feed: Feed::Orientation,
            reason: "short payload".to_string(),
        };
        assert_eq!(event.subscription(), 7);
        assert_eq!(event.feed(), Feed::Orientation);
    }

    #[test]
    fn test_location_options_from_config() {
        let config = TelemetryConfig {
            location_interval_ms: 2000,
            location_distance_m: 10.0,
            ..TelemetryConfig::default()
        };
        let options = LocationOptions::from(&config);
        assert_eq!(options.accuracy, AccuracyTier::High);
        assert_eq!(options.min_interval, Duration::from_secs(2));
        assert!((options.min_distance_m - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_permission() {
        assert!(Permission::Granted.is_granted());
        assert!(!Permission::Denied.is_granted());
    }
}
