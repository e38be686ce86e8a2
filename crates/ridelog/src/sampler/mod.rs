//! The telemetry sampler.
//!
//! [`TelemetrySampler`] owns a [`MonitoringSession`] and the sensor
//! subscriptions feeding it. Location fixes and acceleration vectors arrive on
//! a single channel and are handled one at a time by whichever task owns the
//! sampler, so the two callbacks never run concurrently.

mod session;

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::animation::Gauge;
use crate::config::TelemetryConfig;
use crate::devices::{AlertController, AlertSound, AuthProvider, Haptics};
use crate::error::{Error, Result};
use crate::hazard::{HazardLatch, HazardState, HazardThresholds, HazardTransition};
use crate::sources::{
    Feed, LocationOptions, LocationSource, OrientationSource, SensorEvent, SubscriptionHandle,
};
use crate::storage::DocumentStore;
use crate::telemetry::{
    pitch_from_vector, roll_from_vector, speed_kmh, AccelVector, LocationFix, Orientation,
    OrientationMode, SamplePoint,
};

pub use session::{
    ConnectionStatus, LatestOrientation, MonitoringSession, SessionDocument, SESSIONS_COLLECTION,
};

/// Events buffered between the sources and the sampler.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// External collaborators the sampler drives.
pub struct Collaborators {
    /// Position fixes.
    pub location: Box<dyn LocationSource>,
    /// Acceleration vectors.
    pub orientation: Box<dyn OrientationSource>,
    /// Looping alert sound.
    pub sound: Box<dyn AlertSound>,
    /// Haptic motor.
    pub haptics: Box<dyn Haptics>,
    /// Where saved sessions go.
    pub store: Arc<dyn DocumentStore>,
    /// Rider identity.
    pub auth: Box<dyn AuthProvider>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("location", &self.location.name())
            .field("orientation", &self.orientation.name())
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of the sampler for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    /// Connection status.
    pub status: ConnectionStatus,
    /// Whether recording is paused.
    pub paused: bool,
    /// Active mounting mode.
    pub mode: OrientationMode,
    /// Numeric speed readout.
    pub speed_kmh: u32,
    /// Numeric roll readout.
    pub roll: i32,
    /// Numeric pitch readout.
    pub pitch: i32,
    /// Latched hazard flags.
    pub hazard: HazardState,
    /// Times the hazard latch has closed this session.
    pub hazard_triggers: u64,
    /// Whether the alert sound is playing.
    pub alert_playing: bool,
    /// Points in the path buffer.
    pub point_count: usize,
    /// Animated roll dial position.
    pub roll_display: f64,
    /// Animated speed bar position.
    pub speed_display: f64,
    /// Where the roll dial is heading, clamped but not rounded.
    pub roll_target: f64,
    /// Where the speed bar is heading, clamped to the gauge range.
    pub speed_target: f64,
    /// Events discarded as stale or malformed.
    pub dropped_events: u64,
}

/// Turns location and orientation feeds into live readouts, a hazard alert
/// and a recorded path.
pub struct TelemetrySampler {
    config: TelemetryConfig,
    mode: OrientationMode,
    session: MonitoringSession,
    latest: LatestOrientation,
    latch: HazardLatch,
    alert: AlertController,
    speed_kmh: u32,
    roll_gauge: Gauge,
    speed_gauge: Gauge,
    location: Box<dyn LocationSource>,
    orientation: Box<dyn OrientationSource>,
    store: Arc<dyn DocumentStore>,
    auth: Box<dyn AuthProvider>,
    location_sub: Option<SubscriptionHandle>,
    orientation_sub: Option<SubscriptionHandle>,
    events: Option<mpsc::Receiver<SensorEvent>>,
    hazard_triggers: u64,
    dropped_events: u64,
}

impl std::fmt::Debug for TelemetrySampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetrySampler")
            .field("mode", &self.mode)
            .field("status", &self.session.status())
            .field("paused", &self.session.is_paused())
            .field("points", &self.session.points().len())
            .field("hazard", &self.latch.state())
            .field("alert", &self.alert)
            .finish_non_exhaustive()
    }
}

impl TelemetrySampler {
    /// Build a disconnected sampler and load the alert sound.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] if the roll or speed ranges in
    /// `config` are unusable.
    pub fn new(config: &TelemetryConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let Collaborators {
            location,
            orientation,
            sound,
            haptics,
            store,
            auth,
        } = collaborators;

        let now = Instant::now();
        let max_roll = config.max_roll_angle;

        Ok(Self {
            config: config.clone(),
            mode: config.orientation_mode,
            session: MonitoringSession::new(),
            latest: LatestOrientation::new(),
            latch: HazardLatch::new(HazardThresholds::from(config)),
            alert: AlertController::new(sound, haptics, &config.alert_sound),
            speed_kmh: 0,
            roll_gauge: Gauge::new(-max_roll, max_roll, config.roll_animation(), now),
            speed_gauge: Gauge::new(0.0, config.speed_gauge_max_kmh, config.speed_animation(), now),
            location,
            orientation,
            store,
            auth,
            location_sub: None,
            orientation_sub: None,
            events: None,
            hazard_triggers: 0,
            dropped_events: 0,
        })
    }

    /// Switch mounting mode. Applies to vectors handled from now on.
    pub fn set_mode(&mut self, mode: OrientationMode) {
        if mode != self.mode {
            info!("Orientation mode: {} -> {}", self.mode, mode);
            self.mode = mode;
        }
    }

    /// Active mounting mode.
    #[must_use]
    pub fn mode(&self) -> OrientationMode {
        self.mode
    }

    /// Begin a new recording.
    ///
    /// Calling this while connected restarts the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if location access is refused, in
    /// which case nothing changes. Returns the source's error if either feed
    /// cannot be subscribed.
    pub async fn start(&mut self) -> Result<()> {
        let permission = self.location.request_permission().await;
        if !permission.is_granted() {
            warn!("Location permission denied by {}", self.location.name());
            return Err(Error::permission_denied("location"));
        }

        if self.session.status() == ConnectionStatus::Connected {
            info!("Restarting session");
            self.stop();
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let options = LocationOptions::from(&self.config);
        let location_sub = self.location.subscribe(&options, tx.clone())?;

        self.orientation
            .set_sample_interval(self.config.orientation_interval());
        let orientation_sub = match self.orientation.subscribe(tx) {
            Ok(handle) => handle,
            Err(e) => {
                location_sub.cancel();
                self.location.unsubscribe(&location_sub);
                return Err(e);
            }
        };

        debug!(
            "Subscribed location={} orientation={}",
            location_sub.id(),
            orientation_sub.id()
        );

        self.location_sub = Some(location_sub);
        self.orientation_sub = Some(orientation_sub);
        self.events = Some(rx);

        let now = Instant::now();
        self.session.start();
        self.latch.reset();
        self.alert.silence();
        self.hazard_triggers = 0;
        self.speed_kmh = 0;
        self.latest.reset();
        self.roll_gauge.snap(0.0, now);
        self.speed_gauge.snap(0.0, now);

        info!(
            "Session started ({}, {} / {})",
            self.mode,
            self.location.name(),
            self.orientation.name()
        );
        Ok(())
    }

    /// End the recording. Safe to call at any time.
    ///
    /// The path is kept so it can still be saved.
    pub fn stop(&mut self) {
        let was_connected = self.session.status() == ConnectionStatus::Connected;

        if let Some(handle) = self.location_sub.take() {
            handle.cancel();
            self.location.unsubscribe(&handle);
        }
        if let Some(handle) = self.orientation_sub.take() {
            handle.cancel();
            self.orientation.unsubscribe(&handle);
        }
        self.events = None;

        self.session.stop();
        self.speed_kmh = 0;
        self.speed_gauge.set_target(0.0, Instant::now());
        self.latch.reset();
        self.alert.silence();

        if was_connected {
            info!(
                "Session stopped with {} points",
                self.session.points().len()
            );
        }
    }

    /// Pause or resume recording and return whether it is now paused.
    ///
    /// Subscriptions stay open while paused; incoming events are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] when no session is running.
    pub fn toggle_pause(&mut self) -> Result<bool> {
        let paused = self.session.toggle_pause()?;
        if paused {
            self.alert.silence();
            info!("Recording paused");
        } else {
            info!("Recording resumed");
        }
        Ok(paused)
    }

    /// Wait for the next event and handle it.
    ///
    /// Returns `false` once there is nothing left to wait for: the sampler is
    /// stopped, or every source has finished.
    pub async fn process_next(&mut self) -> bool {
        let event = match self.events.as_mut() {
            Some(rx) => rx.recv().await,
            None => return false,
        };
        match event {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Route one event from a source.
    ///
    /// Events for a subscription that is no longer current are dropped.
    pub fn handle_event(&mut self, event: SensorEvent) {
        let current = match event.feed() {
            Feed::Location => self.location_sub.as_ref(),
            Feed::Orientation => self.orientation_sub.as_ref(),
        };
        if !current.is_some_and(|handle| handle.accepts(&event)) {
            self.dropped_events += 1;
            debug!(
                "Dropped stale {} event from subscription {}",
                event.feed(),
                event.subscription()
            );
            return;
        }

        match event {
            SensorEvent::Location { fix, .. } => self.on_location(&fix),
            SensorEvent::Orientation { vector, .. } => self.on_orientation(&vector),
            SensorEvent::Malformed { feed, reason, .. } => {
                let err = Error::sensor_delivery(format!("{feed}: {reason}"));
                self.dropped_events += 1;
                debug!("Dropped event: {}", err);
            }
        }
    }

    /// Handle a position fix.
    pub fn on_location(&mut self, fix: &LocationFix) {
        if !self.session.is_recording() {
            return;
        }
        if !fix.has_valid_coordinates() {
            self.dropped_events += 1;
            debug!("Dropped fix with unusable coordinates");
            return;
        }

        let kmh = speed_kmh(fix.speed);
        self.speed_kmh = kmh;
        self.speed_gauge.set_target(f64::from(kmh), Instant::now());

        let point = SamplePoint::new(fix, self.latest.get(), kmh);
        self.session.append_sample(point);

        self.evaluate_hazard();
    }

    /// Handle an acceleration vector.
    pub fn on_orientation(&mut self, vector: &AccelVector) {
        if !self.session.is_recording() {
            return;
        }
        if !vector.is_finite() {
            self.dropped_events += 1;
            debug!("Dropped non-finite acceleration vector");
            return;
        }

        let reading = roll_from_vector(vector, self.mode, self.config.max_roll_angle);
        let pitch = pitch_from_vector(vector, self.mode);
        self.latest.set(Orientation {
            roll: reading.degrees,
            pitch,
        });
        self.roll_gauge.set_target(reading.clamped, Instant::now());

        self.evaluate_hazard();
    }

    fn evaluate_hazard(&mut self) {
        let roll = self.latest.get().roll;
        match self.latch.evaluate(self.speed_kmh, roll) {
            HazardTransition::Triggered { speed, roll: lean } => {
                warn!(
                    "Hazard: speed={} km/h{} roll={}°{}",
                    self.speed_kmh,
                    if speed { " (over)" } else { "" },
                    roll,
                    if lean { " (over)" } else { "" }
                );
                self.hazard_triggers += 1;
                self.alert.trigger();
            }
            // Resuming from a pause with the latch still closed restarts the
            // sound without a second pulse.
            HazardTransition::Held => self.alert.ensure_playing(),
            HazardTransition::Cleared => {
                info!("Hazard cleared");
                self.alert.silence();
            }
            HazardTransition::Idle => self.alert.silence(),
        }
    }

    /// Write the recorded path to the document store and return its id.
    ///
    /// The path is cleared only once the store accepts it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SaveValidation`] without calling the store if no rider
    /// is signed in or nothing was recorded, and [`Error::SaveTransport`] if
    /// the store write fails.
    pub async fn save(&mut self) -> Result<String> {
        let user = self
            .auth
            .current_user()
            .ok_or_else(|| Error::save_validation("no rider is signed in"))?;
        if self.session.points().is_empty() {
            return Err(Error::save_validation("no points recorded"));
        }

        let document = SessionDocument::new(user.id, self.session.points().to_vec());
        let payload = serde_json::to_value(&document)?;

        match self
            .store
            .create_document(SESSIONS_COLLECTION, payload)
            .await
        {
            Ok(id) => {
                info!("Saved session {} ({} points)", id, document.point_count);
                self.session.clear_points();
                Ok(id)
            }
            Err(e) => {
                warn!("Failed to save session: {}", e);
                Err(Error::save_transport(e.to_string()))
            }
        }
    }

    /// Current readouts and state.
    #[must_use]
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let now = Instant::now();
        let orientation = self.latest.get();
        TelemetrySnapshot {
            status: self.session.status(),
            paused: self.session.is_paused(),
            mode: self.mode,
            speed_kmh: self.speed_kmh,
            roll: orientation.roll,
            pitch: orientation.pitch,
            hazard: self.latch.state(),
            hazard_triggers: self.hazard_triggers,
            alert_playing: self.alert.is_playing(),
            point_count: self.session.points().len(),
            roll_display: self.roll_gauge.value_at(now),
            speed_display: self.speed_gauge.value_at(now),
            roll_target: self.roll_gauge.target(),
            speed_target: self.speed_gauge.target(),
            dropped_events: self.dropped_events,
        }
    }

    /// Recorded path.
    #[must_use]
    pub fn points(&self) -> &[SamplePoint] {
        self.session.points()
    }

    /// Connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.session.status()
    }

    /// Whether recording is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.session.is_paused()
    }

    /// Shared handle to the latest roll and pitch.
    #[must_use]
    pub fn latest_orientation(&self) -> LatestOrientation {
        self.latest.clone()
    }
}

impl Drop for TelemetrySampler {
    fn drop(&mut self) {
        self.stop();
    }
}
