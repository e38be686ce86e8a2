//! Recording session state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::telemetry::{Orientation, SamplePoint};

/// Collection saved sessions are written to.
pub const SESSIONS_COLLECTION: &str = "sessions";

/// Whether the sensor feeds are attached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No active subscriptions.
    #[default]
    Disconnected,
    /// Both feeds subscribed.
    Connected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// The active recording: connection status, pause flag and path buffer.
#[derive(Debug, Clone, Default)]
pub struct MonitoringSession {
    status: ConnectionStatus,
    paused: bool,
    points: Vec<SamplePoint>,
}

impl MonitoringSession {
    /// A disconnected session with an empty path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a fresh recording. Any previous path is discarded.
    pub fn start(&mut self) {
        self.points.clear();
        self.paused = false;
        self.status = ConnectionStatus::Connected;
    }

    /// End the recording. The path is kept for saving.
    pub fn stop(&mut self) {
        self.status = ConnectionStatus::Disconnected;
        self.paused = false;
    }

    /// Flip the pause flag and return the new value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] when no recording is active.
    pub fn toggle_pause(&mut self) -> Result<bool> {
        if self.status != ConnectionStatus::Connected {
            return Err(Error::NotConnected);
        }
        self.paused = !self.paused;
        Ok(self.paused)
    }

    /// Connected and not paused.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.status == ConnectionStatus::Connected && !self.paused
    }

    /// Append a point while recording. Returns whether it was kept.
    pub fn append_sample(&mut self, point: SamplePoint) -> bool {
        if !self.is_recording() {
            return false;
        }
        self.points.push(point);
        true
    }

    /// Drop the path after it has been handed off.
    pub fn clear_points(&mut self) {
        self.points.clear();
    }

    /// Connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Pause flag; only meaningful while connected.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Recorded path in capture order.
    #[must_use]
    pub fn points(&self) -> &[SamplePoint] {
        &self.points
    }
}

/// Latest roll and pitch, shared between the orientation writer and any
/// number of readers.
///
/// Both angles live in a single atomic word so readers on other threads never
/// observe a roll from one reading paired with a pitch from another.
#[derive(Debug, Clone, Default)]
pub struct LatestOrientation {
    packed: Arc<AtomicU64>,
}

impl LatestOrientation {
    /// A cell reading zero roll and pitch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Roll in the high half, pitch in the low half, each as raw i32 bits.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss
    )]
    fn unpack(bits: u64) -> Orientation {
        Orientation {
            roll: (bits >> 32) as u32 as i32,
            pitch: bits as u32 as i32,
        }
    }

    #[allow(clippy::cast_sign_loss)]
    fn pack(orientation: Orientation) -> u64 {
        (u64::from(orientation.roll as u32) << 32) | u64::from(orientation.pitch as u32)
    }

    /// Publish a new reading. Only the orientation path writes.
    pub fn set(&self, orientation: Orientation) {
        self.packed.store(Self::pack(orientation), Ordering::Release);
    }

    /// Most recent reading.
    #[must_use]
    pub fn get(&self) -> Orientation {
        Self::unpack(self.packed.load(Ordering::Acquire))
    }

    /// Back to level.
    pub fn reset(&self) {
        self.set(Orientation::default());
    }
}

/// A saved session as written to the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    /// Rider who recorded the session.
    pub user_id: String,
    /// When the document was assembled.
    pub created_at: DateTime<Utc>,
    /// Number of entries in `points`.
    pub point_count: usize,
    /// Path in capture order.
    pub points: Vec<SamplePoint>,
}

impl SessionDocument {
    /// Assemble a document for `points`, stamped now.
    #[must_use]
    pub fn new(user_id: impl Into<String>, points: Vec<SamplePoint>) -> Self {
        Self {
            user_id: user_id.into(),
            created_at: Utc::now(),
            point_count: points.len(),
            points,
        }
    }

    /// Highest recorded speed.
    #[must_use]
    pub fn peak_speed_kmh(&self) -> u32 {
        self.points.iter().map(|p| p.speed_kmh).max().unwrap_or(0)
    }

    /// Largest lean either way.
    #[must_use]
    pub fn peak_lean_deg(&self) -> u32 {
        self.points
            .iter()
            .map(|p| p.roll.unsigned_abs())
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::LocationFix;

    fn point(speed_kmh: u32, roll: i32) -> SamplePoint {
        SamplePoint::new(
            &LocationFix::new(-8.65, 115.22, None),
            Orientation { roll, pitch: 0 },
            speed_kmh,
        )
    }

    #[test]
    fn test_session_starts_disconnected() {
        let session = MonitoringSession::new();
        assert_eq!(session.status(), ConnectionStatus::Disconnected);
        assert!(!session.is_recording());
        assert!(session.points().is_empty());
    }

    #[test]
    fn test_append_only_while_recording() {
        let mut session = MonitoringSession::new();
        assert!(!session.append_sample(point(10, 0)));

        session.start();
        assert!(session.append_sample(point(10, 0)));

        session.toggle_pause().unwrap();
        assert!(!session.append_sample(point(20, 0)));

        session.toggle_pause().unwrap();
        assert!(session.append_sample(point(30, 0)));

        let speeds: Vec<_> = session.points().iter().map(|p| p.speed_kmh).collect();
        assert_eq!(speeds, vec![10, 30]);
    }

    #[test]
    fn test_toggle_pause_requires_connection() {
        let mut session = MonitoringSession::new();
        assert!(matches!(session.toggle_pause(), Err(Error::NotConnected)));

        session.start();
        assert!(session.toggle_pause().unwrap());
        assert!(!session.toggle_pause().unwrap());
    }

    #[test]
    fn test_stop_keeps_points_and_start_clears_them() {
        let mut session = MonitoringSession::new();
        session.start();
        session.append_sample(point(50, 5));
        session.toggle_pause().unwrap();

        session.stop();
        assert_eq!(session.status(), ConnectionStatus::Disconnected);
        assert!(!session.is_paused());
        assert_eq!(session.points().len(), 1);

        session.start();
        assert_eq!(session.status(), ConnectionStatus::Connected);
        assert!(session.points().is_empty());
    }

    #[test]
    fn test_latest_orientation_round_trips_signed_values() {
        let cell = LatestOrientation::new();
        assert_eq!(cell.get(), Orientation::default());

        for (roll, pitch) in [(-50, 90), (50, -90), (-1, -1), (0, 17), (i32::MIN, i32::MAX)] {
            cell.set(Orientation { roll, pitch });
            assert_eq!(cell.get(), Orientation { roll, pitch });
        }
    }

    #[test]
    fn test_latest_orientation_is_shared_across_clones() {
        let writer = LatestOrientation::new();
        let reader = writer.clone();

        writer.set(Orientation { roll: -30, pitch: 4 });
        assert_eq!(reader.get().roll, -30);

        writer.reset();
        assert_eq!(reader.get(), Orientation::default());
    }

    #[test]
    fn test_latest_orientation_across_threads() {
        let cell = LatestOrientation::new();
        let writer = cell.clone();

        std::thread::spawn(move || {
            for roll in -50..=50 {
                writer.set(Orientation { roll, pitch: -roll });
            }
        })
        .join()
        .unwrap();

        let last = cell.get();
        assert_eq!(last.roll, 50);
        assert_eq!(last.pitch, -50);
    }

    #[test]
    fn test_session_document() {
        let doc = SessionDocument::new("rider-1", vec![point(80, -20), point(130, 41)]);
        assert_eq!(doc.point_count, 2);
        assert_eq!(doc.peak_speed_kmh(), 130);
        assert_eq!(doc.peak_lean_deg(), 41);

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["userId"], "rider-1");
        assert_eq!(json["pointCount"], 2);
        assert!(json["points"][0].get("timestampIso").is_some());

        let back: SessionDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_empty_session_document_peaks() {
        let doc = SessionDocument::new("rider", Vec::new());
        assert_eq!(doc.peak_speed_kmh(), 0);
        assert_eq!(doc.peak_lean_deg(), 0);
    }
}
