//! Simulated collaborators for replaying a recorded ride.
//!
//! A [`Trace`] is a JSON-lines file of timestamped location fixes and raw
//! acceleration vectors. [`ReplayLocationSource`] and
//! [`ReplayOrientationSource`] play it back in (scaled) real time through the
//! same channel a platform sensor would use, so the sampler cannot tell the
//! difference. The console devices and [`StaticAuth`] stand in for the phone
//! hardware and the sign-in service.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::RiderConfig;
use crate::devices::{AlertSound, AuthProvider, HapticKind, Haptics, SoundHandle, User};
use crate::error::{Error, Result};
use crate::sources::{
    Feed, LocationOptions, LocationSource, OrientationSource, Permission, SensorEvent,
    SubscriptionHandle, SubscriptionId,
};
use crate::telemetry::{AccelVector, LocationFix};

/// Slowest accepted replay rate.
pub const MIN_SPEEDUP: f64 = 0.01;

/// Fastest accepted replay rate.
pub const MAX_SPEEDUP: f64 = 1000.0;

/// Latest offset a trace may carry: one week.
pub const MAX_TRACE_OFFSET_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// A value stamped with its offset from the start of the trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timed<T> {
    /// Milliseconds since the trace started.
    pub at_ms: u64,
    /// The recorded value.
    pub value: T,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TraceRecord {
    Location {
        #[serde(rename = "atMs")]
        at_ms: u64,
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        speed: Option<f64>,
    },
    Accel {
        #[serde(rename = "atMs")]
        at_ms: u64,
        x: f64,
        y: f64,
        z: f64,
    },
}

impl TraceRecord {
    fn at_ms(&self) -> u64 {
        match self {
            Self::Location { at_ms, .. } | Self::Accel { at_ms, .. } => *at_ms,
        }
    }
}

/// A recorded ride, split into its two feeds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trace {
    locations: Vec<Timed<LocationFix>>,
    vectors: Vec<Timed<AccelVector>>,
}

impl Trace {
    /// Parse JSON-lines trace text.
    ///
    /// Blank lines and lines starting with `#` are skipped. Each feed is
    /// ordered by time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TraceParse`] naming the first bad line.
    pub fn parse(input: &str) -> Result<Self> {
        let mut trace = Self::default();

        for (index, line) in input.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let record: TraceRecord =
                serde_json::from_str(line).map_err(|e| Error::TraceParse {
                    line: index + 1,
                    message: e.to_string(),
                })?;

            if record.at_ms() > MAX_TRACE_OFFSET_MS {
                return Err(Error::TraceParse {
                    line: index + 1,
                    message: format!(
                        "atMs {} is beyond the {} ms limit",
                        record.at_ms(),
                        MAX_TRACE_OFFSET_MS
                    ),
                });
            }

            match record {
                TraceRecord::Location {
                    at_ms,
                    latitude,
                    longitude,
                    speed,
                } => trace.locations.push(Timed {
                    at_ms,
                    value: LocationFix::new(latitude, longitude, speed),
                }),
                TraceRecord::Accel { at_ms, x, y, z } => trace.vectors.push(Timed {
                    at_ms,
                    value: AccelVector::new(x, y, z),
                }),
            }
        }

        trace.locations.sort_by_key(|t| t.at_ms);
        trace.vectors.sort_by_key(|t| t.at_ms);
        Ok(trace)
    }

    /// Read and parse a trace file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)?;
        let trace = Self::parse(&input)?;
        debug!(
            "Loaded trace {}: {} fixes, {} vectors",
            path.display(),
            trace.locations.len(),
            trace.vectors.len()
        );
        Ok(trace)
    }

    /// Location fixes in time order.
    #[must_use]
    pub fn locations(&self) -> &[Timed<LocationFix>] {
        &self.locations
    }

    /// Acceleration vectors in time order.
    #[must_use]
    pub fn vectors(&self) -> &[Timed<AccelVector>] {
        &self.vectors
    }

    /// Whether the trace holds no samples at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty() && self.vectors.is_empty()
    }

    /// Offset of the last sample.
    #[must_use]
    pub fn duration(&self) -> Duration {
        let last = self
            .locations
            .last()
            .map(|t| t.at_ms)
            .max(self.vectors.last().map(|t| t.at_ms))
            .unwrap_or(0);
        Duration::from_millis(last)
    }
}

/// Clamp a replay rate into the supported range. Non-finite rates mean 1x.
#[must_use]
pub fn normalize_speedup(speedup: f64) -> f64 {
    if speedup.is_finite() {
        speedup.clamp(MIN_SPEEDUP, MAX_SPEEDUP)
    } else {
        1.0
    }
}

/// Fixes a platform would deliver under `options`: the first, then any that
/// come `min_interval` after the last delivered one or `min_distance_m` away
/// from it.
fn location_schedule(
    fixes: &[Timed<LocationFix>],
    options: &LocationOptions,
) -> Vec<Timed<LocationFix>> {
    let min_interval_ms = u64::try_from(options.min_interval.as_millis()).unwrap_or(u64::MAX);
    let mut kept: Vec<Timed<LocationFix>> = Vec::with_capacity(fixes.len());

    for fix in fixes {
        let due = kept.last().map_or(true, |last| {
            fix.at_ms.saturating_sub(last.at_ms) >= min_interval_ms
                || last.value.distance_to(&fix.value) >= options.min_distance_m
        });
        if due {
            kept.push(*fix);
        }
    }
    kept
}

/// Vectors a sensor sampling every `interval` would deliver.
fn orientation_schedule(
    vectors: &[Timed<AccelVector>],
    interval: Duration,
) -> Vec<Timed<AccelVector>> {
    let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    let mut kept: Vec<Timed<AccelVector>> = Vec::with_capacity(vectors.len());

    for vector in vectors {
        let due = kept
            .last()
            .map_or(true, |last| vector.at_ms.saturating_sub(last.at_ms) >= interval_ms);
        if due {
            kept.push(*vector);
        }
    }
    kept
}

/// Play `schedule` into `tx` until it ends or the subscription is cancelled.
fn spawn_replay<T, F>(
    schedule: Vec<Timed<T>>,
    speedup: f64,
    handle: SubscriptionHandle,
    tx: mpsc::Sender<SensorEvent>,
    to_event: F,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(SubscriptionId, T) -> SensorEvent + Send + 'static,
{
    let origin = Instant::now();
    tokio::spawn(async move {
        let mut sent = 0_usize;
        for item in schedule {
            let offset = Duration::from_millis(item.at_ms).div_f64(speedup);
            let Some(deadline) = origin.checked_add(offset) else {
                warn!(
                    "{} replay {} stopped: offset {:?} is out of range",
                    handle.feed(),
                    handle.id(),
                    offset
                );
                break;
            };
            sleep_until(deadline).await;
            if !handle.is_live() {
                break;
            }
            if tx.send(to_event(handle.id(), item.value)).await.is_err() {
                break;
            }
            sent += 1;
        }
        debug!(
            "{} replay {} finished after {} events",
            handle.feed(),
            handle.id(),
            sent
        );
    })
}

/// Replays the location feed of a [`Trace`].
#[derive(Debug)]
pub struct ReplayLocationSource {
    fixes: Vec<Timed<LocationFix>>,
    speedup: f64,
    permission: Permission,
    tasks: HashMap<SubscriptionId, JoinHandle<()>>,
}

impl ReplayLocationSource {
    /// Replay `trace` at `speedup` times real time.
    #[must_use]
    pub fn new(trace: &Trace, speedup: f64) -> Self {
        Self {
            fixes: trace.locations.clone(),
            speedup: normalize_speedup(speedup),
            permission: Permission::Granted,
            tasks: HashMap::new(),
        }
    }

    /// Answer permission requests with `permission`.
    #[must_use]
    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }
}

#[async_trait::async_trait]
impl LocationSource for ReplayLocationSource {
    fn name(&self) -> &'static str {
        "replay-location"
    }

    async fn request_permission(&mut self) -> Permission {
        self.permission
    }

    fn subscribe(
        &mut self,
        options: &LocationOptions,
        tx: mpsc::Sender<SensorEvent>,
    ) -> Result<SubscriptionHandle> {
        let schedule = location_schedule(&self.fixes, options);
        debug!(
            "Replaying {} of {} fixes at {}x",
            schedule.len(),
            self.fixes.len(),
            self.speedup
        );

        let handle = SubscriptionHandle::new(Feed::Location);
        let task = spawn_replay(
            schedule,
            self.speedup,
            handle.clone(),
            tx,
            |subscription, fix| SensorEvent::Location { subscription, fix },
        );
        self.tasks.insert(handle.id(), task);
        Ok(handle)
    }

    fn unsubscribe(&mut self, handle: &SubscriptionHandle) {
        handle.cancel();
        if let Some(task) = self.tasks.remove(&handle.id()) {
            task.abort();
        }
    }
}

/// Replays the acceleration feed of a [`Trace`].
#[derive(Debug)]
pub struct ReplayOrientationSource {
    vectors: Vec<Timed<AccelVector>>,
    speedup: f64,
    interval: Duration,
    tasks: HashMap<SubscriptionId, JoinHandle<()>>,
}

impl ReplayOrientationSource {
    /// Replay `trace` at `speedup` times real time.
    #[must_use]
    pub fn new(trace: &Trace, speedup: f64) -> Self {
        Self {
            vectors: trace.vectors.clone(),
            speedup: normalize_speedup(speedup),
            interval: Duration::ZERO,
            tasks: HashMap::new(),
        }
    }
}

impl OrientationSource for ReplayOrientationSource {
    fn name(&self) -> &'static str {
        "replay-orientation"
    }

    fn set_sample_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    fn subscribe(&mut self, tx: mpsc::Sender<SensorEvent>) -> Result<SubscriptionHandle> {
        if self.vectors.is_empty() {
            warn!("Trace has no acceleration samples");
        }
        let schedule = orientation_schedule(&self.vectors, self.interval);

        let handle = SubscriptionHandle::new(Feed::Orientation);
        let task = spawn_replay(
            schedule,
            self.speedup,
            handle.clone(),
            tx,
            |subscription, vector| SensorEvent::Orientation {
                subscription,
                vector,
            },
        );
        self.tasks.insert(handle.id(), task);
        Ok(handle)
    }

    fn unsubscribe(&mut self, handle: &SubscriptionHandle) {
        handle.cancel();
        if let Some(task) = self.tasks.remove(&handle.id()) {
            task.abort();
        }
    }
}

/// Alert sound that logs instead of playing.
#[derive(Debug, Default)]
pub struct ConsoleAlertSound {
    next_handle: u64,
    loaded: HashMap<SoundHandle, String>,
    playing: Option<SoundHandle>,
}

impl ConsoleAlertSound {
    /// A player with nothing loaded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlertSound for ConsoleAlertSound {
    fn load(&mut self, resource: &str) -> Result<SoundHandle> {
        if resource.trim().is_empty() {
            return Err(Error::internal("empty sound resource"));
        }
        self.next_handle += 1;
        let handle = SoundHandle(self.next_handle);
        self.loaded.insert(handle, resource.to_string());
        debug!("Loaded sound {} as {:?}", resource, handle);
        Ok(handle)
    }

    fn play(&mut self, handle: SoundHandle) {
        if let Some(resource) = self.loaded.get(&handle) {
            warn!("ALERT sound on ({})", resource);
            self.playing = Some(handle);
        }
    }

    fn stop(&mut self, handle: SoundHandle) {
        if self.playing == Some(handle) {
            info!("Alert sound off");
            self.playing = None;
        }
    }

    fn is_playing(&self, handle: SoundHandle) -> bool {
        self.playing == Some(handle)
    }

    fn unload(&mut self, handle: SoundHandle) {
        if self.playing == Some(handle) {
            self.playing = None;
        }
        self.loaded.remove(&handle);
    }
}

/// Haptic motor that logs each pulse.
#[derive(Debug, Default)]
pub struct ConsoleHaptics {
    pulses: u64,
}

impl ConsoleHaptics {
    /// A motor that has not fired yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pulses fired so far.
    #[must_use]
    pub fn pulses(&self) -> u64 {
        self.pulses
    }
}

impl Haptics for ConsoleHaptics {
    fn pulse(&mut self, kind: HapticKind) {
        self.pulses += 1;
        info!("Haptic pulse: {}", kind);
    }
}

/// Identity fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    user: Option<User>,
}

impl StaticAuth {
    /// Always report `user`.
    #[must_use]
    pub fn new(user: Option<User>) -> Self {
        Self { user }
    }
}

impl From<&RiderConfig> for StaticAuth {
    fn from(config: &RiderConfig) -> Self {
        Self::new(config.user_id.as_ref().map(|id| User {
            id: id.clone(),
            email_verified: config.email_verified,
        }))
    }
}

impl AuthProvider for StaticAuth {
    fn current_user(&self) -> Option<User> {
        self.user.clone()
    }
}
