//! Output devices and identity.
//!
//! Traits for the alert sound, haptic motor and rider identity, plus
//! [`AlertController`], which owns the single alert sound handle and makes
//! start/stop idempotent.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Handle to a loaded sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundHandle(pub u64);

/// Haptic pulse intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HapticKind {
    /// Subtle tap.
    Light,
    /// Attention.
    Warning,
    /// Danger.
    Error,
}

impl std::fmt::Display for HapticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A looping alert sound player.
pub trait AlertSound: Send + Sync {
    /// Load a sound resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be loaded.
    fn load(&mut self, resource: &str) -> Result<SoundHandle>;

    /// Start looping playback.
    fn play(&mut self, handle: SoundHandle);

    /// Stop playback.
    fn stop(&mut self, handle: SoundHandle);

    /// Whether the sound is currently playing.
    fn is_playing(&self, handle: SoundHandle) -> bool;

    /// Release the resource.
    fn unload(&mut self, handle: SoundHandle);
}

/// A haptic feedback motor.
pub trait Haptics: Send + Sync {
    /// Fire one pulse.
    fn pulse(&mut self, kind: HapticKind);
}

/// The signed-in rider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable user identifier.
    pub id: String,
    /// Whether the rider's email has been verified.
    pub email_verified: bool,
}

/// Source of the current rider identity.
pub trait AuthProvider: Send + Sync {
    /// The signed-in rider, if any.
    fn current_user(&self) -> Option<User>;
}

/// Drives the alert sound and haptics for hazard transitions.
pub struct AlertController {
    sound: Box<dyn AlertSound>,
    haptics: Box<dyn Haptics>,
    handle: Option<SoundHandle>,
}

impl std::fmt::Debug for AlertController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertController")
            .field("handle", &self.handle)
            .field("playing", &self.is_playing())
            .finish_non_exhaustive()
    }
}

impl AlertController {
    /// Load `resource` into `sound`.
    ///
    /// A sound that fails to load is logged; haptics still fire.
    #[must_use]
    pub fn new(mut sound: Box<dyn AlertSound>, haptics: Box<dyn Haptics>, resource: &str) -> Self {
        let handle = match sound.load(resource) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to load alert sound {}: {}", resource, e);
                None
            }
        };
        Self {
            sound,
            haptics,
            handle,
        }
    }

    /// Start the alert and fire an error pulse.
    pub fn trigger(&mut self) {
        self.ensure_playing();
        self.haptics.pulse(HapticKind::Error);
    }

    /// Start the sound if it is not already playing. No pulse.
    pub fn ensure_playing(&mut self) {
        if let Some(handle) = self.handle {
            if !self.sound.is_playing(handle) {
                self.sound.play(handle);
            }
        }
    }

    /// Stop the sound if it is playing.
    pub fn silence(&mut self) {
        if let Some(handle) = self.handle {
            if self.sound.is_playing(handle) {
                debug!("Silencing alert sound");
                self.sound.stop(handle);
            }
        }
    }

    /// Whether the alert sound is currently playing.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.handle.is_some_and(|h| self.sound.is_playing(h))
    }
}

impl Drop for AlertController {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if self.sound.is_playing(handle) {
                self.sound.stop(handle);
            }
            self.sound.unload(handle);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording fakes shared by the sampler tests.

    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::Error;

    /// Calls observed by a fake device.
    #[derive(Debug, Default)]
    pub struct DeviceLog {
        pub plays: usize,
        pub stops: usize,
        pub unloads: usize,
        pub playing: bool,
        pub pulses: Vec<HapticKind>,
    }

    pub type SharedLog = Arc<Mutex<DeviceLog>>;

    #[derive(Debug, Default)]
    pub struct FakeSound {
        pub log: SharedLog,
        pub fail_load: bool,
    }

    impl AlertSound for FakeSound {
        fn load(&mut self, resource: &str) -> Result<SoundHandle> {
            if self.fail_load {
                return Err(Error::internal(format!("missing {resource}")));
            }
            Ok(SoundHandle(1))
        }

        fn play(&mut self, _handle: SoundHandle) {
            let mut log = self.log.lock().unwrap();
            log.plays += 1;
            log.playing = true;
        }

        fn stop(&mut self, _handle: SoundHandle) {
            let mut log = self.log.lock().unwrap();
            log.stops += 1;
            log.playing = false;
        }

        fn is_playing(&self, _handle: SoundHandle) -> bool {
            self.log.lock().unwrap().playing
        }

        fn unload(&mut self, _handle: SoundHandle) {
            self.log.lock().unwrap().unloads += 1;
        }
    }

    #[derive(Debug, Default)]
    pub struct FakeHaptics {
        pub log: SharedLog,
    }

    impl Haptics for FakeHaptics {
        fn pulse(&mut self, kind: HapticKind) {
            self.log.lock().unwrap().pulses.push(kind);
        }
    }
}
