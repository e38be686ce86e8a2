//! `ridelog` - Motorcycle ride telemetry from phone sensors
//!
//! This library turns an accelerometer feed and a location feed into live
//! roll and speed readouts, a latched hazard alert and a recorded path that
//! can be saved to a document store.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod animation;
pub mod cli;
pub mod config;
pub mod devices;
pub mod error;
pub mod hazard;
pub mod logging;
pub mod sampler;
pub mod sim;
pub mod sources;
pub mod storage;
pub mod telemetry;

pub use config::Config;
pub use error::{Error, Result};
pub use hazard::{HazardLatch, HazardState};
pub use logging::init_logging;
pub use sampler::{Collaborators, TelemetrySampler, TelemetrySnapshot};
pub use storage::{DocumentStore, SqliteDocumentStore, Storage, StorageStats};
pub use telemetry::{AccelVector, LocationFix, OrientationMode, SamplePoint, MAX_ROLL_ANGLE};
