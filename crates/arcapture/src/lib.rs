//! Per-frame spatial capture.
//!
//! A frame loop hands the camera pose to a [`CaptureController`] once per
//! tick. The controller combines it with plane deltas collected by the
//! [`ChangeTracker`] and the point cloud (resent in full whenever the
//! producer raises the [`PointCloudSignal`]) and writes the result as
//! line-protocol text to a recording file, a live UDP pose feed, or both.
//!
//! # Example
//!
//! ```ignore
//! use arcapture::{CaptureConfig, CaptureController, SyntheticSensor};
//!
//! let mut controller = CaptureController::new(CaptureConfig::default());
//! let mut sensor = SyntheticSensor::new(30, controller.tracker(), controller.cloud_signal());
//!
//! controller.start_recording(&sensor)?;
//! for _ in 0..300 {
//!     let frame = sensor.advance();
//!     controller.tick(frame.time, frame.pose, &sensor)?;
//! }
//! controller.stop_recording()?;
//! ```
//!
//! Logs are read back with [`decode_log`] and folded into a scene with
//! [`SceneReplay`].

pub mod config;
pub mod controller;
pub mod error;
pub mod protocol;
pub mod recording;
pub mod replay;
pub mod sim;
pub mod snapshot;
pub mod streaming;
pub mod tracker;
pub mod types;

pub use config::{CaptureConfig, ConfigError, RecordConfig, StreamConfig};
pub use controller::CaptureController;
pub use error::{CaptureError, Result};
pub use protocol::{decode_log, DecodedFrame, DecodedLog, FrameDecoder, LineRecord, LogReader};
pub use recording::{RecordingInfo, RecordingSink};
pub use replay::{ReplaySummary, SceneReplay};
pub use sim::{SensorFrame, SyntheticSensor};
pub use snapshot::{FrameSnapshot, PointCloudSignal, SnapshotBuilder, SpatialSource};
pub use streaming::{StreamingSink, StreamingState};
pub use tracker::{ChangeTracker, PlaneChangeSet};
pub use types::{CaptureMetadata, Plane, PointCloudPoint, Pose, Quat, TrackableId, Vec2, Vec3};
