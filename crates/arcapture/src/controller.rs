//! Session lifecycle and the per-tick pipeline.
//!
//! [`CaptureController`] is owned by the frame loop. Each tick it drains the
//! plane tracker, builds a snapshot, encodes it and hands it to whichever
//! sinks are active. The sensor producer never talks to the controller
//! directly; it is given the [`ChangeTracker`] and [`PointCloudSignal`]
//! handles when it is constructed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::CaptureConfig;
use crate::error::{CaptureError, Result};
use crate::recording::{RecordingInfo, RecordingSink};
use crate::snapshot::{PointCloudSignal, SnapshotBuilder, SpatialSource};
use crate::streaming::{StreamingSink, StreamingState};
use crate::tracker::ChangeTracker;
use crate::types::Pose;

/// Maps frame-clock time to session-relative elapsed seconds.
#[derive(Debug, Clone, Copy, Default)]
struct SessionClock {
    origin: Option<f64>,
    last: f64,
}

impl SessionClock {
    /// Returns the elapsed time to emit, or `None` if the tick emits nothing.
    fn advance(&mut self, time: f64) -> Option<f64> {
        let Some(origin) = self.origin else {
            self.origin = Some(time);
            return None;
        };
        let elapsed = time - origin;
        if elapsed.is_nan() || elapsed <= self.last {
            log::debug!(
                "Skipping tick at {}: elapsed {} does not advance past {}",
                time,
                elapsed,
                self.last
            );
            return None;
        }
        self.last = elapsed;
        Some(elapsed)
    }
}

struct RecordingSession {
    sink: RecordingSink,
    clock: SessionClock,
    ticks: u64,
}

/// Owns the recording and streaming sinks and drives them once per tick.
pub struct CaptureController {
    config: CaptureConfig,
    tracker: Arc<ChangeTracker>,
    builder: SnapshotBuilder,
    recording: Option<RecordingSession>,
    streaming: Option<StreamingSink>,
}

impl CaptureController {
    pub fn new(config: CaptureConfig) -> Self {
        let builder = SnapshotBuilder::new(config.record, PointCloudSignal::new());
        Self {
            config,
            tracker: Arc::new(ChangeTracker::new()),
            builder,
            recording: None,
            streaming: None,
        }
    }

    /// Attach a bound streaming sink.
    pub fn with_streaming(mut self, sink: StreamingSink) -> Self {
        self.streaming = Some(sink);
        self
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Handle the producer reports plane changes through.
    pub fn tracker(&self) -> Arc<ChangeTracker> {
        Arc::clone(&self.tracker)
    }

    /// Handle the producer raises when its point set changes.
    pub fn cloud_signal(&self) -> PointCloudSignal {
        self.builder.cloud_signal().clone()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Path of the open recording, if any.
    pub fn recording_path(&self) -> Option<&Path> {
        self.recording.as_ref().map(|session| session.sink.path())
    }

    pub fn streaming_state(&self) -> StreamingState {
        self.streaming
            .as_ref()
            .map_or(StreamingState::Idle, StreamingSink::state)
    }

    pub fn streaming_sink(&self) -> Option<&StreamingSink> {
        self.streaming.as_ref()
    }

    /// Open a new recording under the configured output directory.
    ///
    /// An open recording is closed first.
    pub fn start_recording(&mut self, source: &dyn SpatialSource) -> Result<PathBuf> {
        self.stop_recording()?;
        let sink = RecordingSink::create_in(&self.config.output_dir)?;
        self.begin_recording(sink, source)
    }

    /// Open a new recording at an explicit path.
    pub fn start_recording_at(
        &mut self,
        path: impl AsRef<Path>,
        source: &dyn SpatialSource,
    ) -> Result<PathBuf> {
        self.stop_recording()?;
        let sink = RecordingSink::create(path)?;
        self.begin_recording(sink, source)
    }

    fn begin_recording(
        &mut self,
        mut sink: RecordingSink,
        source: &dyn SpatialSource,
    ) -> Result<PathBuf> {
        let streams = *self.builder.streams();
        if streams.camera {
            if let Some(metadata) = &self.config.metadata {
                sink.write_metadata(metadata)?;
            }
        }

        if streams.planes {
            self.tracker.activate(&source.planes());
        } else {
            self.tracker.deactivate();
        }
        self.builder.cloud_signal().mark_changed();

        let path = sink.path().to_path_buf();
        self.recording = Some(RecordingSession {
            sink,
            clock: SessionClock::default(),
            ticks: 0,
        });
        Ok(path)
    }

    /// Close the open recording, if any.
    pub fn stop_recording(&mut self) -> Result<Option<RecordingInfo>> {
        let Some(mut session) = self.recording.take() else {
            return Ok(None);
        };
        self.tracker.deactivate();
        log::debug!("Recording stopped after {} ticks", session.ticks);
        session.sink.close()
    }

    /// Stop if recording, otherwise start. Returns whether a recording is open afterwards.
    pub fn toggle_recording(&mut self, source: &dyn SpatialSource) -> Result<bool> {
        if self.is_recording() {
            self.stop_recording()?;
        } else {
            self.start_recording(source)?;
        }
        Ok(self.is_recording())
    }

    /// Start the live feed. No-op when already started or no sink is attached.
    pub fn start_streaming(&mut self) -> StreamingState {
        match &self.streaming {
            Some(sink) => sink.start(),
            None => {
                log::warn!("Streaming requested but no streaming sink is bound");
                StreamingState::Idle
            }
        }
    }

    pub fn stop_streaming(&mut self) {
        if let Some(sink) = &self.streaming {
            sink.stop();
        }
    }

    pub fn toggle_streaming(&mut self) -> StreamingState {
        if self.streaming_state() == StreamingState::Idle {
            self.start_streaming()
        } else {
            self.stop_streaming();
            StreamingState::Idle
        }
    }

    /// Stop every active sink.
    pub fn stop_all(&mut self) -> Result<Option<RecordingInfo>> {
        self.stop_streaming();
        self.stop_recording()
    }

    /// Run one frame of the pipeline.
    ///
    /// `time` is the frame clock in seconds; the first tick of a recording
    /// only fixes its origin. A recording write failure ends the recording and
    /// is returned; network failures are logged and the send is skipped.
    pub fn tick(&mut self, time: f64, pose: Pose, source: &dyn SpatialSource) -> Result<()> {
        if let Some(sink) = &self.streaming {
            match sink.push_pose(&pose) {
                Ok(_) => {}
                Err(e @ CaptureError::NetworkTransient(_)) => {
                    log::warn!("Skipping pose send this tick: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        let Some(session) = &mut self.recording else {
            return Ok(());
        };
        let Some(elapsed) = session.clock.advance(time) else {
            return Ok(());
        };

        let planes = self.tracker.is_active().then(|| self.tracker.drain());
        let snapshot = self.builder.build(elapsed, pose, source, planes);
        match session.sink.write_frame(&snapshot) {
            Ok(()) => {
                session.ticks += 1;
                Ok(())
            }
            Err(e) => {
                // Drained deltas are lost with the failed frame
                log::error!("Recording write failed, ending session: {}", e);
                if let Err(close_err) = self.stop_recording() {
                    log::warn!("Failed to close broken recording: {}", close_err);
                }
                Err(e)
            }
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        if let Err(e) = self.stop_all() {
            log::error!("Failed to stop capture cleanly: {}", e);
        }
    }
}
