//! Per-tick frame assembly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::RecordConfig;
use crate::tracker::PlaneChangeSet;
use crate::types::{Plane, PointCloudPoint, Pose};

/// The external sensor producer, as seen by the capture pipeline.
pub trait SpatialSource {
    /// Every point currently in the cloud.
    fn point_cloud(&self) -> Vec<PointCloudPoint>;

    /// Every plane currently tracked, used to seed a new session.
    fn planes(&self) -> Vec<Plane>;
}

/// Dirty flag raised by the producer whenever its point set mutates.
///
/// Cloned handles share the same flag, so the producer keeps one and the
/// snapshot builder consumes it.
#[derive(Debug, Clone, Default)]
pub struct PointCloudSignal(Arc<AtomicBool>);

impl PointCloudSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_changed(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Everything captured on one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    /// Seconds since the session's first tick
    pub elapsed: f64,
    /// Camera pose, when camera capture is enabled
    pub pose: Option<Pose>,
    /// Full point cloud, only on ticks after a change signal
    pub points: Option<Vec<PointCloudPoint>>,
    /// Plane deltas, only when plane capture is enabled
    pub planes: Option<PlaneChangeSet>,
}

impl FrameSnapshot {
    pub fn new(elapsed: f64) -> Self {
        Self {
            elapsed,
            pose: None,
            points: None,
            planes: None,
        }
    }
}

/// Builds [`FrameSnapshot`]s according to the enabled capture streams.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    streams: RecordConfig,
    cloud_signal: PointCloudSignal,
}

impl SnapshotBuilder {
    pub fn new(streams: RecordConfig, cloud_signal: PointCloudSignal) -> Self {
        Self {
            streams,
            cloud_signal,
        }
    }

    pub fn streams(&self) -> &RecordConfig {
        &self.streams
    }

    pub fn cloud_signal(&self) -> &PointCloudSignal {
        &self.cloud_signal
    }

    pub fn build(
        &self,
        elapsed: f64,
        pose: Pose,
        source: &dyn SpatialSource,
        planes: Option<PlaneChangeSet>,
    ) -> FrameSnapshot {
        let points = if self.streams.point_cloud && self.cloud_signal.take() {
            Some(self.collect_points(source))
        } else {
            None
        };

        FrameSnapshot {
            elapsed,
            pose: self.streams.camera.then_some(pose),
            points,
            planes: if self.streams.planes { planes } else { None },
        }
    }

    fn collect_points(&self, source: &dyn SpatialSource) -> Vec<PointCloudPoint> {
        source
            .point_cloud()
            .into_iter()
            .filter(|point| match point.validate() {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Dropping point from this tick: {}", e);
                    false
                }
            })
            .map(|mut point| {
                if !self.streams.confidence {
                    point.confidence = None;
                }
                point
            })
            .collect()
    }
}
