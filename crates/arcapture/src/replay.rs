//! Scene reconstruction from a decoded log.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::protocol::{DecodedFrame, DecodedLog};
use crate::types::{CaptureMetadata, Plane, PointCloudPoint, Pose, TrackableId};

/// Camera pose at a point in time, relative to the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraSample {
    pub time: f64,
    pub pose: Pose,
}

/// Folds decoded frames into the scene they describe.
#[derive(Debug, Clone)]
pub struct SceneReplay {
    min_confidence: f32,
    metadata: Option<CaptureMetadata>,
    origin: Option<f64>,
    camera_track: Vec<CameraSample>,
    points: BTreeMap<u64, PointCloudPoint>,
    planes: BTreeMap<TrackableId, Plane>,
    anchors: BTreeMap<TrackableId, Pose>,
    frames: u64,
    planes_removed: u64,
    points_rejected: u64,
}

impl Default for SceneReplay {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_CONFIDENCE)
    }
}

impl SceneReplay {
    /// Points reported below this confidence are ignored
    pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

    pub fn new(min_confidence: f32) -> Self {
        Self {
            min_confidence,
            metadata: None,
            origin: None,
            camera_track: Vec::new(),
            points: BTreeMap::new(),
            planes: BTreeMap::new(),
            anchors: BTreeMap::new(),
            frames: 0,
            planes_removed: 0,
            points_rejected: 0,
        }
    }

    /// Replay a whole log with the default confidence threshold.
    pub fn from_log(log: &DecodedLog) -> Self {
        Self::replay_log(log, Self::DEFAULT_MIN_CONFIDENCE)
    }

    pub fn replay_log(log: &DecodedLog, min_confidence: f32) -> Self {
        let mut replay = Self::new(min_confidence);
        replay.metadata = log.metadata;
        for frame in &log.frames {
            replay.apply(frame);
        }
        replay
    }

    pub fn apply(&mut self, frame: &DecodedFrame) {
        let snapshot = &frame.snapshot;
        let origin = *self.origin.get_or_insert(snapshot.elapsed);
        self.frames += 1;

        if let Some(pose) = snapshot.pose {
            self.camera_track.push(CameraSample {
                time: snapshot.elapsed - origin,
                pose,
            });
        }

        for point in snapshot.points.iter().flatten() {
            if point.confidence.is_some_and(|c| c < self.min_confidence) {
                self.points_rejected += 1;
                continue;
            }
            self.points.insert(point.id, *point);
        }

        if let Some(changes) = &snapshot.planes {
            for plane in &changes.updated {
                self.planes.insert(plane.id.clone(), plane.clone());
            }
            for id in &changes.removed {
                if self.planes.remove(id).is_some() {
                    self.planes_removed += 1;
                } else {
                    log::debug!("Removal of unknown plane {}", id);
                }
            }
        }

        for anchor in &frame.anchors {
            self.anchors.insert(anchor.id.clone(), anchor.pose);
        }
    }

    pub fn metadata(&self) -> Option<&CaptureMetadata> {
        self.metadata.as_ref()
    }

    pub fn camera_track(&self) -> &[CameraSample] {
        &self.camera_track
    }

    /// Accepted points, ordered by id.
    pub fn points(&self) -> impl Iterator<Item = &PointCloudPoint> {
        self.points.values()
    }

    /// Planes still active at the end of the replay, ordered by id.
    pub fn planes(&self) -> impl Iterator<Item = &Plane> {
        self.planes.values()
    }

    pub fn plane(&self, id: &TrackableId) -> Option<&Plane> {
        self.planes.get(id)
    }

    pub fn anchors(&self) -> &BTreeMap<TrackableId, Pose> {
        &self.anchors
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn summary(&self) -> ReplaySummary {
        let duration = self.camera_track.last().map_or(0.0, |sample| sample.time);
        let path_length = self
            .camera_track
            .windows(2)
            .map(|pair| {
                let (a, b) = (pair[0].pose.position, pair[1].pose.position);
                let (dx, dy, dz) = (b.x - a.x, b.y - a.y, b.z - a.z);
                f64::from((dx * dx + dy * dy + dz * dz).sqrt())
            })
            .sum();

        ReplaySummary {
            metadata: self.metadata,
            frames: self.frames,
            duration,
            camera_samples: self.camera_track.len(),
            path_length,
            points: self.points.len(),
            points_rejected: self.points_rejected,
            anchors: self.anchors.len(),
            planes_removed: self.planes_removed,
            planes: self
                .planes
                .values()
                .map(|plane| PlaneSummary {
                    id: plane.id.to_string(),
                    position: [
                        plane.pose.position.x,
                        plane.pose.position.y,
                        plane.pose.position.z,
                    ],
                    vertices: plane.boundary.len(),
                })
                .collect(),
        }
    }
}

/// Printable overview of a replayed log.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub metadata: Option<CaptureMetadata>,
    pub frames: u64,
    /// Seconds between the first and last camera sample
    pub duration: f64,
    pub camera_samples: usize,
    /// Distance travelled by the camera in metres
    pub path_length: f64,
    pub points: usize,
    pub points_rejected: u64,
    pub anchors: usize,
    pub planes_removed: u64,
    pub planes: Vec<PlaneSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaneSummary {
    pub id: String,
    pub position: [f32; 3],
    pub vertices: usize,
}
