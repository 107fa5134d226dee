//! Deterministic sensor producer for demos and tests.
//!
//! The camera orbits the room origin. A floor plane grows over time, a wall
//! appears and is later merged into a larger wall, and the point cloud gains
//! a few points every fraction of a second. Plane events are reported through
//! the injected [`ChangeTracker`], cloud changes through the injected
//! [`PointCloudSignal`].

use std::sync::Arc;

use crate::snapshot::{PointCloudSignal, SpatialSource};
use crate::tracker::ChangeTracker;
use crate::types::{Plane, PointCloudPoint, Pose, Quat, TrackableId, Vec2, Vec3};

const ORBIT_RADIUS: f32 = 1.5;
const CAMERA_HEIGHT: f32 = 1.4;
/// Radians per second
const ORBIT_SPEED: f32 = 0.5;

/// Frame timing of the synthetic camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorFrame {
    pub index: u64,
    /// Frame clock in seconds
    pub time: f64,
    pub pose: Pose,
}

/// Scripted scene feeding a capture controller.
pub struct SyntheticSensor {
    fps: u32,
    frame: u64,
    tracker: Arc<ChangeTracker>,
    cloud_signal: PointCloudSignal,
    points: Vec<PointCloudPoint>,
    floor: Plane,
    wall: Option<Plane>,
    merged_wall: Option<Plane>,
}

impl SyntheticSensor {
    /// Frames between point cloud additions
    const POINT_INTERVAL: u64 = 10;
    /// Frames between floor growth steps
    const FLOOR_INTERVAL: u64 = 30;
    const WALL_APPEARS: u64 = 45;
    const WALL_MERGES: u64 = 120;

    pub fn new(fps: u32, tracker: Arc<ChangeTracker>, cloud_signal: PointCloudSignal) -> Self {
        Self {
            fps: fps.max(1),
            frame: 0,
            tracker,
            cloud_signal,
            points: Vec::new(),
            floor: Plane::new(floor_id(), Pose::identity(), square(0.5)),
            wall: None,
            merged_wall: None,
        }
    }

    /// Produce the next frame, reporting any scene changes first.
    pub fn advance(&mut self) -> SensorFrame {
        let index = self.frame;
        self.frame += 1;

        if index > 0 && index % Self::FLOOR_INTERVAL == 0 {
            let half = 0.5 + 0.25 * (index / Self::FLOOR_INTERVAL) as f32;
            self.floor.boundary = square(half);
            self.tracker.notify(&[], &[self.floor.clone()], &[]);
        }

        if index == Self::WALL_APPEARS {
            let wall = wall(wall_id(), 1.0);
            self.tracker.notify(&[wall.clone()], &[], &[]);
            self.wall = Some(wall);
        }

        if index == Self::WALL_MERGES {
            if let Some(wall) = self.wall.take() {
                let merged = wall_plane_merged();
                let subsumed = wall.subsumed(merged.id.clone());
                self.tracker.notify(&[merged.clone()], &[subsumed], &[]);
                self.merged_wall = Some(merged);
            }
        }

        if index % Self::POINT_INTERVAL == 0 {
            let id = self.points.len() as u64 + 1;
            self.points.push(scatter_point(id));
            self.cloud_signal.mark_changed();
        }

        let time = index as f64 / f64::from(self.fps);
        SensorFrame {
            index,
            time,
            pose: orbit_pose(time as f32),
        }
    }
}

impl SpatialSource for SyntheticSensor {
    fn point_cloud(&self) -> Vec<PointCloudPoint> {
        self.points.clone()
    }

    fn planes(&self) -> Vec<Plane> {
        std::iter::once(&self.floor)
            .chain(self.wall.as_ref())
            .chain(self.merged_wall.as_ref())
            .cloned()
            .collect()
    }
}

fn floor_id() -> TrackableId {
    TrackableId::from_parts(0x0F, 0x01)
}

fn wall_id() -> TrackableId {
    TrackableId::from_parts(0x0A, 0x01)
}

fn square(half: f32) -> Vec<Vec2> {
    vec![
        Vec2::new(-half, -half),
        Vec2::new(half, -half),
        Vec2::new(half, half),
        Vec2::new(-half, half),
    ]
}

fn wall(id: TrackableId, half_width: f32) -> Plane {
    let pose = Pose::new(
        Vec3::new(0.0, 1.0, -2.0),
        Quat::new(std::f32::consts::FRAC_1_SQRT_2, 0.0, 0.0, std::f32::consts::FRAC_1_SQRT_2),
    );
    Plane::new(id, pose, square(half_width))
}

fn wall_plane_merged() -> Plane {
    wall(TrackableId::from_parts(0x0A, 0x02), 2.0)
}

fn orbit_pose(time: f32) -> Pose {
    let angle = ORBIT_SPEED * time;
    let position = Vec3::new(
        ORBIT_RADIUS * angle.sin(),
        CAMERA_HEIGHT,
        ORBIT_RADIUS * angle.cos(),
    );
    Pose::new(position, Quat::from_yaw(angle))
}

/// Spread points over a fixed volume using a small integer hash.
fn scatter_point(id: u64) -> PointCloudPoint {
    let mut h = id.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut next = || {
        h ^= h >> 29;
        h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        (h >> 40) as f32 / (1u64 << 24) as f32
    };
    let position = Vec3::new(next() * 4.0 - 2.0, next() * 2.0, next() * 4.0 - 2.0);
    let confidence = 0.3 + 0.7 * next();
    PointCloudPoint::new(id, position, Some(confidence))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor() -> (SyntheticSensor, Arc<ChangeTracker>, PointCloudSignal) {
        let tracker = Arc::new(ChangeTracker::new());
        let signal = PointCloudSignal::new();
        let sensor = SyntheticSensor::new(30, Arc::clone(&tracker), signal.clone());
        (sensor, tracker, signal)
    }

    #[test]
    fn test_frame_clock() {
        let (mut sensor, _, _) = sensor();
        assert_eq!(sensor.advance().time, 0.0);
        let second = sensor.advance();
        assert_eq!(second.index, 1);
        assert!((second.time - 1.0 / 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_point_cloud_signal() {
        let (mut sensor, _, signal) = sensor();
        sensor.advance();
        assert!(signal.take());
        for _ in 1..SyntheticSensor::POINT_INTERVAL {
            sensor.advance();
        }
        assert!(!signal.is_pending());
        sensor.advance();
        assert!(signal.take());
        assert_eq!(sensor.point_cloud().len(), 2);
        assert!(sensor.point_cloud().iter().all(|p| p.validate().is_ok()));
    }

    #[test]
    fn test_wall_is_retired_after_merge() {
        let (mut sensor, tracker, _) = sensor();
        tracker.activate(&sensor.planes());
        assert_eq!(tracker.drain().updated.len(), 1);

        for _ in 0..=SyntheticSensor::WALL_APPEARS {
            sensor.advance();
        }
        let appeared = tracker.drain();
        assert!(appeared.updated.iter().any(|p| p.id == wall_id()));

        for _ in SyntheticSensor::WALL_APPEARS + 1..=SyntheticSensor::WALL_MERGES {
            sensor.advance();
        }
        let merged = tracker.drain();
        assert_eq!(merged.removed, vec![wall_id()]);
        assert!(merged
            .updated
            .iter()
            .any(|p| p.id == TrackableId::from_parts(0x0A, 0x02)));
        assert_eq!(sensor.planes().len(), 2);
    }

    #[test]
    fn test_deterministic() {
        let (mut a, _, _) = sensor();
        let (mut b, _, _) = sensor();
        for _ in 0..50 {
            assert_eq!(a.advance(), b.advance());
        }
        assert_eq!(a.point_cloud(), b.point_cloud());
    }
}
