//! Spatial data delivered by the sensor producer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CaptureError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Rotation quaternion, stored in `x y z w` order as written to the log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Quat = Quat::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle` radians around the vertical (y) axis.
    pub fn from_yaw(angle: f32) -> Self {
        let half = angle * 0.5;
        Self::new(0.0, half.sin(), 0.0, half.cos())
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Position and orientation of a frame in world space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub const fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self::default()
    }
}

/// Stable identifier of a tracked surface or anchor.
///
/// Tokens are written verbatim into space-separated log lines, so they
/// can never be empty or contain whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackableId(String);

impl TrackableId {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() || token.chars().any(char::is_whitespace) {
            return Err(CaptureError::MalformedTrackable(format!(
                "invalid trackable id {token:?}"
            )));
        }
        Ok(Self(token))
    }

    /// Render a 128-bit sensor identifier as `XXXXXXXXXXXXXXXX-XXXXXXXXXXXXXXXX`.
    pub fn from_parts(hi: u64, lo: u64) -> Self {
        Self(format!("{hi:016X}-{lo:016X}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TrackableId {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// One point of the sparse feature cloud.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointCloudPoint {
    /// Stable across ticks for the same physical point
    pub id: u64,
    pub position: Vec3,
    /// Detection confidence in `0..=1`, when the producer reports it
    pub confidence: Option<f32>,
}

impl PointCloudPoint {
    pub fn new(id: u64, position: Vec3, confidence: Option<f32>) -> Self {
        Self {
            id,
            position,
            confidence,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.position.is_finite() {
            return Err(CaptureError::MalformedTrackable(format!(
                "point {} has a non-finite coordinate",
                self.id
            )));
        }
        Ok(())
    }
}

/// A tracked planar surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub id: TrackableId,
    /// Pose of the plane's local frame
    pub pose: Pose,
    /// Boundary polygon in the plane's local frame, not required closed
    pub boundary: Vec<Vec2>,
    /// Plane that absorbed this one, if any
    pub subsumed_by: Option<TrackableId>,
}

impl Plane {
    pub const MIN_BOUNDARY_VERTICES: usize = 3;

    pub fn new(id: TrackableId, pose: Pose, boundary: Vec<Vec2>) -> Self {
        Self {
            id,
            pose,
            boundary,
            subsumed_by: None,
        }
    }

    pub fn subsumed(mut self, by: TrackableId) -> Self {
        self.subsumed_by = Some(by);
        self
    }

    pub fn is_subsumed(&self) -> bool {
        self.subsumed_by.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self.boundary.len() < Self::MIN_BOUNDARY_VERTICES {
            return Err(CaptureError::MalformedTrackable(format!(
                "plane {} has {} boundary vertices",
                self.id,
                self.boundary.len()
            )));
        }
        if !self.boundary.iter().all(Vec2::is_finite) {
            return Err(CaptureError::MalformedTrackable(format!(
                "plane {} has a non-finite boundary vertex",
                self.id
            )));
        }
        Ok(())
    }
}

/// Camera intrinsics written once at the head of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    /// Vertical field of view in degrees
    pub fov: f32,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trackable_id_rejects_whitespace() {
        assert!(TrackableId::new("P1").is_ok());
        assert!(TrackableId::new("").is_err());
        assert!(TrackableId::new("a b").is_err());
        assert!(TrackableId::new("a\tb").is_err());
    }

    #[test]
    fn test_trackable_id_from_parts() {
        let id = TrackableId::from_parts(0x1A, 0xFF00);
        assert_eq!(id.as_str(), "000000000000001A-000000000000FF00");
    }

    #[test]
    fn test_plane_validate_boundary() {
        let id = TrackableId::new("P1").unwrap();
        let triangle = vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0)];
        assert!(Plane::new(id.clone(), Pose::identity(), triangle).validate().is_ok());

        let segment = vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0)];
        let err = Plane::new(id.clone(), Pose::identity(), segment)
            .validate()
            .unwrap_err();
        assert!(matches!(err, CaptureError::MalformedTrackable(_)));

        let bad = vec![Vec2::new(0.0, 0.0), Vec2::new(f32::NAN, 0.0), Vec2::new(1.0, 1.0)];
        assert!(Plane::new(id, Pose::identity(), bad).validate().is_err());
    }

    #[test]
    fn test_point_validate_rejects_non_finite() {
        let ok = PointCloudPoint::new(1, Vec3::new(0.0, 1.0, 2.0), Some(0.5));
        assert!(ok.validate().is_ok());
        let bad = PointCloudPoint::new(2, Vec3::new(f32::INFINITY, 0.0, 0.0), None);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_yaw_quaternion_is_unit() {
        let q = Quat::from_yaw(1.2);
        let norm = q.x * q.x + q.y * q.y + q.z * q.z + q.w * q.w;
        assert!((norm - 1.0).abs() < 1e-6);
    }
}
