//! Snapshot to line encoding.
//!
//! Records are emitted in a fixed order:
//!
//! ```text
//! t  elapsed
//! c  camera pose                       (if captured)
//! d  one per point                     (if the cloud changed)
//! p  plane pose, then its b vertices   (per updated plane)
//! pd plane id                          (per removed plane)
//! ```
//!
//! Encoding is a pure function of the snapshot.

use std::io::Write;

use crate::protocol::LineRecord;
use crate::snapshot::FrameSnapshot;
use crate::types::Pose;

/// Encode a snapshot into its ordered records.
pub fn encode_snapshot(snapshot: &FrameSnapshot) -> Vec<LineRecord> {
    let mut records = Vec::with_capacity(estimated_len(snapshot));
    records.push(LineRecord::Time(snapshot.elapsed));

    if let Some(pose) = snapshot.pose {
        records.push(LineRecord::Camera(pose));
    }

    if let Some(points) = &snapshot.points {
        records.extend(points.iter().copied().map(LineRecord::Point));
    }

    if let Some(planes) = &snapshot.planes {
        for plane in &planes.updated {
            records.push(LineRecord::Plane {
                id: plane.id.clone(),
                pose: plane.pose,
            });
            records.extend(plane.boundary.iter().copied().map(LineRecord::Boundary));
        }
        records.extend(planes.removed.iter().cloned().map(LineRecord::PlaneRemoved));
    }

    records
}

/// Encode a snapshot into text lines without terminators.
pub fn encode_lines(snapshot: &FrameSnapshot) -> Vec<String> {
    encode_snapshot(snapshot)
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Write a snapshot as newline-terminated lines.
pub fn write_snapshot<W: Write>(writer: &mut W, snapshot: &FrameSnapshot) -> std::io::Result<()> {
    for record in encode_snapshot(snapshot) {
        writeln!(writer, "{}", record)?;
    }
    Ok(())
}

/// The single `c` line carried by the live pose feed.
pub fn pose_line(pose: &Pose) -> String {
    LineRecord::Camera(*pose).to_string()
}

fn estimated_len(snapshot: &FrameSnapshot) -> usize {
    let points = snapshot.points.as_ref().map_or(0, Vec::len);
    let planes = snapshot.planes.as_ref().map_or(0, |changes| {
        changes
            .updated
            .iter()
            .map(|plane| 1 + plane.boundary.len())
            .sum::<usize>()
            + changes.removed.len()
    });
    2 + points + planes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::PlaneChangeSet;
    use crate::types::{Plane, PointCloudPoint, Quat, TrackableId, Vec2, Vec3};

    fn full_snapshot() -> FrameSnapshot {
        let plane = Plane::new(
            TrackableId::new("P1").unwrap(),
            Pose::new(Vec3::new(0.5, -1.0, 2.0), Quat::new(0.0, 0.7071, 0.0, 0.7071)),
            vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0)],
        );
        FrameSnapshot {
            elapsed: 1.25,
            pose: Some(Pose::identity()),
            points: Some(vec![
                PointCloudPoint::new(3, Vec3::new(0.1, 0.2, 0.3), Some(0.75)),
                PointCloudPoint::new(4, Vec3::new(-0.1, 0.0, 1.0), Some(1.0)),
            ]),
            planes: Some(PlaneChangeSet {
                updated: vec![plane],
                removed: vec![TrackableId::new("P0").unwrap()],
            }),
        }
    }

    #[test]
    fn test_fixed_line_order() {
        let lines = encode_lines(&full_snapshot());
        assert_eq!(
            lines,
            vec![
                "t 1.25",
                "c 0 0 0 0 0 0 1",
                "d 3 0.1 0.2 0.3 0.75",
                "d 4 -0.1 0 1 1",
                "p P1 0.5 -1 2 0 0.7071 0 0.7071",
                "b 0 0",
                "b 1 0",
                "b 1 1",
                "pd P0",
            ]
        );
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let snapshot = full_snapshot();
        let mut first = Vec::new();
        let mut second = Vec::new();
        write_snapshot(&mut first, &snapshot).unwrap();
        write_snapshot(&mut second, &snapshot.clone()).unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with(b"pd P0\n"));
    }

    #[test]
    fn test_time_only_snapshot() {
        let lines = encode_lines(&FrameSnapshot::new(0.033));
        assert_eq!(lines, vec!["t 0.033"]);
    }

    #[test]
    fn test_pose_line() {
        let pose = Pose::new(Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY);
        assert_eq!(pose_line(&pose), "c 1 2 3 0 0 0 1");
    }
}
