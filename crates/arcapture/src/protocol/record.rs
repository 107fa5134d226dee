//! Typed form of a single log line.

use std::fmt;
use std::str::{FromStr, SplitWhitespace};

use crate::error::{CaptureError, Result};
use crate::types::{CaptureMetadata, PointCloudPoint, Pose, Quat, TrackableId, Vec2, Vec3};

/// One tagged record of the line protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum LineRecord {
    /// `m fov width height`
    Metadata(CaptureMetadata),
    /// `t elapsedSeconds`
    Time(f64),
    /// `c x y z qx qy qz qw`
    Camera(Pose),
    /// `r id x y z qx qy qz qw`, legacy single-point anchor
    Anchor { id: TrackableId, pose: Pose },
    /// `d id x y z [confidence]`
    Point(PointCloudPoint),
    /// `p id x y z qx qy qz qw`
    Plane { id: TrackableId, pose: Pose },
    /// `b x y`, boundary vertex of the preceding plane
    Boundary(Vec2),
    /// `pd id`
    PlaneRemoved(TrackableId),
}

impl LineRecord {
    pub fn tag(&self) -> &'static str {
        match self {
            LineRecord::Metadata(_) => "m",
            LineRecord::Time(_) => "t",
            LineRecord::Camera(_) => "c",
            LineRecord::Anchor { .. } => "r",
            LineRecord::Point(_) => "d",
            LineRecord::Plane { .. } => "p",
            LineRecord::Boundary(_) => "b",
            LineRecord::PlaneRemoved(_) => "pd",
        }
    }

    /// Parse one line; `line_no` is only used for error reporting.
    pub fn parse(line: &str, line_no: usize) -> Result<Self> {
        let mut fields = Fields {
            inner: line.split_whitespace(),
            line_no,
        };
        let tag = fields
            .inner
            .next()
            .ok_or_else(|| CaptureError::protocol(line_no, "empty line"))?;

        let record = match tag {
            "m" => LineRecord::Metadata(CaptureMetadata {
                fov: fields.number("fov")?,
                width: fields.number("width")?,
                height: fields.number("height")?,
            }),
            "t" => LineRecord::Time(fields.number("elapsed")?),
            "c" => LineRecord::Camera(fields.pose()?),
            "r" => LineRecord::Anchor {
                id: fields.id()?,
                pose: fields.pose()?,
            },
            "d" => {
                let id = fields.number("point id")?;
                let position = fields.vec3()?;
                let confidence = fields.optional_number("confidence")?;
                LineRecord::Point(PointCloudPoint::new(id, position, confidence))
            }
            "p" => LineRecord::Plane {
                id: fields.id()?,
                pose: fields.pose()?,
            },
            "b" => LineRecord::Boundary(Vec2::new(fields.number("x")?, fields.number("y")?)),
            "pd" => LineRecord::PlaneRemoved(fields.id()?),
            other => {
                return Err(CaptureError::protocol(
                    line_no,
                    format!("unknown tag {other:?}"),
                ))
            }
        };

        fields.finish()?;
        Ok(record)
    }
}

struct Fields<'a> {
    inner: SplitWhitespace<'a>,
    line_no: usize,
}

impl Fields<'_> {
    fn number<T: FromStr>(&mut self, name: &str) -> Result<T> {
        let raw = self
            .inner
            .next()
            .ok_or_else(|| CaptureError::protocol(self.line_no, format!("missing {name}")))?;
        self.convert(raw, name)
    }

    fn optional_number<T: FromStr>(&mut self, name: &str) -> Result<Option<T>> {
        self.inner
            .next()
            .map(|raw| self.convert(raw, name))
            .transpose()
    }

    fn convert<T: FromStr>(&self, raw: &str, name: &str) -> Result<T> {
        raw.parse().map_err(|_| {
            CaptureError::protocol(self.line_no, format!("invalid {name} {raw:?}"))
        })
    }

    fn id(&mut self) -> Result<TrackableId> {
        let raw = self
            .inner
            .next()
            .ok_or_else(|| CaptureError::protocol(self.line_no, "missing id"))?;
        TrackableId::new(raw).map_err(|e| CaptureError::protocol(self.line_no, e.to_string()))
    }

    fn vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3::new(
            self.number("x")?,
            self.number("y")?,
            self.number("z")?,
        ))
    }

    fn pose(&mut self) -> Result<Pose> {
        let position = self.vec3()?;
        let rotation = Quat::new(
            self.number("qx")?,
            self.number("qy")?,
            self.number("qz")?,
            self.number("qw")?,
        );
        Ok(Pose::new(position, rotation))
    }

    fn finish(mut self) -> Result<()> {
        match self.inner.next() {
            Some(extra) => Err(CaptureError::protocol(
                self.line_no,
                format!("unexpected trailing field {extra:?}"),
            )),
            None => Ok(()),
        }
    }
}

struct PoseFields<'a>(&'a Pose);

impl fmt::Display for PoseFields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Pose { position: p, rotation: q } = self.0;
        write!(f, "{} {} {} {} {} {} {}", p.x, p.y, p.z, q.x, q.y, q.z, q.w)
    }
}

// Rust's float Display is locale independent, uses '.' and never switches to
// exponent notation, which keeps lines parseable by any reader.
impl fmt::Display for LineRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineRecord::Metadata(m) => write!(f, "m {} {} {}", m.fov, m.width, m.height),
            LineRecord::Time(t) => write!(f, "t {}", t),
            LineRecord::Camera(pose) => write!(f, "c {}", PoseFields(pose)),
            LineRecord::Anchor { id, pose } => write!(f, "r {} {}", id, PoseFields(pose)),
            LineRecord::Point(point) => {
                let p = point.position;
                write!(f, "d {} {} {} {}", point.id, p.x, p.y, p.z)?;
                if let Some(confidence) = point.confidence {
                    write!(f, " {}", confidence)?;
                }
                Ok(())
            }
            LineRecord::Plane { id, pose } => write!(f, "p {} {}", id, PoseFields(pose)),
            LineRecord::Boundary(v) => write!(f, "b {} {}", v.x, v.y),
            LineRecord::PlaneRemoved(id) => write!(f, "pd {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<LineRecord> {
        LineRecord::parse(line, 1)
    }

    #[test]
    fn test_camera_line_format() {
        let record = LineRecord::Camera(Pose::identity());
        assert_eq!(record.to_string(), "c 0 0 0 0 0 0 1");
    }

    #[test]
    fn test_small_values_not_in_exponent_form() {
        let record = LineRecord::Boundary(Vec2::new(1.0e-7, -2500000.0));
        assert_eq!(record.to_string(), "b 0.0000001 -2500000");
    }

    #[test]
    fn test_point_confidence_optional() {
        let with = LineRecord::Point(PointCloudPoint::new(7, Vec3::new(1.5, 0.0, -2.0), Some(0.25)));
        assert_eq!(with.to_string(), "d 7 1.5 0 -2 0.25");
        let without = LineRecord::Point(PointCloudPoint::new(7, Vec3::new(1.5, 0.0, -2.0), None));
        assert_eq!(without.to_string(), "d 7 1.5 0 -2");

        assert_eq!(parse("d 7 1.5 0 -2 0.25").unwrap(), with);
        assert_eq!(parse("d 7 1.5 0 -2").unwrap(), without);
    }

    #[test]
    fn test_parse_every_tag() {
        assert!(matches!(parse("m 60 1920 1440").unwrap(), LineRecord::Metadata(_)));
        assert_eq!(parse("t 0.033").unwrap(), LineRecord::Time(0.033));
        assert!(matches!(parse("r A1 0 0 0 0 0 0 1").unwrap(), LineRecord::Anchor { .. }));
        assert!(matches!(parse("p P1 1 2 3 0 0 0 1").unwrap(), LineRecord::Plane { .. }));
        assert_eq!(parse("b 1 0").unwrap(), LineRecord::Boundary(Vec2::new(1.0, 0.0)));
        assert_eq!(
            parse("pd P1").unwrap(),
            LineRecord::PlaneRemoved(TrackableId::new("P1").unwrap())
        );
    }

    #[test]
    fn test_parse_tolerates_carriage_return() {
        assert_eq!(parse("t 1.5\r").unwrap(), LineRecord::Time(1.5));
    }

    #[test]
    fn test_parse_errors_carry_line_number() {
        let err = LineRecord::parse("c 0 0 0 0 0 zero 1", 12).unwrap_err();
        match err {
            CaptureError::Protocol { line, message } => {
                assert_eq!(line, 12);
                assert!(message.contains("qz"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert!(parse("x 1 2").is_err());
        assert!(parse("t").is_err());
        assert!(parse("t 1 2").is_err());
        assert!(parse("b 1").is_err());
        assert!(parse("d -1 0 0 0").is_err());
        assert!(parse("").is_err());
    }
}
