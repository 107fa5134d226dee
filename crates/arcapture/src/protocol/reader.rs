//! Sequential log reading.
//!
//! [`LogReader`] yields typed records line by line. [`FrameDecoder`] regroups
//! them into the frames they were encoded from, so a recording can be turned
//! back into [`FrameSnapshot`]s.

use std::io::BufRead;

use crate::error::{CaptureError, Result};
use crate::protocol::LineRecord;
use crate::snapshot::FrameSnapshot;
use crate::tracker::PlaneChangeSet;
use crate::types::{CaptureMetadata, Plane, Pose, TrackableId};

/// Iterator over the records of a log, skipping blank lines.
pub struct LogReader<R> {
    inner: R,
    line_no: usize,
    buffer: String,
}

impl<R: BufRead> LogReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line_no: 0,
            buffer: String::new(),
        }
    }

    /// Line number of the most recently returned record.
    pub fn line_no(&self) -> usize {
        self.line_no
    }
}

impl<R: BufRead> Iterator for LogReader<R> {
    type Item = Result<(usize, LineRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buffer.clear();
            match self.inner.read_line(&mut self.buffer) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line_no += 1;
                    if self.buffer.trim().is_empty() {
                        continue;
                    }
                    return Some(
                        LineRecord::parse(&self.buffer, self.line_no)
                            .map(|record| (self.line_no, record)),
                    );
                }
                Err(e) => return Some(Err(CaptureError::Io(e))),
            }
        }
    }
}

/// A legacy single-point anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub id: TrackableId,
    pub pose: Pose,
}

/// One tick reconstructed from the log.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Snapshot as encoded; empty point or plane sections decode as `None`
    pub snapshot: FrameSnapshot,
    pub anchors: Vec<Anchor>,
}

impl DecodedFrame {
    fn new(elapsed: f64) -> Self {
        Self {
            snapshot: FrameSnapshot::new(elapsed),
            anchors: Vec::new(),
        }
    }

    fn planes_mut(&mut self) -> &mut PlaneChangeSet {
        self.snapshot.planes.get_or_insert_with(PlaneChangeSet::default)
    }
}

/// Regroups records into frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    metadata: Option<CaptureMetadata>,
    current: Option<DecodedFrame>,
    /// Whether a `b` line may follow (last record was `p` or `b`)
    in_boundary: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&self) -> Option<&CaptureMetadata> {
        self.metadata.as_ref()
    }

    /// Feed one record; returns the previous frame once a new `t` starts.
    pub fn push(&mut self, line_no: usize, record: LineRecord) -> Result<Option<DecodedFrame>> {
        let continues_boundary = matches!(record, LineRecord::Plane { .. } | LineRecord::Boundary(_));

        let finished = match record {
            LineRecord::Metadata(meta) => {
                if self.metadata.is_some() || self.current.is_some() {
                    return Err(CaptureError::protocol(
                        line_no,
                        "metadata must appear once before the first frame",
                    ));
                }
                self.metadata = Some(meta);
                None
            }
            LineRecord::Time(elapsed) => {
                if !(elapsed.is_finite() && elapsed >= 0.0) {
                    return Err(CaptureError::protocol(
                        line_no,
                        format!("time {} is not a finite non-negative value", elapsed),
                    ));
                }
                if let Some(previous) = &self.current {
                    if elapsed <= previous.snapshot.elapsed {
                        return Err(CaptureError::protocol(
                            line_no,
                            format!(
                                "time {} does not advance past {}",
                                elapsed, previous.snapshot.elapsed
                            ),
                        ));
                    }
                }
                self.current.replace(DecodedFrame::new(elapsed))
            }
            LineRecord::Camera(pose) => {
                self.frame(line_no)?.snapshot.pose = Some(pose);
                None
            }
            LineRecord::Anchor { id, pose } => {
                self.frame(line_no)?.anchors.push(Anchor { id, pose });
                None
            }
            LineRecord::Point(point) => {
                self.frame(line_no)?
                    .snapshot
                    .points
                    .get_or_insert_with(Vec::new)
                    .push(point);
                None
            }
            LineRecord::Plane { id, pose } => {
                self.frame(line_no)?
                    .planes_mut()
                    .updated
                    .push(Plane::new(id, pose, Vec::new()));
                None
            }
            LineRecord::Boundary(vertex) => {
                if !self.in_boundary {
                    return Err(CaptureError::protocol(
                        line_no,
                        "boundary vertex without a preceding plane",
                    ));
                }
                if let Some(plane) = self.frame(line_no)?.planes_mut().updated.last_mut() {
                    plane.boundary.push(vertex);
                }
                None
            }
            LineRecord::PlaneRemoved(id) => {
                self.frame(line_no)?.planes_mut().removed.push(id);
                None
            }
        };

        self.in_boundary = continues_boundary;
        Ok(finished)
    }

    /// Flush the last frame at end of input.
    pub fn finish(&mut self) -> Option<DecodedFrame> {
        self.in_boundary = false;
        self.current.take()
    }

    fn frame(&mut self, line_no: usize) -> Result<&mut DecodedFrame> {
        self.current
            .as_mut()
            .ok_or_else(|| CaptureError::protocol(line_no, "record before the first time line"))
    }
}

/// A fully decoded log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedLog {
    pub metadata: Option<CaptureMetadata>,
    pub frames: Vec<DecodedFrame>,
}

/// Read and decode a whole log.
pub fn decode_log<R: BufRead>(input: R) -> Result<DecodedLog> {
    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();

    for item in LogReader::new(input) {
        let (line_no, record) = item?;
        if let Some(frame) = decoder.push(line_no, record)? {
            frames.push(frame);
        }
    }
    frames.extend(decoder.finish());

    Ok(DecodedLog {
        metadata: decoder.metadata().copied(),
        frames,
    })
}
