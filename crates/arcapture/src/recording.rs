//! File sink for capture sessions.
//!
//! A [`RecordingSink`] owns one buffered log file. Closing flushes and
//! releases the handle; after that every write returns
//! [`CaptureError::SessionClosed`] and further closes are no-ops.

use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{CaptureError, Result};
use crate::protocol::LineRecord;
use crate::snapshot::FrameSnapshot;
use crate::types::CaptureMetadata;

/// Default log file name for a session started at `now`: `yyyyMMdd_HHmmssfff.txt`.
pub fn session_file_name(now: DateTime<Local>) -> String {
    format!("{}.txt", now.format("%Y%m%d_%H%M%S%3f"))
}

/// Summary of a closed recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingInfo {
    pub path: PathBuf,
    pub frames: u64,
    pub lines: u64,
}

/// Append-only log file bound to one capture session.
pub struct RecordingSink {
    writer: Option<BufWriter<Box<dyn Write + Send>>>,
    path: PathBuf,
    frames: u64,
    lines: u64,
}

impl RecordingSink {
    /// Create the log at `path`, failing if it already exists.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| CaptureError::unavailable(&path, e))?;

        log::info!("Recording session opened: {}", path.display());
        Ok(Self::from_writer(path, Box::new(file)))
    }

    /// Wrap an already open destination; `path` is only used for reporting.
    pub(crate) fn from_writer(path: PathBuf, writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Some(BufWriter::new(writer)),
            path,
            frames: 0,
            lines: 0,
        }
    }

    /// Create a new log under `dir` named after the current local time.
    ///
    /// A `_N` suffix is added when a file of that name already exists.
    pub fn create_in(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| CaptureError::unavailable(dir, e))?;

        let name = session_file_name(Local::now());
        let stem = name.trim_end_matches(".txt");
        let mut candidate = dir.join(&name);
        let mut suffix = 1;
        loop {
            match Self::create(&candidate) {
                Err(CaptureError::IoUnavailable { source, .. })
                    if source.kind() == ErrorKind::AlreadyExists =>
                {
                    candidate = dir.join(format!("{stem}_{suffix}.txt"));
                    suffix += 1;
                }
                other => return other,
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Number of frames written so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Write the session metadata line. Only valid before the first frame.
    pub fn write_metadata(&mut self, metadata: &CaptureMetadata) -> Result<()> {
        if self.lines > 0 {
            log::warn!(
                "Ignoring metadata for {}: lines already written",
                self.path.display()
            );
            return Ok(());
        }
        self.write_line(&LineRecord::Metadata(*metadata))
    }

    /// Encode and append one frame.
    ///
    /// The frame is written as one block and flushed, so a failure is
    /// reported by the call that produced it.
    pub fn write_frame(&mut self, snapshot: &FrameSnapshot) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(CaptureError::SessionClosed)?;
        let records = crate::protocol::encode_snapshot(snapshot);
        let mut block = String::new();
        for record in &records {
            // Writing into a String cannot fail
            let _ = writeln!(block, "{}", record);
        }
        writer
            .write_all(block.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| CaptureError::unavailable(&self.path, e))?;

        self.lines += records.len() as u64;
        self.frames += 1;
        log::trace!(
            "Frame {} written at t={} to {}",
            self.frames,
            snapshot.elapsed,
            self.path.display()
        );
        Ok(())
    }

    /// Append pre-encoded lines.
    pub fn write_lines<S: AsRef<str>>(&mut self, lines: &[S]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(CaptureError::SessionClosed)?;
        for line in lines {
            writeln!(writer, "{}", line.as_ref())
                .map_err(|e| CaptureError::unavailable(&self.path, e))?;
        }
        self.lines += lines.len() as u64;
        Ok(())
    }

    fn write_line(&mut self, record: &LineRecord) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(CaptureError::SessionClosed)?;
        writeln!(writer, "{}", record).map_err(|e| CaptureError::unavailable(&self.path, e))?;
        self.lines += 1;
        Ok(())
    }

    /// Flush and release the file. Returns `None` if already closed.
    pub fn close(&mut self) -> Result<Option<RecordingInfo>> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(None);
        };
        writer
            .flush()
            .map_err(|e| CaptureError::unavailable(&self.path, e))?;

        log::info!(
            "Recording session closed: {} frames, {} lines -> {}",
            self.frames,
            self.lines,
            self.path.display()
        );

        Ok(Some(RecordingInfo {
            path: self.path.clone(),
            frames: self.frames,
            lines: self.lines,
        }))
    }
}

impl Drop for RecordingSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Failed to close recording {}: {}", self.path.display(), e);
        }
    }
}
