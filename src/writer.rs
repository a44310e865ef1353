// BayEOS Client - Durable frame queue and forwarder for edge telemetry
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Queue writer
//!
//! [`QueueWriter`] encodes frames into records and appends them to an
//! append-only active file, rotating by size or age. It exclusively owns the
//! single active file of its directory; the paired
//! [`QueueSender`](crate::QueueSender) only ever touches ready and backup
//! files, so the active-to-ready rename is the only coordination between
//! them.

use crate::error::{Result, StorageError};
use crate::frame::{now_epoch, Frame};
use crate::queue::{self, QueueState, Record, RECORD_HEADER_SIZE};
use log::{debug, error, info};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Writes frames to rotated queue files in one directory
pub struct QueueWriter {
    dir: PathBuf,
    max_chunk: u64,
    max_age: Duration,
    file: File,
    current_path: PathBuf,
    opened_at: Instant,
    written: u64,
    value_type: u8,
}

impl QueueWriter {
    /// Open a writer on a queue directory
    ///
    /// Creates the directory if needed (there is no durable store to fall
    /// back to, so this failure is fatal), promotes any active file left by
    /// a prior run to ready, and opens a fresh active file.
    pub fn new(dir: impl Into<PathBuf>, max_chunk: u64, max_age: Duration) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StorageError::CreateDir {
            path: dir.display().to_string(),
            source,
        })?;

        // Startup recovery: a leftover active file is complete up to its
        // last whole record (the writer never truncates), so it is simply
        // promoted to ready.
        for stale in queue::list_state_files(&dir, QueueState::Active)? {
            match queue::change_state(&stale, QueueState::Ready) {
                Ok(_) => info!("Recovered stale active file {}", stale.display()),
                Err(err) => error!("{}", err),
            }
        }

        let (file, current_path) = Self::open_active(&dir)?;
        Ok(Self {
            dir,
            max_chunk,
            max_age,
            file,
            current_path,
            opened_at: Instant::now(),
            written: 0,
            value_type: crate::value::DEFAULT_VALUE_TYPE,
        })
    }

    /// Override the default value type used by [`save`](Self::save)
    pub fn with_value_type(mut self, value_type: u8) -> Self {
        self.value_type = value_type;
        self
    }

    /// Path of the current active file
    pub fn active_path(&self) -> &Path {
        &self.current_path
    }

    fn open_active(dir: &Path) -> Result<(File, PathBuf)> {
        let mut epoch = now_epoch();
        loop {
            let path = dir.join(queue::file_stem(epoch)).with_extension("act");
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((file, path)),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    // two rotations within the same microsecond
                    epoch += 0.000_001;
                }
                Err(source) => {
                    return Err(StorageError::Io {
                        path: path.display().to_string(),
                        source,
                    }
                    .into())
                }
            }
        }
    }

    /// Append already-encoded frame bytes as one record
    ///
    /// Rotates first when the record would push the file over `max_chunk`
    /// bytes or the active file is older than `max_age`. `timestamp` of
    /// `None` means now.
    pub fn push_bytes(&mut self, frame: Vec<u8>, timestamp: Option<f64>) -> Result<()> {
        let timestamp = timestamp.unwrap_or_else(now_epoch);
        let record = Record { timestamp, frame };
        let bytes = record.to_bytes()?;

        if self.written + bytes.len() as u64 > self.max_chunk
            || self.opened_at.elapsed() > self.max_age
        {
            self.rotate()?;
        }

        self.file.write_all(&bytes).map_err(|source| StorageError::Io {
            path: self.current_path.display().to_string(),
            source,
        })?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Encode and append one frame
    pub fn push(&mut self, frame: &Frame, timestamp: Option<f64>) -> Result<()> {
        self.push_bytes(frame.to_bytes()?, timestamp)
    }

    /// Save a data frame with the writer's default value type, optionally
    /// wrapped in an origin frame
    ///
    /// `values` accepts plain values, (channel, value) pairs or
    /// (label, value) pairs, like [`Frame::data`].
    pub fn save(
        &mut self,
        values: impl Into<crate::frame::DataValues>,
        offset: u8,
        timestamp: Option<f64>,
        origin: Option<&str>,
    ) -> Result<()> {
        self.save_typed(values, self.value_type, offset, timestamp, origin)
    }

    /// Save a data frame with an explicit value type byte
    pub fn save_typed(
        &mut self,
        values: impl Into<crate::frame::DataValues>,
        value_type: u8,
        offset: u8,
        timestamp: Option<f64>,
        origin: Option<&str>,
    ) -> Result<()> {
        let data = Frame::data(values, value_type, offset)?;
        match origin {
            None => self.push(&data, timestamp),
            Some(origin) => self.push(&Frame::origin(origin, data), timestamp),
        }
    }

    /// Save a message or error message frame, optionally wrapped in an
    /// origin frame
    pub fn save_message(
        &mut self,
        message: &str,
        error: bool,
        timestamp: Option<f64>,
        origin: Option<&str>,
    ) -> Result<()> {
        let frame = if error {
            Frame::error_message(message)
        } else {
            Frame::message(message)
        };
        match origin {
            None => self.push(&frame, timestamp),
            Some(origin) => self.push(&Frame::origin(origin, frame), timestamp),
        }
    }

    /// Force rotation regardless of thresholds, recording an informational
    /// message first
    ///
    /// Used to guarantee prompt delivery at logical checkpoints.
    pub fn flush(&mut self) -> Result<()> {
        self.save_message("Flushed writer.", false, None, None)?;
        self.rotate()
    }

    /// Close the active file, promote it to ready and start a new one
    fn rotate(&mut self) -> Result<()> {
        let (file, path) = Self::open_active(&self.dir)?;
        let old_path = std::mem::replace(&mut self.current_path, path);
        self.file = file; // drops (closes) the old handle

        if let Err(err) = queue::change_state(&old_path, QueueState::Ready) {
            // the file stays active and will be recovered on next startup
            error!("{}", err);
        } else {
            debug!(
                "Rotated {} after {} bytes",
                old_path.display(),
                self.written
            );
        }
        self.written = 0;
        self.opened_at = Instant::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::RecordReader;
    use tempfile::tempdir;

    fn ready_files(dir: &Path) -> Vec<PathBuf> {
        queue::list_state_files(dir, QueueState::Ready).unwrap()
    }

    #[test]
    fn test_writer_creates_active_file() {
        let dir = tempdir().unwrap();
        let writer = QueueWriter::new(dir.path(), 2500, Duration::from_secs(60)).unwrap();
        assert!(writer.active_path().exists());
        assert_eq!(writer.active_path().extension().unwrap(), "act");
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempdir().unwrap();
        let mut writer = QueueWriter::new(dir.path(), 2500, Duration::from_secs(60)).unwrap();
        writer.save(vec![1.0, 2.0, 3.0], 0, Some(1234.5), None).unwrap();
        writer.flush().unwrap();

        let files = ready_files(dir.path());
        assert_eq!(files.len(), 1);
        let reader = RecordReader::new(std::fs::File::open(&files[0]).unwrap());
        let records: Vec<_> = reader.collect();
        assert_eq!(records.len(), 2); // data record + flush message
        assert_eq!(records[0].timestamp, 1234.5);
        assert_eq!(records[0].frame[0], 0x1);
        assert_eq!(records[1].frame[0], 0x4);
    }

    #[test]
    fn test_size_rotation_never_splits_a_record() {
        let dir = tempdir().unwrap();
        // each record: 10-byte header + 12-byte frame (tag, vt, 2x(1+4))
        let mut writer = QueueWriter::new(dir.path(), 50, Duration::from_secs(60)).unwrap();
        writer.save(vec![1.0, 2.0], 0, None, None).unwrap(); // 22
        writer.save(vec![1.0, 2.0], 0, None, None).unwrap(); // 44
        assert!(ready_files(dir.path()).is_empty());
        writer.save(vec![1.0, 2.0], 0, None, None).unwrap(); // would be 66: rotate

        let files = ready_files(dir.path());
        assert_eq!(files.len(), 1);
        let records: Vec<_> =
            RecordReader::new(std::fs::File::open(&files[0]).unwrap()).collect();
        assert_eq!(records.len(), 2);
        for record in records {
            assert!(Frame::from_bytes(&record.frame).is_ok());
        }
    }

    #[test]
    fn test_age_rotation() {
        let dir = tempdir().unwrap();
        let mut writer = QueueWriter::new(dir.path(), 1_000_000, Duration::from_millis(30)).unwrap();
        writer.save(vec![1.0], 0, None, None).unwrap();
        std::thread::sleep(Duration::from_millis(60));
        // first append after max_age triggers rotation even though the size
        // threshold is far away
        writer.save(vec![2.0], 0, None, None).unwrap();
        assert_eq!(ready_files(dir.path()).len(), 1);
    }

    #[test]
    fn test_startup_recovery_promotes_active() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("0000000001-000000.act"), b"").unwrap();

        let _writer = QueueWriter::new(dir.path(), 2500, Duration::from_secs(60)).unwrap();
        assert!(dir.path().join("0000000001-000000.rd").exists());
        assert!(!dir.path().join("0000000001-000000.act").exists());
    }

    #[test]
    fn test_save_with_origin_wraps_frame() {
        let dir = tempdir().unwrap();
        let mut writer = QueueWriter::new(dir.path(), 2500, Duration::from_secs(60)).unwrap();
        writer
            .save(vec![21.5], 0, None, Some("Rust-Writer-Example"))
            .unwrap();
        writer.flush().unwrap();

        let files = ready_files(dir.path());
        let records: Vec<_> =
            RecordReader::new(std::fs::File::open(&files[0]).unwrap()).collect();
        let record = Frame::parse(&records[0].frame, crate::frame::ParseContext::at(0.0)).unwrap();
        assert_eq!(record.origin, "Rust-Writer-Example");
    }

    #[test]
    fn test_consecutive_rotations_get_distinct_names() {
        let dir = tempdir().unwrap();
        let mut writer = QueueWriter::new(dir.path(), 2500, Duration::from_secs(60)).unwrap();
        writer.flush().unwrap();
        writer.flush().unwrap();
        writer.flush().unwrap();
        assert_eq!(ready_files(dir.path()).len(), 3);
    }
}
