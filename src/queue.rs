//! Queue file layer shared by writer and sender
//!
//! A queue file is an ordered, append-only sequence of records:
//!
//! ```text
//! [timestamp: f64 LE] [length: i16 LE] [frame: length bytes]
//! ```
//!
//! No file header, no footer, no delimiter beyond the fixed-size length
//! prefix. Lifecycle states are carried in the file extension and crossed
//! only by atomic renames, which makes the rename the sole synchronization
//! primitive between the single writer and the single sender sharing a
//! directory.

use crate::error::{EncodeError, StorageError};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Fixed per-record header size: 8-byte timestamp + 2-byte length
pub const RECORD_HEADER_SIZE: u64 = 10;

/// Largest frame storable in the signed 16-bit record length field
pub const MAX_FRAME_SIZE: usize = i16::MAX as usize;

/// Queue file lifecycle state, identified by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Currently appended to by exactly one writer
    Active,
    /// Closed and complete, eligible for sending
    Ready,
    /// Failed or retained after sending, or quarantined as corrupt
    Backup,
}

impl QueueState {
    /// File extension carrying this state
    pub fn extension(&self) -> &'static str {
        match self {
            QueueState::Active => "act",
            QueueState::Ready => "rd",
            QueueState::Backup => "bak",
        }
    }
}

/// One persisted (timestamp, frame) pair
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Float seconds since the Unix epoch
    pub timestamp: f64,
    /// Encoded frame bytes
    pub frame: Vec<u8>,
}

impl Record {
    /// Serialize the record (header + frame) for appending
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        if self.frame.len() > MAX_FRAME_SIZE {
            return Err(EncodeError::FrameTooLarge {
                size: self.frame.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let mut buf = Vec::with_capacity(RECORD_HEADER_SIZE as usize + self.frame.len());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&(self.frame.len() as i16).to_le_bytes());
        buf.extend_from_slice(&self.frame);
        Ok(buf)
    }
}

/// Sequential record iterator over a queue file
///
/// A truncated trailing record (partial header or short frame body) ends the
/// scan; records already yielded stay valid. A writer never truncates, so a
/// partial tail only occurs on foreign or corrupt files.
pub struct RecordReader<R: Read> {
    inner: R,
}

impl<R: Read> RecordReader<R> {
    /// Wrap a readable queue file
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    fn read_exact_opt(&mut self, buf: &mut [u8]) -> Option<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => return None,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => return None,
            }
        }
        Some(())
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        let mut header = [0u8; 8];
        self.read_exact_opt(&mut header)?;
        let timestamp = f64::from_le_bytes(header);

        let mut len_bytes = [0u8; 2];
        self.read_exact_opt(&mut len_bytes)?;
        let length = i16::from_le_bytes(len_bytes);
        if length < 0 {
            return None;
        }

        let mut frame = vec![0u8; length as usize];
        self.read_exact_opt(&mut frame)?;
        Some(Record { timestamp, frame })
    }
}

/// Build a queue file stem from float epoch seconds
///
/// The `<unix_seconds>-<microseconds>` parts are zero-padded so that
/// lexicographic directory listing order equals chronological order.
pub fn file_stem(epoch: f64) -> String {
    let seconds = epoch.trunc() as u64;
    let micros = ((epoch - epoch.trunc()) * 1_000_000.0).round() as u64;
    format!("{:010}-{:06}", seconds, micros.min(999_999))
}

/// List all files of one state in a directory, sorted by name
/// (chronological, since names derive from write-start timestamps)
pub fn list_state_files(dir: &Path, state: QueueState) -> Result<Vec<PathBuf>, StorageError> {
    let entries = fs::read_dir(dir).map_err(|source| StorageError::Io {
        path: dir.display().to_string(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext == state.extension())
                    .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Atomically move a queue file to another state, returning the new path
pub fn change_state(path: &Path, state: QueueState) -> Result<PathBuf, StorageError> {
    let target = path.with_extension(state.extension());
    fs::rename(path, &target).map_err(|source| StorageError::Rename {
        from: path.display().to_string(),
        to: target.display().to_string(),
        source,
    })?;
    Ok(target)
}
