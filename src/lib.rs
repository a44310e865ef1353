//! # BayEOS Client
//!
//! A gateway client for edge telemetry: frames are encoded into a compact
//! recursive binary format, buffered in a disk-backed queue and forwarded to
//! a central BayEOS gateway over HTTP, surviving network and gateway
//! downtime without losing data.
//!
//! ## Key Properties
//!
//! - **Durable queue**: append-only files, rotated by size and age
//! - **Crash safety**: state transitions are atomic renames only
//! - **At-least-once delivery**: files are resolved only after a 2xx ack
//! - **Filesystem as IPC**: writer and sender share a directory, nothing else
//!
//! ## Quick Start
//!
//! ```rust
//! use bayeos_client::{QueueWriter, QueueSender, SenderConfig};
//! use std::time::Duration;
//!
//! # fn main() -> bayeos_client::Result<()> {
//! let dir = tempfile::tempdir().unwrap();
//!
//! // Writer side: encode measurements and append them to the queue
//! let mut writer = QueueWriter::new(dir.path(), 2500, Duration::from_secs(60))?;
//! writer.save(vec![20.5, 45.2], 0, None, Some("Rust-Writer-Example"))?;
//! writer.flush()?;
//!
//! // Sender side: forward ready queue files to the gateway
//! let sender = QueueSender::new(
//!     SenderConfig::new(dir.path(), "my-device", "http://gateway/frame/saveFlat")
//!         .credentials("import", "import"),
//! )?;
//! sender.send(); // one pass; run(interval) loops forever
//! # Ok(()) }
//! ```
//!
//! ## Modules
//!
//! - [`frame`]: recursive binary frame codec
//! - [`value`]: value type byte of data frames
//! - [`queue`]: queue file format and lifecycle states
//! - [`writer`]: append + rotate side of the queue
//! - [`sender`]: drain + post side of the queue
//! - [`config`]: configuration types
//! - [`client`]: per-device writer/sender orchestration

// Modules
pub mod client;
pub mod config;
pub mod error;
pub mod frame;
pub mod queue;
pub mod sender;
pub mod value;
pub mod writer;

// Re-exports for convenient access
pub use client::{DataSource, GatewayClient};
pub use config::{ClientConfig, SenderConfig};
pub use error::{DecodeError, EncodeError, Error, Result, StorageError, TransportError};
pub use frame::{
    DataValues, Frame, ParseContext, ParsedRecord, Payload, Route, EPOCH_2000_OFFSET,
};
pub use queue::{QueueState, Record, RecordReader};
pub use sender::QueueSender;
pub use value::{AddressingMode, ChannelKey, NumericEncoding, ValueType, DEFAULT_VALUE_TYPE};
pub use writer::QueueWriter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_basic_roundtrip() {
        let frame = Frame::data(vec![42.0], DEFAULT_VALUE_TYPE, 0).unwrap();
        let bytes = frame.to_bytes().unwrap();
        let record = Frame::parse(&bytes, ParseContext::at(0.0)).unwrap();
        assert_eq!(record.values().unwrap(), &[(ChannelKey::Index(1), 42.0)]);
    }
}
