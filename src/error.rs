//! Error types for the BayEOS gateway client
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for client operations
#[derive(Error, Debug)]
pub enum Error {
    /// Frame encoding error
    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    /// Frame decoding error
    #[error("Decoding error: {0}")]
    Decode(#[from] DecodeError),

    /// Queue storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Gateway transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid client setup (names, credentials)
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors during frame encoding
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    /// Low nibble of the value type is not a defined numeric encoding
    #[error("Undefined numeric encoding: 0x{0:x}")]
    UndefinedNumericEncoding(u8),

    /// High nibble of the value type is not a defined addressing mode
    #[error("Undefined addressing mode: 0x{0:x}")]
    UndefinedAddressingMode(u8),

    /// Channel label exceeds one length byte
    #[error("Channel label too long: {len} bytes exceeds maximum 255")]
    LabelTooLong { len: usize },

    /// Channel keys do not match the addressing mode
    #[error("Channel key mismatch: {0}")]
    KeyMismatch(String),

    /// Binary blob length not exactly representable in the f32 length field
    #[error("Binary blob too large: {size} bytes exceeds maximum {max}")]
    BlobTooLarge { size: usize, max: usize },

    /// Encoded frame exceeds the 16-bit record length field
    #[error("Frame too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },
}

/// Errors during frame decoding
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Leading type tag has no table entry
    #[error("Unknown frame type: 0x{0:02x}")]
    UnknownFrameType(u8),

    /// Body is shorter than the frame kind requires
    #[error("Truncated frame: need at least {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    /// Undefined numeric encoding in a data frame
    #[error("Undefined numeric encoding: 0x{0:x}")]
    UndefinedNumericEncoding(u8),

    /// Undefined addressing mode in a data frame
    #[error("Undefined addressing mode: 0x{0:x}")]
    UndefinedAddressingMode(u8),

    /// Empty input where a frame was expected
    #[error("Empty frame")]
    Empty,
}

/// Errors in the durable queue layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Queue directory could not be created
    #[error("Could not create directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },

    /// State-transition rename failed
    #[error("Could not rename {from} to {to}: {source}")]
    Rename {
        from: String,
        to: String,
        source: std::io::Error,
    },

    /// Generic file I/O failure
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Errors while posting to the gateway
#[derive(Error, Debug)]
pub enum TransportError {
    /// Gateway rejected the credentials (HTTP 401)
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Gateway URL is invalid (HTTP 404)
    #[error("URL {0} is invalid")]
    InvalidUrl(String),

    /// Any other HTTP status outside 2xx
    #[error("Post error: HTTP status {0}")]
    Http(u16),

    /// Connection-level failure (DNS, refused, timeout)
    #[error("Network error: {0}")]
    Network(String),
}
