//! Value type byte for data frames
//!
//! A data frame carries one value-type byte split into two nibbles: the high
//! nibble selects how channels are addressed, the low nibble selects the
//! numeric wire encoding of each value. All multi-byte values are
//! little-endian.

use crate::error::{DecodeError, EncodeError};

/// Default value type: channel-indexed float32
pub const DEFAULT_VALUE_TYPE: u8 = 0x21;

/// How channels are identified inside a data frame body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum AddressingMode {
    /// One offset byte, values fill channels offset+1, offset+2, ...
    ChannelOffset = 0x0,
    /// One explicit channel-index byte per value
    #[default]
    ChannelIndex = 0x2,
    /// One length-prefixed string label per value
    ChannelLabel = 0x6,
}

impl AddressingMode {
    /// Convert from the high nibble of a value type byte
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0x0 => Some(Self::ChannelOffset),
            0x2 => Some(Self::ChannelIndex),
            0x6 => Some(Self::ChannelLabel),
            _ => None,
        }
    }
}

/// Numeric wire encoding of a single value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum NumericEncoding {
    /// 32-bit IEEE float (4 bytes)
    #[default]
    Float32 = 0x1,
    /// 16-bit signed integer (2 bytes)
    Int16 = 0x2,
    /// 32-bit signed integer (4 bytes)
    Int32 = 0x3,
    /// 8-bit signed integer (1 byte)
    Int8 = 0x4,
    /// 64-bit signed integer (8 bytes)
    Int64 = 0x5,
}

impl NumericEncoding {
    /// Convert from the low nibble of a value type byte
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0x1 => Some(Self::Float32),
            0x2 => Some(Self::Int16),
            0x3 => Some(Self::Int32),
            0x4 => Some(Self::Int8),
            0x5 => Some(Self::Int64),
            _ => None,
        }
    }

    /// Encoded size of one value in bytes
    pub fn size(&self) -> usize {
        match self {
            Self::Float32 | Self::Int32 => 4,
            Self::Int16 => 2,
            Self::Int8 => 1,
            Self::Int64 => 8,
        }
    }

    /// Encode one value, appending to `buf`
    pub fn encode_value(&self, value: f64, buf: &mut Vec<u8>) {
        match self {
            Self::Float32 => buf.extend_from_slice(&(value as f32).to_le_bytes()),
            Self::Int16 => buf.extend_from_slice(&(value as i16).to_le_bytes()),
            Self::Int32 => buf.extend_from_slice(&(value as i32).to_le_bytes()),
            Self::Int8 => buf.push(value as i8 as u8),
            Self::Int64 => buf.extend_from_slice(&(value as i64).to_le_bytes()),
        }
    }

    /// Decode one value from the start of `data`
    pub fn decode_value(&self, data: &[u8]) -> Result<f64, DecodeError> {
        let size = self.size();
        if data.len() < size {
            return Err(DecodeError::Truncated {
                needed: size,
                available: data.len(),
            });
        }
        let value = match self {
            Self::Float32 => f32::from_le_bytes([data[0], data[1], data[2], data[3]]) as f64,
            Self::Int16 => i16::from_le_bytes([data[0], data[1]]) as f64,
            Self::Int32 => i32::from_le_bytes([data[0], data[1], data[2], data[3]]) as f64,
            Self::Int8 => data[0] as i8 as f64,
            Self::Int64 => i64::from_le_bytes([
                data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
            ]) as f64,
        };
        Ok(value)
    }
}

/// Parsed value type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValueType {
    /// Addressing mode (high nibble)
    pub addressing: AddressingMode,
    /// Numeric encoding (low nibble)
    pub encoding: NumericEncoding,
}

impl ValueType {
    /// Create a value type from its two nibbles
    pub fn new(addressing: AddressingMode, encoding: NumericEncoding) -> Self {
        Self {
            addressing,
            encoding,
        }
    }

    /// Combine the nibbles back into the wire byte
    pub fn to_byte(&self) -> u8 {
        ((self.addressing as u8) << 4) | (self.encoding as u8)
    }

    /// Split a wire byte, failing on undefined nibbles (encode side)
    pub fn from_byte(byte: u8) -> Result<Self, EncodeError> {
        let addressing = AddressingMode::from_nibble(byte >> 4)
            .ok_or(EncodeError::UndefinedAddressingMode(byte >> 4))?;
        let encoding = NumericEncoding::from_nibble(byte & 0x0f)
            .ok_or(EncodeError::UndefinedNumericEncoding(byte & 0x0f))?;
        Ok(Self {
            addressing,
            encoding,
        })
    }

    /// Split a wire byte, failing on undefined nibbles (decode side)
    pub fn parse_byte(byte: u8) -> Result<Self, DecodeError> {
        let addressing = AddressingMode::from_nibble(byte >> 4)
            .ok_or(DecodeError::UndefinedAddressingMode(byte >> 4))?;
        let encoding = NumericEncoding::from_nibble(byte & 0x0f)
            .ok_or(DecodeError::UndefinedNumericEncoding(byte & 0x0f))?;
        Ok(Self {
            addressing,
            encoding,
        })
    }
}

/// Channel key of one value in a data frame
///
/// Indexed and offset addressing use numeric keys, labeled addressing uses
/// the raw label bytes read back as the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    /// Numeric channel index
    Index(u8),
    /// String channel label
    Label(String),
}

impl From<u8> for ChannelKey {
    fn from(index: u8) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for ChannelKey {
    fn from(label: &str) -> Self {
        Self::Label(label.to_string())
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{}", i),
            Self::Label(l) => write!(f, "{}", l),
        }
    }
}
