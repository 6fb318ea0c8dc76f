//! Error types for decoding and persistence in medlink-types.

use core::fmt;

use thiserror::Error;

use crate::sfloat::SfloatSpecial;

/// What went wrong while decoding a characteristic payload.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new kinds
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeErrorKind {
    /// The payload was empty.
    Empty,
    /// The payload ended before a field that the flags declare present.
    Truncated {
        /// Name of the field being read.
        field: &'static str,
        /// Bytes needed for that field.
        needed: usize,
        /// Bytes left in the payload.
        remaining: usize,
    },
    /// A date/time field holds an impossible calendar value.
    InvalidTimestamp,
    /// An SFLOAT field carried one of the reserved special codes.
    ///
    /// Meters use these to signal "Hi"/"Lo" or a failed measurement.
    OutOfRange {
        /// Name of the field being read.
        field: &'static str,
        /// The special code that was received.
        special: SfloatSpecial,
    },
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty payload"),
            Self::Truncated {
                field,
                needed,
                remaining,
            } => write!(
                f,
                "payload truncated at '{}': needed {} bytes, {} remaining",
                field, needed, remaining
            ),
            Self::InvalidTimestamp => write!(f, "invalid timestamp"),
            Self::OutOfRange { field, special } => {
                write!(f, "'{}' is out of measurable range ({})", field, special)
            }
        }
    }
}

/// A payload that could not be decoded.
///
/// Carries the raw bytes so the failure can be diagnosed later.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decode error: {kind} (raw: {})", hex(&self.raw))]
pub struct DecodeError {
    /// Why decoding failed.
    pub kind: DecodeErrorKind,
    /// The undecodable payload.
    pub raw: Vec<u8>,
}

impl DecodeError {
    /// Create a decode error for the given payload.
    pub fn new(kind: DecodeErrorKind, raw: &[u8]) -> Self {
        Self {
            kind,
            raw: raw.to_vec(),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Errors raised by a [`KeyValueStore`](crate::store::KeyValueStore) backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The backend failed to read or write.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Stored data could not be (de)serialized.
    #[error("stored value for '{key}' is malformed: {message}")]
    Malformed {
        /// Key holding the bad value.
        key: String,
        /// Parser message.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display_includes_raw_hex() {
        let err = DecodeError::new(
            DecodeErrorKind::Truncated {
                field: "diastolic",
                needed: 2,
                remaining: 1,
            },
            &[0x00, 0xB0, 0x04, 0x20],
        );
        let msg = err.to_string();
        assert!(msg.contains("diastolic"));
        assert!(msg.contains("00B00420"));
    }

    #[test]
    fn test_out_of_range_display() {
        let kind = DecodeErrorKind::OutOfRange {
            field: "concentration",
            special: SfloatSpecial::PositiveInfinity,
        };
        assert!(kind.to_string().contains("concentration"));
        assert!(kind.to_string().contains("+INFINITY"));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Backend("disk full".to_string());
        assert_eq!(err.to_string(), "storage backend error: disk full");
    }
}
