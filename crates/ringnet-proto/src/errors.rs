//! Decode errors.

use thiserror::Error;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Reasons a datagram could not be turned into a [`crate::Frame`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Datagram was empty.
    #[error("empty frame")]
    Empty,

    /// Datagram bytes were not valid UTF-8.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    /// Leading tag did not match any known frame kind.
    #[error("unknown frame tag in {0:?}")]
    UnknownTag(String),

    /// A required field was absent (input truncated or wrongly delimited).
    #[error("{kind} frame is missing its {field} field")]
    MissingField {
        /// Frame kind being decoded
        kind: &'static str,
        /// Name of the absent field
        field: &'static str,
    },

    /// More fields than the frame kind allows.
    #[error("{kind} frame has unexpected trailing fields")]
    TrailingFields {
        /// Frame kind being decoded
        kind: &'static str,
    },

    /// A numeric field did not parse.
    #[error("invalid {field} value {value:?}")]
    InvalidNumber {
        /// Name of the field
        field: &'static str,
        /// Raw text that failed to parse
        value: String,
    },

    /// An IP address did not parse.
    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    /// Unknown control code in a data frame.
    #[error("invalid control code {0:?}")]
    InvalidControl(String),

    /// A nickname was empty or contained a delimiter.
    #[error("invalid nickname {0:?}")]
    InvalidNickname(String),
}
