//! Wire format for the ringnet protocol.
//!
//! Every frame is a single line of UTF-8 text carried in one UDP datagram.
//! The leading tag selects the frame kind and the remaining fields use a
//! fixed delimiter scheme:
//!
//! ```text
//! 9000                                            legacy token
//! 9000:<sequence>:<timestamp>:<origin>            token
//! 7777:<control>;<origin>;<destination>;<crc32>;<payload>
//! DISCOVER:<nickname>:<ip>:<port>
//! UPDATE:<nickname>:<ip>:<port>
//! ```
//!
//! Decoding is total: malformed input is reported as a [`DecodeError`] and
//! never panics, so a node can log and drop garbage without tearing down its
//! receive loop.
//!
//! # Integrity
//!
//! Data payloads carry a CRC32 (IEEE polynomial, the same value zlib
//! produces). See [`checksum`].
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod checksum;
pub mod errors;
pub mod frame;

pub use checksum::crc32;
pub use errors::{DecodeError, Result};
pub use frame::{
    Announcement, BROADCAST_NICKNAME, Control, DataFrame, FORCED_ERROR_MARKER, Frame, FrameKind,
    MAX_DATAGRAM_SIZE, TokenFrame, validate_nickname,
};
