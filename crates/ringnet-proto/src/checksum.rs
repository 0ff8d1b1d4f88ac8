//! Payload checksum.
//!
//! CRC-32 with the IEEE polynomial (`CRC_32_ISO_HDLC`), bit-compatible with
//! `zlib.crc32`. The checksum always covers the UTF-8 bytes of the payload
//! text exactly as it appears on the wire.

use crc::{CRC_32_ISO_HDLC, Crc};

/// Shared CRC-32 instance.
pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Compute the checksum of a payload.
pub fn crc32(payload: &str) -> u32 {
    CRC32.checksum(payload.as_bytes())
}

/// Check a payload against the checksum it was sent with.
pub fn verify(payload: &str, expected: u32) -> bool {
    crc32(payload) == expected
}
