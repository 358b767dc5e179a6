//! Wire-level error types.
//!
//! Every variant describes a reject observed while decoding a bus frame or
//! encoding one into a caller buffer. None of them are fatal to anything but
//! the frame at hand; the session layer surfaces them as protocol violations
//! and keeps running.

use thiserror::Error;

/// Convenience alias for codec results.
pub type Result<T> = std::result::Result<T, WireError>;

/// Errors produced while decoding or encoding ISO-TP frames.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// Frame is shorter than the header its kind requires.
    #[error("frame too short: need {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum byte count for this frame kind and format
        expected: usize,
        /// Bytes actually present
        actual: usize,
    },

    /// Unrecognized frame-type nibble (4..=15).
    #[error("unknown frame type nibble {0:#x}")]
    UnknownFrameType(u8),

    /// Unrecognized flow-control status nibble (3..=15).
    #[error("unknown flow control status {0:#x}")]
    UnknownFlowStatus(u8),

    /// FD length-escape form observed in a session format without escapes.
    #[error("length escape is only valid in CAN FD sessions")]
    EscapeNotAllowed,

    /// Single frame carries fewer data bytes than its declared length.
    #[error("truncated payload: {declared} bytes declared, {available} present")]
    TruncatedPayload {
        /// Length declared in the header
        declared: usize,
        /// Data bytes actually present after the header
        available: usize,
    },

    /// Length cannot be represented in this format's length field.
    #[error("length {len} exceeds the format maximum of {max}")]
    LengthOverflow {
        /// Requested length
        len: usize,
        /// Largest encodable length
        max: usize,
    },

    /// Output buffer cannot hold the encoded frame.
    #[error("output buffer too small: need {needed} bytes, got {available}")]
    BufferTooSmall {
        /// Bytes the encoded frame occupies
        needed: usize,
        /// Bytes available in the output buffer
        available: usize,
    },
}
