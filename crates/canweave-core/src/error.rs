//! Error and violation types for the session engine.
//!
//! [`SendError`] rejects a misused API call. [`Violation`] reports a protocol
//! event observed on the bus; violations are notifications, not failures —
//! the state machine did not advance and keeps accepting input, and recovery
//! (typically [`Session::reset`](crate::Session::reset)) is the application's
//! decision.

use canweave_proto::WireError;
use thiserror::Error;

use crate::session::SessionState;

/// Rejection of a [`Session::send`](crate::Session::send) call.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// A transfer is already in progress; `reset` first to abort it.
    #[error("cannot send in state {state:?}: a transfer is in progress")]
    Busy {
        /// State at the time of the call
        state: SessionState,
    },
}

/// Protocol violations observed while processing inbound frames.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// Malformed or format-inconsistent frame.
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] WireError),

    /// Well-formed frame whose kind is not allowed in the current state.
    #[error("unexpected frame type in state {state:?}")]
    UnexpectedFrame {
        /// State when the frame arrived
        state: SessionState,
    },

    /// Declared transfer length exceeds the bound receive buffer.
    #[error("transfer of {declared} bytes exceeds the {capacity}-byte rx buffer")]
    TooLarge {
        /// Length the peer declared
        declared: usize,
        /// Receive buffer capacity
        capacity: usize,
    },

    /// Consecutive frame arrived with an index other than the expected one.
    #[error("consecutive frame out of order: expected {expected}, received {received}")]
    OutOfOrder {
        /// Index the tracker expected
        expected: u8,
        /// Index the frame carried
        received: u8,
    },

    /// Peer sent an overflow/abort flow-control frame.
    #[error("peer aborted the transfer")]
    PeerAbort,
}
