//! Notification surface of the session engine.
//!
//! The state machine reports everything it observes through one trait with
//! default no-op methods, so an application implements only what it cares
//! about and a `match` on [`Violation`] is compiler-checked exhaustive.
//!
//! Observers cannot re-enter the session (it is exclusively borrowed during
//! the call); the idiom is to record what happened and act — `reset`, `send`,
//! consume the received message — after the call returns.

use crate::Violation;

/// Receives notifications from a [`Session`](crate::Session).
///
/// Every method defaults to a no-op. The unit type `()` implements this
/// trait for callers that want no notifications at all.
pub trait SessionObserver<'buf> {
    /// A complete inbound message is ready.
    ///
    /// `message` is the reassembled payload in the receive buffer. The
    /// session stays in `Received` — refusing further inbound frames — until
    /// the application calls [`Session::reset`](crate::Session::reset), so
    /// the buffer can also be consumed later via
    /// [`Session::received`](crate::Session::received).
    fn on_message(&mut self, _message: &[u8]) {}

    /// Opportunistic look at the first payload slice of a new inbound
    /// message, before the rest arrives. Lets layered protocols reject a
    /// transfer early.
    fn on_first_segment(&mut self, _segment: &[u8]) {}

    /// An accepted consecutive frame appended `segment` to the receive
    /// buffer at `offset`.
    fn on_segment(&mut self, _segment: &[u8], _offset: usize) {}

    /// A frame was produced by
    /// [`Session::poll_transmit`](crate::Session::poll_transmit); `frame` is
    /// the final bytes, padding included.
    fn on_frame_emitted(&mut self, _frame: &[u8]) {}

    /// A protocol violation was observed while processing `frame`.
    ///
    /// The state machine has not advanced. Recovery — typically
    /// [`Session::reset`](crate::Session::reset) after
    /// [`Violation::PeerAbort`] — is the application's decision.
    fn on_violation(&mut self, _violation: Violation, _frame: &[u8]) {}

    /// A new inbound message declared `indicated_len` total bytes; return a
    /// replacement receive buffer to rebind before any byte is copied, or
    /// `None` to keep the current one.
    fn reassign_rx_buffer(&mut self, _indicated_len: usize) -> Option<&'buf mut [u8]> {
        None
    }
}

/// The indifferent observer.
impl SessionObserver<'_> for () {}
