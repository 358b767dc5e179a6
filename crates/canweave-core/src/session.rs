//! ISO-TP session state machine.
//!
//! Manages one endpoint of a transfer: frame classification, reassembly into
//! a caller-owned receive buffer, segmentation out of a caller-owned
//! transmit buffer, and flow-control accounting in both directions. The
//! machine is pure sans-IO: inbound frames arrive through
//! [`Session::handle_frame`], outbound frames are pulled with
//! [`Session::poll_transmit`], and the caller sleeps for the returned
//! separation time between pulls.
//!
//! # State machine
//!
//! ```text
//!                 send()                    poll: Single fits
//!        ┌──────────────────> Transmitting ────────────────────┐
//!        │                      │      ↑ │                     │
//!        │      block exhausted │  FC  │ │ last frame sent     │
//!        │                      ↓ CTS  │ ↓                     ↓
//!      Idle                AwaitingFlowControl              Idle
//!        │
//!        │ First frame                 last Consecutive
//!        └──────────────> Receiving ───────────────────> Received
//!                            ↑ │                            │
//!                            └─┘ Consecutive                │ reset()
//!                                                           ↓
//!                                                         Idle
//! ```
//!
//! `Received` is deliberately sticky: the session ignores all bus traffic
//! until the application consumes the message and calls [`Session::reset`],
//! so the receive buffer is never mutated behind the application's back.

use canweave_proto::{FlowStatus, Frame, FrameFormat, FrameType, SeparationTime, WireError};
use tracing::{debug, trace, warn};

use crate::{SendError, SessionObserver, Violation};

/// Outbound padding byte used by default.
pub const DEFAULT_PADDING_BYTE: u8 = 0xFF;

/// Sequence index carried by the first consecutive frame of a transfer (the
/// First frame implicitly consumes index 0).
pub const DEFAULT_INDEX_FIRST: u8 = 1;

/// Lowest sequence index, reached on rollover.
pub const DEFAULT_INDEX_START: u8 = 0;

/// Highest sequence index before rollover.
pub const DEFAULT_INDEX_END: u8 = 15;

/// Frames the peer may send without flow control; also the "no flow control
/// required" sentinel for the in-flight budget.
const FC_UNLIMITED: u16 = u16::MAX;

/// ISO-TP frames are at least two bytes: a type byte plus one byte of
/// header or payload.
const MIN_FRAME_LEN: usize = 2;

/// Static per-session protocol configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bus framing variant.
    pub format: FrameFormat,

    /// Outbound padding byte; `None` disables padding and frames keep their
    /// logical length.
    pub padding: Option<u8>,

    /// Sequence index of the first consecutive frame in each transfer.
    pub index_first: u8,

    /// Sequence index the tracker rolls over to.
    pub index_start: u8,

    /// Sequence index the tracker rolls over at.
    pub index_end: u8,

    /// Block size announced in our flow-control frames: consecutive frames
    /// the peer may send before the next one. 0 means unlimited.
    pub block_size: u8,

    /// Separation time announced in our flow-control frames.
    pub separation: SeparationTime,
}

impl SessionConfig {
    /// Protocol defaults for the given format: padding with `0xFF`,
    /// indices 1/0/15, unlimited block size, no separation.
    #[must_use]
    pub fn new(format: FrameFormat) -> Self {
        Self {
            format,
            padding: Some(DEFAULT_PADDING_BYTE),
            index_first: DEFAULT_INDEX_FIRST,
            index_start: DEFAULT_INDEX_START,
            index_end: DEFAULT_INDEX_END,
            block_size: 0,
            separation: SeparationTime::NONE,
        }
    }
}

/// Externally observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transfer in progress.
    Idle,
    /// Outbound transfer with frames still owed.
    Transmitting,
    /// Outbound transfer parked until the peer's next flow-control frame.
    AwaitingFlowControl,
    /// Inbound multi-frame transfer in progress.
    Receiving,
    /// Complete inbound message waiting to be consumed.
    Received,
}

/// One produced outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transmit {
    /// Bytes written into the caller's frame buffer (padding included).
    pub len: usize,
    /// Minimum delay the caller must leave before the next
    /// [`Session::poll_transmit`].
    pub separation: SeparationTime,
}

/// Live accounting for the transfer in flight, either direction.
#[derive(Debug, Clone, Copy)]
struct Transfer {
    /// Declared length of the whole message.
    total_len: usize,
    /// Bytes produced or consumed so far.
    offset: usize,
    /// Sequence index of the next consecutive frame.
    next_index: u8,
    /// Frames until a flow-control exchange is required. 0 = required now,
    /// [`FC_UNLIMITED`] = never.
    fc_budget: u16,
    /// Separation between our outbound consecutive frames. Outbound
    /// transfers load this from the peer's flow control.
    separation: SeparationTime,
}

impl Transfer {
    fn new(config: &SessionConfig, total_len: usize) -> Self {
        Self {
            total_len,
            offset: 0,
            next_index: config.index_first,
            // A fresh transfer always owes (or awaits) one flow-control
            // exchange right after the First frame.
            fc_budget: 0,
            separation: config.separation,
        }
    }

    fn consume_fc_budget(&mut self) {
        if self.fc_budget > 0 && self.fc_budget != FC_UNLIMITED {
            self.fc_budget -= 1;
        }
    }

    fn advance_index(&mut self, config: &SessionConfig) {
        self.next_index = if self.next_index >= config.index_end {
            config.index_start
        } else {
            self.next_index + 1
        };
    }
}

#[derive(Debug, Clone, Copy)]
enum Activity {
    Idle,
    Transmitting(Transfer),
    AwaitingFlowControl(Transfer),
    Receiving(Transfer),
    Received { len: usize },
}

/// A single ISO-TP endpoint bound to caller-owned buffers.
///
/// The session borrows both buffers exclusively for its whole life, which
/// enforces the ownership rule of the protocol at compile time: the
/// application reads the receive buffer through [`Session::received`] (or
/// the observer) and never while a reception is in flight.
///
/// One session talks to one peer. Run one session per logical peer pair;
/// each is independent and single-threaded.
#[derive(Debug)]
pub struct Session<'buf> {
    config: SessionConfig,
    tx: &'buf mut [u8],
    rx: &'buf mut [u8],
    activity: Activity,
}

impl<'buf> Session<'buf> {
    /// Bind a session to its buffers. The session starts Idle.
    pub fn new(config: SessionConfig, tx: &'buf mut [u8], rx: &'buf mut [u8]) -> Self {
        Self { config, tx, rx, activity: Activity::Idle }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        match self.activity {
            Activity::Idle => SessionState::Idle,
            Activity::Transmitting(_) => SessionState::Transmitting,
            Activity::AwaitingFlowControl(_) => SessionState::AwaitingFlowControl,
            Activity::Receiving(_) => SessionState::Receiving,
            Activity::Received { .. } => SessionState::Received,
        }
    }

    /// The configuration this session was created with.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Bytes produced or consumed so far for the transfer in flight, or the
    /// message length once `Received`.
    #[must_use]
    pub fn progress(&self) -> usize {
        match self.activity {
            Activity::Idle => 0,
            Activity::Transmitting(t)
            | Activity::AwaitingFlowControl(t)
            | Activity::Receiving(t) => t.offset,
            Activity::Received { len } => len,
        }
    }

    /// The completed inbound message, while the session is `Received`.
    #[must_use]
    pub fn received(&self) -> Option<&[u8]> {
        match self.activity {
            Activity::Received { len } => Some(&self.rx[..len]),
            _ => None,
        }
    }

    /// Abort whatever is in flight and return to Idle. Configuration is
    /// retained; no bus-level notification is produced.
    pub fn reset(&mut self) {
        if !matches!(self.activity, Activity::Idle) {
            debug!(state = ?self.state(), "session reset");
        }
        self.activity = Activity::Idle;
    }

    /// Rebind the receive buffer.
    ///
    /// Only permitted while Idle or at the very start of a reception (no
    /// byte copied yet); returns whether the rebind happened.
    pub fn use_rx_buffer(&mut self, rx: &'buf mut [u8]) -> bool {
        let rebindable = match self.activity {
            Activity::Idle => true,
            Activity::Receiving(ref transfer) => transfer.offset == 0,
            _ => false,
        };
        if rebindable {
            self.rx = rx;
        }
        rebindable
    }

    /// Queue a payload for transmission.
    ///
    /// Copies up to the transmit buffer capacity (and the format's
    /// declarable maximum) into the session and returns the accepted byte
    /// count; the first frame is produced by the next
    /// [`Session::poll_transmit`]. Only valid while Idle — `reset` first to
    /// abandon a transfer in flight.
    pub fn send(&mut self, data: &[u8]) -> Result<usize, SendError> {
        if !matches!(self.activity, Activity::Idle) {
            return Err(SendError::Busy { state: self.state() });
        }
        if data.is_empty() {
            return Ok(0);
        }

        let accepted =
            data.len().min(self.tx.len()).min(self.config.format.max_transfer());
        self.tx[..accepted].copy_from_slice(&data[..accepted]);
        self.activity = Activity::Transmitting(Transfer::new(&self.config, accepted));
        debug!(len = accepted, "transfer queued");
        Ok(accepted)
    }

    /// Feed one inbound bus frame.
    ///
    /// Classifies the frame and dispatches on (state, kind). Everything the
    /// machine observes — accepted segments, completed messages, protocol
    /// violations — is reported through `observer`; nothing is returned
    /// because no outcome is fatal to the session.
    pub fn handle_frame<O: SessionObserver<'buf>>(&mut self, frame: &[u8], observer: &mut O) {
        if frame.len() < MIN_FRAME_LEN {
            warn!(len = frame.len(), "inbound frame below minimum length");
            let error = WireError::FrameTooShort { expected: MIN_FRAME_LEN, actual: frame.len() };
            observer.on_violation(Violation::InvalidFrame(error), frame);
            return;
        }

        // The application has not consumed the pending message yet; leave
        // the buffer untouched and let the peer's timers handle the stall.
        if matches!(self.activity, Activity::Received { .. }) {
            trace!("message pending consumption, frame ignored");
            return;
        }

        let decoded = match Frame::decode(self.config.format, frame) {
            Ok(decoded) => decoded,
            Err(error) => {
                warn!(%error, "malformed inbound frame");
                observer.on_violation(Violation::InvalidFrame(error), frame);
                return;
            },
        };

        trace!(state = ?self.state(), kind = ?frame_kind(&decoded), len = frame.len(), "inbound frame");
        match decoded {
            Frame::Single { data } => self.handle_single(data, frame, observer),
            Frame::First { total_len, data } => {
                self.handle_first(total_len, data, frame, observer);
            },
            Frame::Consecutive { index, data } => {
                self.handle_consecutive(index, data, frame, observer);
            },
            Frame::FlowControl { status, block_size, separation } => {
                self.handle_flow_control(status, block_size, separation, frame, observer);
            },
        }
    }

    /// Pull the next outbound frame, if one is owed.
    ///
    /// `out` must hold one bus frame; its length is the frame budget (8 for
    /// classic CAN/LIN, typically 64 for CAN FD). Returns how many bytes
    /// were written and the separation time to honor before the next pull,
    /// or `None` when the session has nothing to say right now.
    pub fn poll_transmit<O: SessionObserver<'buf>>(
        &mut self,
        out: &mut [u8],
        observer: &mut O,
    ) -> Option<Transmit> {
        let produced = match self.activity {
            Activity::Idle | Activity::Received { .. } | Activity::AwaitingFlowControl(_) => None,
            Activity::Transmitting(transfer) => self.transmit_next(transfer, out),
            Activity::Receiving(transfer) => self.emit_flow_control(transfer, out),
        }?;

        let len = match self.config.padding {
            Some(byte) if produced.len < out.len() => {
                out[produced.len..].fill(byte);
                out.len()
            },
            _ => produced.len,
        };

        observer.on_frame_emitted(&out[..len]);
        Some(Transmit { len, separation: produced.separation })
    }

    /// A Single frame supersedes whatever was in flight.
    fn handle_single<O: SessionObserver<'buf>>(
        &mut self,
        data: &[u8],
        raw: &[u8],
        observer: &mut O,
    ) {
        self.activity = Activity::Idle;

        let declared = data.len();
        self.offer_rx_reassign(declared, observer);
        if declared > self.rx.len() {
            warn!(declared, capacity = self.rx.len(), "inbound message exceeds rx buffer");
            observer
                .on_violation(Violation::TooLarge { declared, capacity: self.rx.len() }, raw);
            return;
        }

        self.rx[..declared].copy_from_slice(data);
        self.activity = Activity::Received { len: declared };
        debug!(len = declared, "single-frame message received");
        observer.on_first_segment(data);
        observer.on_message(&self.rx[..declared]);
    }

    /// A First frame supersedes whatever was in flight and opens a
    /// multi-frame reception.
    fn handle_first<O: SessionObserver<'buf>>(
        &mut self,
        total_len: usize,
        data: &[u8],
        raw: &[u8],
        observer: &mut O,
    ) {
        self.activity = Activity::Idle;

        self.offer_rx_reassign(total_len, observer);
        if total_len > self.rx.len() {
            warn!(declared = total_len, capacity = self.rx.len(), "inbound transfer exceeds rx buffer");
            observer.on_violation(
                Violation::TooLarge { declared: total_len, capacity: self.rx.len() },
                raw,
            );
            return;
        }

        // Padding past the declared length is not part of the message.
        let copied = data.len().min(total_len);
        self.rx[..copied].copy_from_slice(&data[..copied]);

        let mut transfer = Transfer::new(&self.config, total_len);
        transfer.offset = copied;
        transfer.consume_fc_budget();
        self.activity = Activity::Receiving(transfer);

        debug!(total_len, copied, "multi-frame reception started");
        observer.on_first_segment(&data[..copied]);
    }

    fn handle_consecutive<O: SessionObserver<'buf>>(
        &mut self,
        index: u8,
        data: &[u8],
        raw: &[u8],
        observer: &mut O,
    ) {
        let Activity::Receiving(mut transfer) = self.activity else {
            observer.on_violation(Violation::UnexpectedFrame { state: self.state() }, raw);
            return;
        };

        if index != transfer.next_index {
            warn!(expected = transfer.next_index, received = index, "consecutive frame out of order");
            observer.on_violation(
                Violation::OutOfOrder { expected: transfer.next_index, received: index },
                raw,
            );
            return;
        }

        transfer.advance_index(&self.config);
        transfer.consume_fc_budget();

        let copied = data.len().min(transfer.total_len - transfer.offset);
        let start = transfer.offset;
        self.rx[start..start + copied].copy_from_slice(&data[..copied]);
        transfer.offset += copied;

        observer.on_segment(&data[..copied], start);

        if transfer.offset >= transfer.total_len {
            self.activity = Activity::Received { len: transfer.total_len };
            debug!(len = transfer.total_len, "multi-frame message received");
            observer.on_message(&self.rx[..transfer.total_len]);
        } else {
            self.activity = Activity::Receiving(transfer);
        }
    }

    fn handle_flow_control<O: SessionObserver<'buf>>(
        &mut self,
        status: FlowStatus,
        block_size: u8,
        separation: SeparationTime,
        raw: &[u8],
        observer: &mut O,
    ) {
        let (Activity::Transmitting(mut transfer)
        | Activity::AwaitingFlowControl(mut transfer)) = self.activity
        else {
            observer.on_violation(Violation::UnexpectedFrame { state: self.state() }, raw);
            return;
        };

        if !self.config.format.uses_flow_control() {
            observer.on_violation(Violation::UnexpectedFrame { state: self.state() }, raw);
            return;
        }

        if matches!(status, FlowStatus::OverflowAbort) {
            warn!("peer aborted the transfer");
            observer.on_violation(Violation::PeerAbort, raw);
            return;
        }

        transfer.fc_budget =
            if block_size == 0 { FC_UNLIMITED } else { u16::from(block_size) };
        transfer.separation = separation;
        trace!(?status, block_size, separation_us = separation.micros(), "flow control applied");

        self.activity = match status {
            FlowStatus::Wait => Activity::AwaitingFlowControl(transfer),
            _ => Activity::Transmitting(transfer),
        };
    }

    /// Produce the next Single / First / Consecutive frame of an outbound
    /// transfer.
    fn transmit_next(&mut self, mut transfer: Transfer, out: &mut [u8]) -> Option<Transmit> {
        if transfer.offset == 0 {
            if transfer.total_len <= self.config.format.single_frame_capacity(out.len()) {
                let frame = Frame::Single { data: &self.tx[..transfer.total_len] };
                let len = self.encode_into(&frame, out)?;
                self.activity = Activity::Idle;
                debug!(len = transfer.total_len, "transfer sent as a single frame");
                return Some(Transmit { len, separation: SeparationTime::NONE });
            }

            let chunk = self.config.format.first_frame_capacity(out.len());
            let frame =
                Frame::First { total_len: transfer.total_len, data: &self.tx[..chunk] };
            let len = self.encode_into(&frame, out)?;
            transfer.offset = chunk;
            transfer.consume_fc_budget();
            self.activity = self.park_or_continue(transfer);
            debug!(total_len = transfer.total_len, "multi-frame transfer started");
            return Some(Transmit { len, separation: SeparationTime::NONE });
        }

        let remaining = transfer.total_len - transfer.offset;
        let chunk = self.config.format.consecutive_capacity(out.len()).min(remaining);
        let frame = Frame::Consecutive {
            index: transfer.next_index,
            data: &self.tx[transfer.offset..transfer.offset + chunk],
        };
        let len = self.encode_into(&frame, out)?;

        transfer.advance_index(&self.config);
        transfer.offset += chunk;
        transfer.consume_fc_budget();
        let separation = transfer.separation;

        if transfer.offset >= transfer.total_len {
            self.activity = Activity::Idle;
            debug!(len = transfer.total_len, "transfer complete");
        } else {
            self.activity = self.park_or_continue(transfer);
        }

        Some(Transmit { len, separation })
    }

    /// While receiving, the only frame we ever owe is a ContinueToSend flow
    /// control announcing our block size and separation time.
    fn emit_flow_control(&mut self, mut transfer: Transfer, out: &mut [u8]) -> Option<Transmit> {
        if !self.config.format.uses_flow_control() || transfer.fc_budget != 0 {
            return None;
        }

        let frame = Frame::FlowControl {
            status: FlowStatus::ContinueToSend,
            block_size: self.config.block_size,
            separation: self.config.separation,
        };
        let len = self.encode_into(&frame, out)?;

        // Re-arm for the next block.
        transfer.fc_budget = if self.config.block_size == 0 {
            FC_UNLIMITED
        } else {
            u16::from(self.config.block_size)
        };
        self.activity = Activity::Receiving(transfer);

        trace!(block_size = self.config.block_size, "flow control issued");
        Some(Transmit { len, separation: SeparationTime::NONE })
    }

    fn encode_into(&self, frame: &Frame<'_>, out: &mut [u8]) -> Option<usize> {
        match frame.encode(self.config.format, out) {
            Ok(len) => Some(len),
            Err(error) => {
                warn!(%error, budget = out.len(), "frame does not fit the provided budget");
                None
            },
        }
    }

    /// An exhausted flow-control budget parks the transfer until the peer's
    /// next flow control; LIN has no flow control and never parks.
    fn park_or_continue(&self, transfer: Transfer) -> Activity {
        if transfer.fc_budget == 0 && self.config.format.uses_flow_control() {
            trace!("block exhausted, awaiting flow control");
            Activity::AwaitingFlowControl(transfer)
        } else {
            Activity::Transmitting(transfer)
        }
    }

    fn offer_rx_reassign<O: SessionObserver<'buf>>(&mut self, indicated: usize, observer: &mut O) {
        if let Some(rx) = observer.reassign_rx_buffer(indicated) {
            debug!(indicated, capacity = rx.len(), "rx buffer reassigned");
            self.rx = rx;
        }
    }
}

fn frame_kind(frame: &Frame<'_>) -> FrameType {
    match frame {
        Frame::Single { .. } => FrameType::Single,
        Frame::First { .. } => FrameType::First,
        Frame::Consecutive { .. } => FrameType::Consecutive,
        Frame::FlowControl { .. } => FrameType::FlowControl,
    }
}
