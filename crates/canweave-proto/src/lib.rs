//! Wire codec for the canweave ISO-TP transport engine.
//!
//! ISO-TP (ISO 15765-2 for CAN / CAN FD, ISO 17987-2 for LIN) packs one of
//! four frame kinds into each bus frame, identified by the upper nibble of
//! byte 0. This crate converts between raw bus bytes and those frame kinds
//! under the three format variants, and models the one-byte separation-time
//! encoding carried by flow-control frames.
//!
//! The codec is pure and stateless: it never touches session state, never
//! allocates, and borrows payloads straight out of the input. Session
//! semantics (state transitions, flow-control accounting, buffers) live in
//! `canweave-core`.

mod error;
mod frame;
mod separation;

pub use error::{Result, WireError};
pub use frame::{FlowStatus, Frame, FrameFormat, FrameType};
pub use separation::SeparationTime;
