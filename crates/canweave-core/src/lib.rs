//! Sans-IO ISO-TP session engine.
//!
//! A [`Session`] is one endpoint of a bidirectional ISO-TP conversation: it
//! reassembles inbound frames into a caller-owned receive buffer and
//! segments a caller-owned transmit buffer into outbound frames, running the
//! flow-control feedback loop in both directions. It performs no I/O and
//! never sleeps — the caller feeds frames with [`Session::handle_frame`],
//! drains frames with [`Session::poll_transmit`], and honors the returned
//! separation times with its own scheduler.
//!
//! # Example
//!
//! ```
//! use canweave_core::{Session, SessionConfig};
//! use canweave_proto::FrameFormat;
//!
//! let mut tx = [0u8; 64];
//! let mut rx = [0u8; 64];
//! let mut session = Session::new(SessionConfig::new(FrameFormat::Classic), &mut tx, &mut rx);
//!
//! let mut frame = [0u8; 8];
//! session.send(&[0x11, 0x22, 0x33]).unwrap();
//! let transmit = session.poll_transmit(&mut frame, &mut ()).unwrap();
//! assert_eq!(frame[..transmit.len], [0x03, 0x11, 0x22, 0x33, 0xFF, 0xFF, 0xFF, 0xFF]);
//! ```
//!
//! Timers are deliberately absent: the N_As/N_Bs/N_Cr family of timeouts
//! belongs to the host, which calls [`Session::reset`] on expiry.

mod error;
mod observer;
mod session;

pub use error::{SendError, Violation};
pub use observer::SessionObserver;
pub use session::{
    DEFAULT_INDEX_END, DEFAULT_INDEX_FIRST, DEFAULT_INDEX_START, DEFAULT_PADDING_BYTE, Session,
    SessionConfig, SessionState, Transmit,
};
