//! ISO-TP frame codec.
//!
//! Byte 0 of every frame carries the frame kind in its upper nibble; the
//! lower nibble and the following bytes depend on the kind and the bus
//! format:
//!
//! ```text
//! Single       classic/LIN  [0L dd dd dd dd dd dd dd]        L = 1..=7
//!              CAN FD       [00 LL dd dd ..]                 LL up to 62
//! First        classic/LIN  [1L LL dd dd dd dd dd dd]        12-bit length
//!              CAN FD       [10 00 LL LL LL LL dd ..]        32-bit length
//! Consecutive  all          [2N dd dd dd dd dd dd dd]        N = wrapping index
//! FlowControl  all          [3S BS ST ...]                   S = status
//! ```
//!
//! The FD forms are the ISO 15765-2:2016 length escapes: a Single frame with
//! a zero length nibble defers to a full length byte, and a First frame with
//! a zero 12-bit field defers to a 32-bit big-endian length with data
//! starting at byte 6. Escapes are rejected outside FD sessions.
//!
//! Decoding never exposes padding past a declared length; encoding writes the
//! logical frame only (padding to the bus width is session policy).

use crate::{Result, SeparationTime, WireError};

const TYPE_SHIFT: u32 = 4;
const NIBBLE_MASK: u8 = 0x0F;

// Single frame
const SINGLE_DATA: usize = 1;
const SINGLE_FD_LEN: usize = 1;
const SINGLE_FD_DATA: usize = 2;
const SINGLE_LEN_MAX: usize = 7;
const SINGLE_FD_LEN_MAX: usize = 62;

// First frame
const FIRST_DATA: usize = 2;
const FIRST_LEN_MAX: usize = 0x0FFF;
const FIRST_FD_LEN: usize = 2;
const FIRST_FD_DATA: usize = 6;

// Consecutive frame
const CONSECUTIVE_DATA: usize = 1;

// Flow-control frame
const FC_BLOCK_SIZE: usize = 1;
const FC_SEPARATION: usize = 2;
const FC_HEADER: usize = 3;

/// Bus framing variant, fixed for the life of a session.
///
/// The variant affects length-field encoding and flow-control applicability
/// only; the frame-kind nibble and consecutive indexing are shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Classic CAN 2.0 (ISO 15765-2), 8-byte frames.
    Classic,
    /// CAN FD (ISO 15765-2), up to 64-byte frames, escape length forms.
    Fd,
    /// LIN (ISO 17987-2), 8-byte frames, no flow control.
    Lin,
}

impl FrameFormat {
    /// Whether this format runs the flow-control exchange. LIN does not:
    /// a LIN sender streams consecutive frames unthrottled and a LIN
    /// receiver never owes a flow-control frame.
    #[must_use]
    pub fn uses_flow_control(self) -> bool {
        !matches!(self, Self::Lin)
    }

    /// Largest transfer length the First-frame length field can declare.
    #[must_use]
    pub fn max_transfer(self) -> usize {
        match self {
            Self::Classic | Self::Lin => FIRST_LEN_MAX,
            Self::Fd => u32::MAX as usize,
        }
    }

    /// Payload bytes a Single frame can carry inside `budget` frame bytes.
    #[must_use]
    pub fn single_frame_capacity(self, budget: usize) -> usize {
        match self {
            Self::Classic | Self::Lin => budget.saturating_sub(SINGLE_DATA).min(SINGLE_LEN_MAX),
            Self::Fd => budget.saturating_sub(SINGLE_FD_DATA).min(SINGLE_FD_LEN_MAX),
        }
    }

    /// Payload bytes a First frame can carry inside `budget` frame bytes.
    #[must_use]
    pub fn first_frame_capacity(self, budget: usize) -> usize {
        match self {
            Self::Classic | Self::Lin => budget.saturating_sub(FIRST_DATA),
            Self::Fd => budget.saturating_sub(FIRST_FD_DATA),
        }
    }

    /// Payload bytes a Consecutive frame can carry inside `budget` frame
    /// bytes.
    #[must_use]
    pub fn consecutive_capacity(self, budget: usize) -> usize {
        budget.saturating_sub(CONSECUTIVE_DATA)
    }
}

/// Frame kind, from the upper nibble of byte 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Complete short message in one frame.
    Single,
    /// Opening frame of a multi-frame transfer, declaring its total length.
    First,
    /// Continuation frame with a wrapping sequence index.
    Consecutive,
    /// Receiver-to-sender flow-control frame.
    FlowControl,
}

impl FrameType {
    /// Classify a frame from its first byte. `None` for nibbles 4..=15.
    #[must_use]
    pub fn from_byte(byte0: u8) -> Option<Self> {
        match byte0 >> TYPE_SHIFT {
            0x0 => Some(Self::Single),
            0x1 => Some(Self::First),
            0x2 => Some(Self::Consecutive),
            0x3 => Some(Self::FlowControl),
            _ => None,
        }
    }

    const fn nibble(self) -> u8 {
        match self {
            Self::Single => 0x0,
            Self::First => 0x1,
            Self::Consecutive => 0x2,
            Self::FlowControl => 0x3,
        }
    }
}

/// Flow-control status, from the lower nibble of a flow-control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// Clear to send the next block of consecutive frames.
    ContinueToSend,
    /// Hold until a further flow-control frame arrives.
    Wait,
    /// Receiver cannot take the transfer; the sender should abort.
    OverflowAbort,
}

impl FlowStatus {
    fn from_nibble(nibble: u8) -> Result<Self> {
        match nibble {
            0x0 => Ok(Self::ContinueToSend),
            0x1 => Ok(Self::Wait),
            0x2 => Ok(Self::OverflowAbort),
            other => Err(WireError::UnknownFlowStatus(other)),
        }
    }

    const fn nibble(self) -> u8 {
        match self {
            Self::ContinueToSend => 0x0,
            Self::Wait => 0x1,
            Self::OverflowAbort => 0x2,
        }
    }
}

/// One decoded ISO-TP frame, borrowing its payload from the raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Complete short message in one frame.
    Single {
        /// Payload, exactly the declared length; padding is never included.
        data: &'a [u8],
    },

    /// Opening frame of a multi-frame transfer.
    First {
        /// Declared length of the whole transfer.
        total_len: usize,
        /// Payload bytes present in this frame, unclamped; the session
        /// limits the copy to `total_len`.
        data: &'a [u8],
    },

    /// Continuation frame.
    Consecutive {
        /// 4-bit wrapping sequence index.
        index: u8,
        /// Payload bytes present in this frame.
        data: &'a [u8],
    },

    /// Receiver-to-sender flow-control frame.
    FlowControl {
        /// Permission status.
        status: FlowStatus,
        /// Consecutive frames allowed before the next flow-control frame;
        /// 0 means unlimited.
        block_size: u8,
        /// Minimum delay the sender must leave between consecutive frames.
        separation: SeparationTime,
    },
}

impl<'a> Frame<'a> {
    /// Decode a raw bus frame under `format` rules.
    pub fn decode(format: FrameFormat, bytes: &'a [u8]) -> Result<Self> {
        let first = *bytes.first().ok_or(WireError::FrameTooShort { expected: 1, actual: 0 })?;
        let kind = FrameType::from_byte(first)
            .ok_or(WireError::UnknownFrameType(first >> TYPE_SHIFT))?;

        match kind {
            FrameType::Single => Self::decode_single(format, bytes),
            FrameType::First => Self::decode_first(format, bytes),
            FrameType::Consecutive => Ok(Self::Consecutive {
                index: bytes[0] & NIBBLE_MASK,
                data: &bytes[CONSECUTIVE_DATA..],
            }),
            FrameType::FlowControl => Self::decode_flow_control(bytes),
        }
    }

    fn decode_single(format: FrameFormat, bytes: &'a [u8]) -> Result<Self> {
        let nibble = usize::from(bytes[0] & NIBBLE_MASK);
        let (declared, data_start) = if nibble == 0 {
            // FD length escape: full length byte follows.
            if format != FrameFormat::Fd {
                return Err(WireError::EscapeNotAllowed);
            }
            let len = *bytes.get(SINGLE_FD_LEN).ok_or(WireError::FrameTooShort {
                expected: SINGLE_FD_DATA,
                actual: bytes.len(),
            })?;
            (usize::from(len), SINGLE_FD_DATA)
        } else {
            (nibble, SINGLE_DATA)
        };

        let available = bytes.len() - data_start;
        if available < declared {
            return Err(WireError::TruncatedPayload { declared, available });
        }

        Ok(Self::Single { data: &bytes[data_start..data_start + declared] })
    }

    fn decode_first(format: FrameFormat, bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < FIRST_DATA {
            return Err(WireError::FrameTooShort { expected: FIRST_DATA, actual: bytes.len() });
        }

        let short_len = (usize::from(bytes[0] & NIBBLE_MASK) << 8) | usize::from(bytes[1]);
        if short_len != 0 {
            return Ok(Self::First { total_len: short_len, data: &bytes[FIRST_DATA..] });
        }

        // FD length escape: zero 12-bit field, 32-bit length in bytes 2..=5.
        if format != FrameFormat::Fd {
            return Err(WireError::EscapeNotAllowed);
        }
        if bytes.len() < FIRST_FD_DATA {
            return Err(WireError::FrameTooShort { expected: FIRST_FD_DATA, actual: bytes.len() });
        }

        let total_len =
            u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]) as usize;
        Ok(Self::First { total_len, data: &bytes[FIRST_FD_DATA..] })
    }

    fn decode_flow_control(bytes: &'a [u8]) -> Result<Self> {
        let status = FlowStatus::from_nibble(bytes[0] & NIBBLE_MASK)?;

        // Trailing bytes may be absent on the wire; both default to zero.
        let block_size = bytes.get(FC_BLOCK_SIZE).copied().unwrap_or(0);
        let separation =
            SeparationTime::from_wire(bytes.get(FC_SEPARATION).copied().unwrap_or(0));

        Ok(Self::FlowControl { status, block_size, separation })
    }

    /// Encode into `out`, returning the logical frame length.
    ///
    /// The logical length excludes padding; padding a frame out to the bus
    /// width is the caller's policy.
    pub fn encode(&self, format: FrameFormat, out: &mut [u8]) -> Result<usize> {
        match *self {
            Self::Single { data } => encode_single(format, data, out),
            Self::First { total_len, data } => encode_first(format, total_len, data, out),
            Self::Consecutive { index, data } => encode_consecutive(index, data, out),
            Self::FlowControl { status, block_size, separation } => {
                encode_flow_control(status, block_size, separation, out)
            },
        }
    }
}

fn ensure_capacity(out: &[u8], needed: usize) -> Result<()> {
    if out.len() < needed {
        return Err(WireError::BufferTooSmall { needed, available: out.len() });
    }
    Ok(())
}

fn encode_single(format: FrameFormat, data: &[u8], out: &mut [u8]) -> Result<usize> {
    match format {
        FrameFormat::Classic | FrameFormat::Lin => {
            // A zero length nibble would read as an escape; 1..=7 only.
            if data.is_empty() || data.len() > SINGLE_LEN_MAX {
                return Err(WireError::LengthOverflow { len: data.len(), max: SINGLE_LEN_MAX });
            }
            let needed = SINGLE_DATA + data.len();
            ensure_capacity(out, needed)?;
            out[0] = (FrameType::Single.nibble() << TYPE_SHIFT) | data.len() as u8;
            out[SINGLE_DATA..needed].copy_from_slice(data);
            Ok(needed)
        },
        FrameFormat::Fd => {
            if data.len() > SINGLE_FD_LEN_MAX {
                return Err(WireError::LengthOverflow { len: data.len(), max: SINGLE_FD_LEN_MAX });
            }
            let needed = SINGLE_FD_DATA + data.len();
            ensure_capacity(out, needed)?;
            out[0] = FrameType::Single.nibble() << TYPE_SHIFT;
            out[SINGLE_FD_LEN] = data.len() as u8;
            out[SINGLE_FD_DATA..needed].copy_from_slice(data);
            Ok(needed)
        },
    }
}

fn encode_first(
    format: FrameFormat,
    total_len: usize,
    data: &[u8],
    out: &mut [u8],
) -> Result<usize> {
    match format {
        FrameFormat::Classic | FrameFormat::Lin => {
            // A zero 12-bit field would read as an escape; 1..=4095 only.
            if total_len == 0 || total_len > FIRST_LEN_MAX {
                return Err(WireError::LengthOverflow { len: total_len, max: FIRST_LEN_MAX });
            }
            let needed = FIRST_DATA + data.len();
            ensure_capacity(out, needed)?;
            out[0] = (FrameType::First.nibble() << TYPE_SHIFT) | ((total_len >> 8) as u8);
            out[1] = (total_len & 0xFF) as u8;
            out[FIRST_DATA..needed].copy_from_slice(data);
            Ok(needed)
        },
        FrameFormat::Fd => {
            let max = u32::MAX as usize;
            if total_len > max {
                return Err(WireError::LengthOverflow { len: total_len, max });
            }
            let needed = FIRST_FD_DATA + data.len();
            ensure_capacity(out, needed)?;
            out[0] = FrameType::First.nibble() << TYPE_SHIFT;
            out[1] = 0x00;
            out[FIRST_FD_LEN..FIRST_FD_DATA].copy_from_slice(&(total_len as u32).to_be_bytes());
            out[FIRST_FD_DATA..needed].copy_from_slice(data);
            Ok(needed)
        },
    }
}

fn encode_consecutive(index: u8, data: &[u8], out: &mut [u8]) -> Result<usize> {
    let needed = CONSECUTIVE_DATA + data.len();
    ensure_capacity(out, needed)?;
    out[0] = (FrameType::Consecutive.nibble() << TYPE_SHIFT) | (index & NIBBLE_MASK);
    out[CONSECUTIVE_DATA..needed].copy_from_slice(data);
    Ok(needed)
}

fn encode_flow_control(
    status: FlowStatus,
    block_size: u8,
    separation: SeparationTime,
    out: &mut [u8],
) -> Result<usize> {
    ensure_capacity(out, FC_HEADER)?;
    out[0] = (FrameType::FlowControl.nibble() << TYPE_SHIFT) | status.nibble();
    out[FC_BLOCK_SIZE] = block_size;
    out[FC_SEPARATION] = separation.to_wire();
    Ok(FC_HEADER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_nibbles() {
        assert_eq!(FrameType::from_byte(0x03), Some(FrameType::Single));
        assert_eq!(FrameType::from_byte(0x14), Some(FrameType::First));
        assert_eq!(FrameType::from_byte(0x2F), Some(FrameType::Consecutive));
        assert_eq!(FrameType::from_byte(0x30), Some(FrameType::FlowControl));
        for nibble in 4..=15u8 {
            assert_eq!(FrameType::from_byte(nibble << 4), None);
        }
    }

    #[test]
    fn single_classic() {
        let bytes = [0x03, 0x11, 0x22, 0x33, 0xFF, 0xFF, 0xFF, 0xFF];
        let frame = Frame::decode(FrameFormat::Classic, &bytes).unwrap();
        assert_eq!(frame, Frame::Single { data: &[0x11, 0x22, 0x33] });

        let mut out = [0u8; 8];
        let len = frame.encode(FrameFormat::Classic, &mut out).unwrap();
        assert_eq!(&out[..len], &[0x03, 0x11, 0x22, 0x33]);
    }

    #[test]
    fn single_padding_is_ignored() {
        let bytes = [0x02, 0xAB, 0xCD, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let frame = Frame::decode(FrameFormat::Classic, &bytes).unwrap();
        assert_eq!(frame, Frame::Single { data: &[0xAB, 0xCD] });
    }

    #[test]
    fn single_truncated_is_rejected() {
        let bytes = [0x05, 0x01, 0x02];
        assert_eq!(
            Frame::decode(FrameFormat::Classic, &bytes),
            Err(WireError::TruncatedPayload { declared: 5, available: 2 })
        );
    }

    #[test]
    fn single_fd_escape() {
        let mut bytes = [0u8; 16];
        bytes[1] = 10;
        for (i, byte) in bytes[2..12].iter_mut().enumerate() {
            *byte = i as u8;
        }

        let frame = Frame::decode(FrameFormat::Fd, &bytes).unwrap();
        let Frame::Single { data } = frame else { panic!("expected single frame") };
        assert_eq!(data.len(), 10);
        assert_eq!(data[9], 9);

        // The same bytes are malformed in a classic session.
        assert_eq!(
            Frame::decode(FrameFormat::Classic, &bytes),
            Err(WireError::EscapeNotAllowed)
        );
    }

    #[test]
    fn single_fd_uses_escape_form_on_encode() {
        let data = [0u8; 20];
        let mut out = [0u8; 64];
        let len = Frame::Single { data: &data }.encode(FrameFormat::Fd, &mut out).unwrap();
        assert_eq!(len, 22);
        assert_eq!(out[0], 0x00);
        assert_eq!(out[1], 20);
    }

    #[test]
    fn first_classic() {
        let bytes = [0x10, 0x14, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        let frame = Frame::decode(FrameFormat::Classic, &bytes).unwrap();
        assert_eq!(
            frame,
            Frame::First { total_len: 20, data: &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06] }
        );

        let mut out = [0u8; 8];
        let len = frame.encode(FrameFormat::Classic, &mut out).unwrap();
        assert_eq!(&out[..len], &bytes);
    }

    #[test]
    fn first_twelve_bit_length() {
        let bytes = [0x1F, 0xFF, 0xAA, 0xBB];
        let frame = Frame::decode(FrameFormat::Classic, &bytes).unwrap();
        assert_eq!(frame, Frame::First { total_len: 0x0FFF, data: &[0xAA, 0xBB] });
    }

    #[test]
    fn first_fd_escape() {
        let mut bytes = [0u8; 64];
        bytes[0] = 0x10;
        bytes[1] = 0x00;
        bytes[2..6].copy_from_slice(&0x0001_0000u32.to_be_bytes());
        bytes[6] = 0xEE;

        let frame = Frame::decode(FrameFormat::Fd, &bytes).unwrap();
        let Frame::First { total_len, data } = frame else { panic!("expected first frame") };
        assert_eq!(total_len, 0x10000);
        assert_eq!(data.len(), 58);
        assert_eq!(data[0], 0xEE);

        assert_eq!(
            Frame::decode(FrameFormat::Classic, &bytes[..8]),
            Err(WireError::EscapeNotAllowed)
        );
    }

    #[test]
    fn first_fd_escape_round_trip() {
        let data = [0x42u8; 58];
        let mut out = [0u8; 64];
        let frame = Frame::First { total_len: 100_000, data: &data };
        let len = frame.encode(FrameFormat::Fd, &mut out).unwrap();
        assert_eq!(len, 64);
        assert_eq!(out[0], 0x10);
        assert_eq!(out[1], 0x00);
        assert_eq!(Frame::decode(FrameFormat::Fd, &out[..len]).unwrap(), frame);
    }

    #[test]
    fn first_length_overflow() {
        let data = [0u8; 6];
        let mut out = [0u8; 8];
        let frame = Frame::First { total_len: 0x1000, data: &data };
        assert_eq!(
            frame.encode(FrameFormat::Classic, &mut out),
            Err(WireError::LengthOverflow { len: 0x1000, max: 0x0FFF })
        );
    }

    #[test]
    fn consecutive() {
        let bytes = [0x21, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D];
        let frame = Frame::decode(FrameFormat::Classic, &bytes).unwrap();
        assert_eq!(
            frame,
            Frame::Consecutive { index: 1, data: &[0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D] }
        );

        let mut out = [0u8; 8];
        let len = frame.encode(FrameFormat::Classic, &mut out).unwrap();
        assert_eq!(&out[..len], &bytes);
    }

    #[test]
    fn flow_control() {
        let bytes = [0x30, 0x02, 0xF5];
        let frame = Frame::decode(FrameFormat::Classic, &bytes).unwrap();
        assert_eq!(
            frame,
            Frame::FlowControl {
                status: FlowStatus::ContinueToSend,
                block_size: 2,
                separation: SeparationTime::from_micros(500),
            }
        );

        let mut out = [0u8; 8];
        let len = frame.encode(FrameFormat::Classic, &mut out).unwrap();
        assert_eq!(&out[..len], &bytes);
    }

    #[test]
    fn flow_control_wait_and_abort() {
        let wait = Frame::decode(FrameFormat::Classic, &[0x31, 0x00, 0x00]).unwrap();
        assert!(matches!(wait, Frame::FlowControl { status: FlowStatus::Wait, .. }));

        let abort = Frame::decode(FrameFormat::Classic, &[0x32, 0x00, 0x00]).unwrap();
        assert!(matches!(abort, Frame::FlowControl { status: FlowStatus::OverflowAbort, .. }));
    }

    #[test]
    fn flow_control_unknown_status() {
        assert_eq!(
            Frame::decode(FrameFormat::Classic, &[0x3F, 0x00, 0x00]),
            Err(WireError::UnknownFlowStatus(0xF))
        );
    }

    #[test]
    fn flow_control_missing_trailing_bytes_default_to_zero() {
        let frame = Frame::decode(FrameFormat::Classic, &[0x30, 0x05]).unwrap();
        assert_eq!(
            frame,
            Frame::FlowControl {
                status: FlowStatus::ContinueToSend,
                block_size: 5,
                separation: SeparationTime::NONE,
            }
        );
    }

    #[test]
    fn unknown_frame_type() {
        assert_eq!(
            Frame::decode(FrameFormat::Classic, &[0x40, 0x00]),
            Err(WireError::UnknownFrameType(0x4))
        );
    }

    #[test]
    fn empty_input() {
        assert_eq!(
            Frame::decode(FrameFormat::Classic, &[]),
            Err(WireError::FrameTooShort { expected: 1, actual: 0 })
        );
    }

    #[test]
    fn encode_into_undersized_buffer() {
        let mut out = [0u8; 2];
        let frame = Frame::Single { data: &[1, 2, 3] };
        assert_eq!(
            frame.encode(FrameFormat::Classic, &mut out),
            Err(WireError::BufferTooSmall { needed: 4, available: 2 })
        );
    }

    #[test]
    fn capacities() {
        assert_eq!(FrameFormat::Classic.single_frame_capacity(8), 7);
        assert_eq!(FrameFormat::Fd.single_frame_capacity(64), 62);
        assert_eq!(FrameFormat::Lin.single_frame_capacity(7), 6);
        assert_eq!(FrameFormat::Classic.first_frame_capacity(8), 6);
        assert_eq!(FrameFormat::Fd.first_frame_capacity(64), 58);
        assert_eq!(FrameFormat::Classic.consecutive_capacity(8), 7);
        assert_eq!(FrameFormat::Fd.consecutive_capacity(64), 63);
    }
}
