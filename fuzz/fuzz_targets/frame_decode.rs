//! Fuzz target for `Frame::decode`.
//!
//! Decoding arbitrary bus bytes under every format must never panic; all
//! malformed inputs return `WireError`. Whatever decodes successfully must
//! re-encode without error into a sufficiently large buffer.

#![no_main]

use arbitrary::Arbitrary;
use canweave_proto::{Frame, FrameFormat};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum AnyFormat {
    Classic,
    Fd,
    Lin,
}

impl From<AnyFormat> for FrameFormat {
    fn from(format: AnyFormat) -> Self {
        match format {
            AnyFormat::Classic => Self::Classic,
            AnyFormat::Fd => Self::Fd,
            AnyFormat::Lin => Self::Lin,
        }
    }
}

fuzz_target!(|input: (AnyFormat, &[u8])| {
    let (format, bytes) = input;
    let format = FrameFormat::from(format);

    if let Ok(frame) = Frame::decode(format, bytes) {
        // Anything that decodes must be re-encodable.
        let mut out = vec![0u8; bytes.len() + 8];
        frame
            .encode(format, &mut out)
            .expect("decoded frame must re-encode");
    }
});
