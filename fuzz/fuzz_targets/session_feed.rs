//! Fuzz target for the session state machine.
//!
//! Drives a session with an arbitrary interleaving of inbound frames, sends,
//! transmit polls, and resets. The machine must never panic, and a produced
//! frame never exceeds the budget it was given.

#![no_main]

use arbitrary::Arbitrary;
use canweave_core::{Session, SessionConfig, SessionObserver, Violation};
use canweave_proto::FrameFormat;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum AnyFormat {
    Classic,
    Fd,
    Lin,
}

#[derive(Debug, Arbitrary)]
enum Op {
    HandleFrame(Vec<u8>),
    Send(Vec<u8>),
    PollTransmit { budget: u8 },
    Reset,
}

struct CountingObserver {
    violations: usize,
}

impl SessionObserver<'_> for CountingObserver {
    fn on_violation(&mut self, _violation: Violation, _frame: &[u8]) {
        self.violations += 1;
    }
}

fuzz_target!(|input: (AnyFormat, bool, Vec<Op>)| {
    let (format, padding, ops) = input;
    let format = match format {
        AnyFormat::Classic => FrameFormat::Classic,
        AnyFormat::Fd => FrameFormat::Fd,
        AnyFormat::Lin => FrameFormat::Lin,
    };

    let mut config = SessionConfig::new(format);
    if !padding {
        config.padding = None;
    }

    let mut tx = [0u8; 256];
    let mut rx = [0u8; 256];
    let mut session = Session::new(config, &mut tx, &mut rx);
    let mut obs = CountingObserver { violations: 0 };

    let total_ops = ops.len();
    for op in ops {
        match op {
            Op::HandleFrame(frame) => session.handle_frame(&frame, &mut obs),
            Op::Send(data) => {
                let _ = session.send(&data);
            },
            Op::PollTransmit { budget } => {
                let mut out = vec![0u8; usize::from(budget)];
                if let Some(transmit) = session.poll_transmit(&mut out, &mut obs) {
                    assert!(transmit.len <= out.len());
                }
            },
            Op::Reset => session.reset(),
        }

        if let Some(message) = session.received() {
            assert!(message.len() <= 256);
        }
    }

    // Each op raises at most one violation.
    assert!(obs.violations <= total_ops);
});
