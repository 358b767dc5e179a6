//! Property tests: any accepted payload survives the segmentation /
//! reassembly loop byte for byte, whatever the format, block size, or
//! separation-time configuration.

use canweave_core::{Session, SessionConfig, SessionObserver, SessionState, Violation};
use canweave_proto::{FrameFormat, SeparationTime};
use proptest::prelude::*;

#[derive(Default)]
struct Recorder {
    messages: Vec<Vec<u8>>,
    violations: Vec<Violation>,
}

impl SessionObserver<'_> for Recorder {
    fn on_message(&mut self, message: &[u8]) {
        self.messages.push(message.to_vec());
    }

    fn on_violation(&mut self, violation: Violation, _frame: &[u8]) {
        self.violations.push(violation);
    }
}

fn pump(
    sender: &mut Session<'_>,
    receiver: &mut Session<'_>,
    budget: usize,
    obs: &mut Recorder,
) -> Result<(), TestCaseError> {
    let mut frame = vec![0u8; budget];
    for _ in 0..100_000 {
        let mut quiet = true;
        if let Some(transmit) = sender.poll_transmit(&mut frame, obs) {
            receiver.handle_frame(&frame[..transmit.len], obs);
            quiet = false;
        }
        if let Some(transmit) = receiver.poll_transmit(&mut frame, obs) {
            sender.handle_frame(&frame[..transmit.len], obs);
            quiet = false;
        }
        if quiet {
            return Ok(());
        }
    }
    Err(TestCaseError::fail("sessions never went quiet"))
}

fn any_format() -> impl Strategy<Value = FrameFormat> {
    prop_oneof![
        Just(FrameFormat::Classic),
        Just(FrameFormat::Fd),
        Just(FrameFormat::Lin),
    ]
}

fn budget_for(format: FrameFormat) -> usize {
    match format {
        FrameFormat::Classic | FrameFormat::Lin => 8,
        FrameFormat::Fd => 64,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn mirror_round_trip(
        format in any_format(),
        payload in prop::collection::vec(any::<u8>(), 1..=600),
        block_size in 0u8..=4,
        padding in prop_oneof![Just(None), Just(Some(0xFFu8)), Just(Some(0xAAu8))],
        separation_ticks in 0u32..=3,
    ) {
        let mut sender_config = SessionConfig::new(format);
        sender_config.padding = padding;

        let mut receiver_config = SessionConfig::new(format);
        receiver_config.block_size = block_size;
        receiver_config.separation = SeparationTime::from_micros(separation_ticks * 100);

        let (mut tx_a, mut rx_a) = ([0u8; 1024], [0u8; 1024]);
        let (mut tx_b, mut rx_b) = ([0u8; 1024], [0u8; 1024]);
        let mut sender = Session::new(sender_config, &mut tx_a, &mut rx_a);
        let mut mirror = Session::new(receiver_config, &mut tx_b, &mut rx_b);
        let mut obs = Recorder::default();

        let accepted = sender.send(&payload).unwrap();
        prop_assert_eq!(accepted, payload.len());

        pump(&mut sender, &mut mirror, budget_for(format), &mut obs)?;

        prop_assert_eq!(sender.state(), SessionState::Idle);
        prop_assert_eq!(mirror.received(), Some(&payload[..]));
        prop_assert_eq!(obs.messages.len(), 1);
        prop_assert!(obs.violations.is_empty(), "violations: {:?}", obs.violations);
    }

    #[test]
    fn progress_is_monotonic_on_the_receiving_side(
        payload in prop::collection::vec(any::<u8>(), 8..=200),
    ) {
        let (mut tx_a, mut rx_a) = ([0u8; 256], [0u8; 256]);
        let (mut tx_b, mut rx_b) = ([0u8; 256], [0u8; 256]);
        let mut sender =
            Session::new(SessionConfig::new(FrameFormat::Classic), &mut tx_a, &mut rx_a);
        let mut mirror =
            Session::new(SessionConfig::new(FrameFormat::Classic), &mut tx_b, &mut rx_b);
        let mut obs = Recorder::default();

        sender.send(&payload).unwrap();

        let mut frame = [0u8; 8];
        let mut last_progress = 0;
        for _ in 0..1_000 {
            if let Some(transmit) = sender.poll_transmit(&mut frame, &mut obs) {
                mirror.handle_frame(&frame[..transmit.len], &mut obs);
                prop_assert!(mirror.progress() >= last_progress);
                last_progress = mirror.progress();
            }
            if let Some(transmit) = mirror.poll_transmit(&mut frame, &mut obs) {
                sender.handle_frame(&frame[..transmit.len], &mut obs);
            }
            if mirror.state() == SessionState::Received {
                break;
            }
        }

        prop_assert_eq!(mirror.progress(), payload.len());
    }

    #[test]
    fn sequence_indices_return_to_start_after_a_full_cycle(
        extra_cycles in 1usize..=2,
    ) {
        // 16 consecutive frames per cycle at 7 bytes each, plus the 6 the
        // First frame carries.
        let len = 6 + 16 * 7 * extra_cycles;
        let payload = vec![0x5Au8; len];

        let (mut tx_a, mut rx_a) = ([0u8; 512], [0u8; 512]);
        let mut sender =
            Session::new(SessionConfig::new(FrameFormat::Classic), &mut tx_a, &mut rx_a);
        let mut obs = Recorder::default();

        sender.send(&payload).unwrap();
        let mut frame = [0u8; 8];
        sender.poll_transmit(&mut frame, &mut obs).unwrap();
        sender.handle_frame(&[0x30, 0x00, 0x00], &mut obs);

        let mut indices = Vec::new();
        while sender.poll_transmit(&mut frame, &mut obs).is_some() {
            indices.push(frame[0] & 0x0F);
        }

        prop_assert_eq!(indices.len(), 16 * extra_cycles);
        prop_assert_eq!(indices.first(), Some(&1));
        // One full cycle later the tracker is back at its starting index.
        prop_assert_eq!(indices.get(16), indices.first().filter(|_| extra_cycles > 1));
    }
}
