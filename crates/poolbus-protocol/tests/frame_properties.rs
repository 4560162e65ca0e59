//! Property tests for the frame codec.
//!
//! The codec has to survive whatever a noisy RS-485 line hands it, so
//! the validator and parser are exercised with arbitrary bytes as well
//! as with frames built by the serializer.

use poolbus_protocol::frame::{self, RECORD_SEPARATOR};
use poolbus_protocol::{Command, Frame, FrameError, IDLE_BYTE, Protocol};
use proptest::prelude::*;

fn command_strategy() -> impl Strategy<Value = Command> {
    (
        any::<u8>(),
        any::<u8>(),
        any::<u8>(),
        any::<u8>(),
        proptest::collection::vec(any::<u8>(), 0..=64),
    )
        .prop_map(|(ty, dst, src, cmd, payload)| Command::new(ty, dst, src, cmd, payload))
}

/// Wire bytes for `command` without the record separators.
fn bare(command: &Command) -> Vec<u8> {
    let wire = frame::serialize_frame(command).unwrap();
    wire[RECORD_SEPARATOR.len()..wire.len() - RECORD_SEPARATOR.len()].to_vec()
}

proptest! {
    #[test]
    fn validator_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
        let _ = frame::is_valid_frame(&bytes);
        let _ = Frame::parse(&bytes);
        let mut protocol = Protocol::new();
        let _ = protocol.process_message(&bytes);
    }

    #[test]
    fn short_input_is_never_valid(bytes in proptest::collection::vec(any::<u8>(), 0..3)) {
        prop_assert!(!frame::is_valid_frame(&bytes));
    }

    #[test]
    fn serialized_frames_round_trip(command in command_strategy()) {
        let bytes = bare(&command);
        prop_assert!(frame::is_valid_frame(&bytes));

        let parsed = Frame::parse(&bytes).unwrap();
        prop_assert_eq!(parsed.message_type(), command.message_type);
        prop_assert_eq!(parsed.destination(), command.destination);
        prop_assert_eq!(parsed.source(), command.source);
        prop_assert_eq!(parsed.command(), command.command_code);
        prop_assert_eq!(usize::from(parsed.payload_length()), command.payload.len());
        prop_assert_eq!(parsed.payload(), command.payload.as_slice());
    }

    #[test]
    fn idle_padding_does_not_change_parse(
        command in command_strategy(),
        before in 0usize..8,
        after in 0usize..8,
    ) {
        let bytes = bare(&command);
        let mut padded = vec![IDLE_BYTE; before];
        padded.extend_from_slice(&bytes);
        padded.extend(std::iter::repeat_n(IDLE_BYTE, after));

        prop_assert_eq!(Frame::parse(&padded), Frame::parse(&bytes));
    }

    #[test]
    fn single_bit_flip_in_body_is_detected(command in command_strategy(), bit in 0u8..8, pick in any::<prop::sample::Index>()) {
        let mut bytes = bare(&command);
        // Skip the start byte so the failure is a checksum failure.
        let body_len = bytes.len() - 2;
        let at = 1 + pick.index(body_len - 1);
        bytes[at] ^= 1 << bit;
        // A flip in the length byte may move the declared end; any
        // rejection is fine as long as the frame is not accepted intact.
        if let Ok(parsed) = Frame::parse(&bytes) {
            prop_assert!(parsed.check_length().is_err() || parsed.payload() != command.payload.as_slice()
                || parsed.message_type() != command.message_type
                || parsed.destination() != command.destination
                || parsed.source() != command.source
                || parsed.command() != command.command_code);
        }
    }
}

#[test]
fn oversized_command_cannot_be_serialized() {
    let command = Command::new(0x24, 0x10, 0x21, 0x86, vec![0; 300]);
    assert_eq!(
        frame::serialize_frame(&command),
        Err(FrameError::PayloadTooLarge(300))
    );
}
