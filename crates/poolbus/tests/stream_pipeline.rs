//! Stream pipeline behaviour over realistic bus traffic.

use poolbus::{PipelineConfig, ProtocolStats, Segmenter, StreamPipeline, Value};
use poolbus_protocol::{Command, RECORD_SEPARATOR, frame};
use proptest::prelude::*;

// =========================================================================
// Helpers
// =========================================================================

fn wire(message_type: u8, command: u8, payload: Vec<u8>) -> Vec<u8> {
    frame::serialize_frame(&Command::new(message_type, 0x0F, 0x10, command, payload)).unwrap()
}

fn temperatures(water: u8) -> Vec<u8> {
    let mut payload = vec![water, 0x4D, 0x3C, 0x52, 0x66];
    payload.extend([0u8; 8]);
    wire(0x24, 0x08, payload)
}

fn status(circuits: u8) -> Vec<u8> {
    let mut payload = vec![0u8; 29];
    payload[0] = 9;
    payload[1] = 41;
    payload[2] = circuits;
    payload[14] = 78;
    payload[15] = 80;
    payload[18] = 65;
    payload[22] = 0x05;
    wire(0x24, 0x02, payload)
}

fn pipeline() -> StreamPipeline {
    StreamPipeline::new(PipelineConfig {
        max_partial_len: 1 << 20,
    })
}

// =========================================================================
// Scenarios
// =========================================================================

#[test]
fn test_bad_checksum_frame_is_counted_and_skipped() {
    let mut stream = RECORD_SEPARATOR.to_vec();
    stream.extend([0xA5, 0x24, 0x10, 0x21, 0x02, 0x01, 0xFF, 0x9D]);
    stream.extend(RECORD_SEPARATOR);
    stream.extend(temperatures(76));

    let mut pipeline = pipeline();
    let outcome = pipeline.feed(&stream);

    assert_eq!(outcome.frames, 1);
    assert_eq!(pipeline.stats().bad_frames, 1);
    assert_eq!(pipeline.state().get("waterTemp"), Some(&Value::Int(76)));
}

#[test]
fn test_status_circuit_flags() {
    let mut pipeline = pipeline();
    pipeline.feed(&status(0x21));

    let state = pipeline.state();
    assert_eq!(state.get("spa"), Some(&Value::Bool(true)));
    assert_eq!(state.get("pool"), Some(&Value::Bool(true)));
    assert_eq!(state.get("aux1"), Some(&Value::Bool(false)));
    assert_eq!(state.get("feature3"), Some(&Value::Bool(false)));
    assert_eq!(state.get("waterTemp"), Some(&Value::Int(78)));
    assert_eq!(state.get("poolHeaterMode"), Some(&Value::Int(1)));
    assert_eq!(state.get("spaHeaterMode"), Some(&Value::Int(1)));
}

#[test]
fn test_last_write_wins_within_batch() {
    let mut stream = temperatures(70);
    stream.extend(temperatures(81));

    let mut pipeline = pipeline();
    let outcome = pipeline.feed(&stream);

    assert_eq!(outcome.frames, 2);
    assert_eq!(pipeline.state().get("waterTemp"), Some(&Value::Int(81)));
    assert_eq!(
        outcome.changed.iter().filter(|k| *k == "waterTemp").count(),
        1
    );
}

#[test]
fn test_unknown_payload_counts_once_and_leaves_state() {
    let mut pipeline = pipeline();
    pipeline.feed(&temperatures(76));
    let before = pipeline.state().clone();
    let stats_before = pipeline.stats();

    let outcome = pipeline.feed(&wire(0x24, 0x99, vec![1, 2, 3]));

    assert!(!outcome.is_changed());
    assert_eq!(pipeline.state(), &before);
    assert_eq!(
        pipeline.stats().unprocessed_payloads,
        stats_before.unprocessed_payloads + 1
    );
    assert_eq!(pipeline.stats().bad_frames, stats_before.bad_frames);
}

#[test]
fn test_idle_filler_between_frames() {
    let mut stream = vec![0xFF; 12];
    stream.extend(status(0x20));
    stream.extend([0xFF; 5]);
    stream.extend(temperatures(90));

    let mut pipeline = pipeline();
    pipeline.feed(&stream);

    assert_eq!(pipeline.stats().bad_frames, 0);
    assert_eq!(pipeline.state().get("pool"), Some(&Value::Bool(true)));
    assert_eq!(pipeline.state().get("waterTemp"), Some(&Value::Int(90)));
}

#[test]
fn test_pump_telemetry() {
    let mut pipeline = pipeline();
    pipeline.feed(&wire(0x00, 0x07, vec![0x0A, 0x02, 0x00, 0x01, 0xF4, 0x0B, 0xB8, 0x00, 0x00]));

    let state = pipeline.state();
    assert_eq!(state.get("pumpStarted"), Some(&Value::Bool(true)));
    assert_eq!(state.get("pumpWatts"), Some(&Value::Int(500)));
    assert_eq!(state.get("pumpRPM"), Some(&Value::Int(3000)));
}

// =========================================================================
// Properties
// =========================================================================

fn stream_strategy() -> impl Strategy<Value = Vec<u8>> {
    let piece = prop_oneof![
        (60u8..100).prop_map(temperatures),
        any::<u8>().prop_map(status),
        proptest::collection::vec(any::<u8>(), 0..16),
        Just(RECORD_SEPARATOR.to_vec()),
        Just(vec![0xFF; 4]),
    ];
    proptest::collection::vec(piece, 1..12).prop_map(|pieces| pieces.concat())
}

/// Splits `bytes` at the given (unsorted, possibly repeated) cut points.
fn chunked(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut cuts: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
    cuts.sort_unstable();
    let mut chunks = Vec::new();
    let mut last = 0;
    for cut in cuts {
        chunks.push(bytes[last..cut].to_vec());
        last = cut;
    }
    chunks.push(bytes[last..].to_vec());
    chunks
}

proptest! {
    #[test]
    fn segmentation_is_chunking_independent(
        stream in stream_strategy(),
        cuts in proptest::collection::vec(any::<usize>(), 0..24),
    ) {
        let mut whole = Segmenter::new(1 << 20);
        let expected = whole.push(&stream);

        let mut pieces = Segmenter::new(1 << 20);
        let mut got = Vec::new();
        for chunk in chunked(&stream, &cuts) {
            got.extend(pieces.push(&chunk));
        }

        prop_assert_eq!(got, expected);
        prop_assert_eq!(pieces.partial(), whole.partial());
    }

    #[test]
    fn byte_at_a_time_matches_whole_stream(stream in stream_strategy()) {
        let mut whole = pipeline();
        whole.feed(&stream);

        let mut bytewise = pipeline();
        for byte in &stream {
            bytewise.feed(std::slice::from_ref(byte));
        }

        prop_assert_eq!(bytewise.state(), whole.state());
        prop_assert_eq!(bytewise.stats(), whole.stats());
        prop_assert_eq!(bytewise.phase(), whole.phase());
    }

    #[test]
    fn garbage_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let mut pipeline = pipeline();
        pipeline.feed(&bytes);
        let ProtocolStats { frame_count, bad_frames, unprocessed_payloads } = pipeline.stats();
        prop_assert!(bad_frames + unprocessed_payloads <= frame_count);
    }
}
