//! Forward direction: raw bytes in, device state out.
//!
//! ```text
//! chunk → Segmenter → messages → Protocol::parse_frame → frames
//!       → Protocol::decode_payload → fragments → DeviceState::merge_all
//! ```
//!
//! Each stage consumes the previous stage's batch and hands its own
//! batch on. The only state kept between chunks is the partial message
//! in the [`Segmenter`], the merged [`DeviceState`] and the counters
//! inside [`Protocol`].

use std::fmt;

use poolbus_protocol::{
    DeviceState, Frame, Protocol, ProtocolStats, RECORD_SEPARATOR, StatusFragment,
};
use tracing::{debug, trace, warn};

use crate::PipelineConfig;

// ---------------------------------------------------------------------------
// Segmenter
// ---------------------------------------------------------------------------

/// Splits a byte stream on the record separator.
///
/// Chunks may cut a message (or the separator itself) anywhere; the
/// emitted messages are the same however the stream is chunked.
#[derive(Debug, Clone)]
pub struct Segmenter {
    buffer: Vec<u8>,
    /// Offset in `buffer` where the separator search resumes. Everything
    /// before it is known not to start a separator.
    scan_from: usize,
    max_partial_len: usize,
}

impl Segmenter {
    pub fn new(max_partial_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scan_from: 0,
            max_partial_len,
        }
    }

    /// Appends `chunk` and returns every message it completed, in order.
    ///
    /// Empty pieces between back-to-back separators are returned too; the
    /// frame codec classifies them as empty frames.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);

        let sep = RECORD_SEPARATOR.len();
        let mut messages = Vec::new();
        let mut start = 0;
        let mut at = self.scan_from;
        while at + sep <= self.buffer.len() {
            if self.buffer[at..at + sep] == RECORD_SEPARATOR {
                messages.push(self.buffer[start..at].to_vec());
                at += sep;
                start = at;
            } else {
                at += 1;
            }
        }

        self.buffer.drain(..start);
        self.scan_from = at - start;

        if self.buffer.len() > self.max_partial_len {
            warn!(
                len = self.buffer.len(),
                max = self.max_partial_len,
                "no record separator within limit, discarding partial message"
            );
            self.buffer.clear();
            self.scan_from = 0;
        }

        messages
    }

    /// Bytes held back waiting for the next separator.
    pub fn partial(&self) -> &[u8] {
        &self.buffer
    }

    /// Drops the partial message.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scan_from = 0;
    }
}

// ---------------------------------------------------------------------------
// PipelinePhase
// ---------------------------------------------------------------------------

/// Where the pipeline is in handling the stream.
///
/// ```text
/// Idle → Accumulating → Dispatching → Idle | Accumulating
/// ```
///
/// - **Idle**: nothing buffered.
/// - **Accumulating**: part of a message is buffered, waiting for its
///   separator.
/// - **Dispatching**: a batch of complete messages is being parsed,
///   decoded and merged. Only seen from inside [`StreamPipeline::feed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    Idle,
    Accumulating,
    Dispatching,
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Accumulating => write!(f, "Accumulating"),
            Self::Dispatching => write!(f, "Dispatching"),
        }
    }
}

// ---------------------------------------------------------------------------
// StreamPipeline
// ---------------------------------------------------------------------------

/// What one [`StreamPipeline::feed`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Complete messages cut from the stream.
    pub messages: usize,
    /// Messages that parsed as valid frames.
    pub frames: usize,
    /// Device-state keys whose value changed, in first-change order.
    pub changed: Vec<String>,
}

impl BatchOutcome {
    pub fn is_changed(&self) -> bool {
        !self.changed.is_empty()
    }
}

/// Segments, parses, decodes and merges one connection's byte stream.
#[derive(Debug, Clone)]
pub struct StreamPipeline {
    segmenter: Segmenter,
    protocol: Protocol,
    state: DeviceState,
    phase: PipelinePhase,
}

impl StreamPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_protocol(config, Protocol::new())
    }

    /// A pipeline driving a custom protocol (e.g. extra decoders).
    pub fn with_protocol(config: PipelineConfig, protocol: Protocol) -> Self {
        Self {
            segmenter: Segmenter::new(config.max_partial_len),
            protocol,
            state: DeviceState::new(),
            phase: PipelinePhase::Idle,
        }
    }

    /// Processes one chunk as a single batch.
    ///
    /// State and counters are updated only once the whole batch is
    /// through; a bad frame anywhere in it is counted and skipped.
    pub fn feed(&mut self, chunk: &[u8]) -> BatchOutcome {
        let messages = self.segmenter.push(chunk);
        let mut outcome = BatchOutcome {
            messages: messages.len(),
            ..Default::default()
        };

        if !messages.is_empty() {
            self.transition(PipelinePhase::Dispatching);
            let frames = self.parse(messages);
            outcome.frames = frames.len();
            let fragments = self.decode(frames);
            outcome.changed = self.state.merge_all(fragments);
        }

        let next = if self.segmenter.partial().is_empty() {
            PipelinePhase::Idle
        } else {
            PipelinePhase::Accumulating
        };
        self.transition(next);

        if outcome.messages > 0 {
            trace!(
                messages = outcome.messages,
                frames = outcome.frames,
                changed = outcome.changed.len(),
                "batch processed"
            );
        }
        outcome
    }

    fn parse(&mut self, messages: Vec<Vec<u8>>) -> Vec<Frame> {
        messages
            .iter()
            .filter_map(|message| self.protocol.parse_frame(message).ok())
            .collect()
    }

    fn decode(&mut self, frames: Vec<Frame>) -> Vec<StatusFragment> {
        frames
            .iter()
            .filter_map(|frame| self.protocol.decode_payload(frame).into_fragment())
            .collect()
    }

    fn transition(&mut self, next: PipelinePhase) {
        if self.phase != next {
            trace!(from = %self.phase, to = %next, "pipeline phase");
            self.phase = next;
        }
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    /// The merged device state.
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn stats(&self) -> ProtocolStats {
        self.protocol.stats()
    }

    pub fn reset_stats(&mut self) {
        debug!(stats = %self.protocol.stats(), "resetting protocol stats");
        self.protocol.reset_stats();
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Drops any partial message, e.g. after reopening the connection.
    pub fn discard_partial(&mut self) {
        self.segmenter.clear();
        self.transition(PipelinePhase::Idle);
    }
}

impl Default for StreamPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}
