//! The protocol engine: codec + registries + statistics.
//!
//! [`Protocol`] is the single owner of [`ProtocolStats`]. Every stage that
//! can reject a message goes through it so the counters stay consistent
//! with the error taxonomy in [`FrameError`].

use tracing::trace;

use crate::command::{Command, EncoderRegistry};
use crate::error::{CommandError, FrameError};
use crate::frame::{self, Frame};
use crate::payload::{DecodeOutcome, DecoderRegistry};
use crate::types::{DeviceState, PayloadKey, ProtocolStats, StatusFragment, Value};

/// Frame parsing, payload decoding and command encoding with counters.
#[derive(Debug, Clone)]
pub struct Protocol {
    decoders: DecoderRegistry,
    encoders: EncoderRegistry,
    stats: ProtocolStats,
}

impl Protocol {
    /// A protocol with the standard decoder and encoder registries.
    pub fn new() -> Self {
        Self::with_registries(DecoderRegistry::standard(), EncoderRegistry::default())
    }

    pub fn with_registries(decoders: DecoderRegistry, encoders: EncoderRegistry) -> Self {
        Self {
            decoders,
            encoders,
            stats: ProtocolStats::default(),
        }
    }

    /// Current counters.
    pub fn stats(&self) -> ProtocolStats {
        self.stats
    }

    /// Zeroes every counter.
    pub fn reset_stats(&mut self) {
        self.stats = ProtocolStats::default();
    }

    pub fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    pub fn encoders(&self) -> &EncoderRegistry {
        &self.encoders
    }

    /// Validates a candidate message, counting corrupt frames.
    ///
    /// Empty and idle-only input returns `false` without touching the
    /// counters.
    pub fn is_valid_frame(&mut self, bytes: &[u8]) -> bool {
        match frame::validate(bytes) {
            Ok(_) => true,
            Err(err) => {
                self.record(&err);
                false
            }
        }
    }

    /// Parses one candidate message into a [`Frame`].
    ///
    /// Every call counts toward `frame_count`.
    pub fn parse_frame(&mut self, bytes: &[u8]) -> Result<Frame, FrameError> {
        self.stats.frame_count += 1;
        Frame::parse(bytes).inspect_err(|err| {
            trace!(error = %err, len = bytes.len(), "message rejected");
            self.record(err);
        })
    }

    /// Decodes a frame's payload.
    ///
    /// Frames whose declared length disagrees with their payload, and
    /// frames with no registered decoder, count toward
    /// `unprocessed_payloads`.
    pub fn decode_payload(&mut self, frame: &Frame) -> DecodeOutcome {
        if let Err(err) = frame.check_length() {
            self.record(&err);
            return DecodeOutcome::Malformed(err);
        }

        let key = PayloadKey::new(frame.message_type(), frame.command());
        let outcome = self.decoders.decode(key, frame.payload());
        match &outcome {
            DecodeOutcome::Unmodeled(key) => {
                trace!(%key, len = frame.payload().len(), "no decoder for payload");
                self.stats.unprocessed_payloads += 1;
            }
            DecodeOutcome::Decoded(fields) => {
                trace!(%key, fields = fields.len(), "payload decoded");
            }
            DecodeOutcome::Malformed(_) => {}
        }
        outcome
    }

    /// Parses and decodes one message in a single step.
    pub fn process_message(&mut self, bytes: &[u8]) -> Option<StatusFragment> {
        let frame = self.parse_frame(bytes).ok()?;
        self.decode_payload(&frame).into_fragment()
    }

    /// Builds the command for one desired-state delta.
    pub fn create_command(
        &self,
        selector: &str,
        value: &Value,
        current: &DeviceState,
    ) -> Result<Command, CommandError> {
        self.encoders.build(selector, value, current)
    }

    /// Serializes a command into separator-bracketed wire bytes.
    pub fn serialize_frame(&self, command: &Command) -> Result<Vec<u8>, FrameError> {
        frame::serialize_frame(command)
    }

    fn record(&mut self, err: &FrameError) {
        if err.is_bad_frame() {
            self.stats.bad_frames += 1;
        } else if matches!(err, FrameError::LengthMismatch { .. }) {
            self.stats.unprocessed_payloads += 1;
        }
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::new()
    }
}
