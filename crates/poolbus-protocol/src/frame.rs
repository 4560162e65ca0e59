//! Frame codec: validation, parsing, and serialization of bus frames.
//!
//! ```text
//! ┌──────┬──────┬──────┬─────┬─────┬─────┬───────────────┬──────────┐
//! │ 0xA5 │ type │ dest │ src │ cmd │ len │ payload (len) │ sum (BE) │
//! └──────┴──────┴──────┴─────┴─────┴─────┴───────────────┴──────────┘
//! ```
//!
//! The checksum is the plain arithmetic sum of every byte before it,
//! start marker included, modulo 2^16, stored big-endian. On the wire
//! frames are delimited by [`RECORD_SEPARATOR`] and padded with
//! [`IDLE_BYTE`] when the bus is quiet.

use crate::command::Command;
use crate::error::FrameError;

/// First byte of every frame.
pub const START_BYTE: u8 = 0xA5;

/// Filler byte sent while the bus is idle.
pub const IDLE_BYTE: u8 = 0xFF;

/// Marker placed between frames on the wire.
pub const RECORD_SEPARATOR: [u8; 3] = [0xFF, 0x00, 0xFF];

/// Start byte plus the five header fields.
pub const HEADER_LEN: usize = 6;

/// Trailing big-endian checksum.
pub const CHECKSUM_LEN: usize = 2;

/// Largest payload the one-byte length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Shortest span the validator will look at; anything shorter is empty.
const MIN_SPAN_LEN: usize = 3;

/// Sum of `bytes` modulo 2^16.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |sum, &b| sum.wrapping_add(u16::from(b)))
}

/// Removes idle padding from both ends of a candidate message.
///
/// When the span starts with [`START_BYTE`] and its header declares a
/// length that fits, the span is cut exactly at the declared end as long
/// as only idle bytes follow. That keeps a checksum whose low byte
/// happens to be `0xFF` intact. Otherwise every trailing idle byte is
/// dropped.
pub fn strip_idle(bytes: &[u8]) -> &[u8] {
    let first = bytes
        .iter()
        .position(|&b| b != IDLE_BYTE)
        .unwrap_or(bytes.len());
    let span = &bytes[first..];

    if span.len() >= HEADER_LEN && span[0] == START_BYTE {
        let end = HEADER_LEN + usize::from(span[5]) + CHECKSUM_LEN;
        if span.len() >= end && span[end..].iter().all(|&b| b == IDLE_BYTE) {
            return &span[..end];
        }
    }

    let last = span
        .iter()
        .rposition(|&b| b != IDLE_BYTE)
        .map_or(0, |i| i + 1);
    &span[..last]
}

/// Strips idle padding and checks the start marker and checksum.
///
/// Returns the stripped span on success.
pub fn validate(bytes: &[u8]) -> Result<&[u8], FrameError> {
    let span = strip_idle(bytes);
    if span.len() < MIN_SPAN_LEN {
        return Err(FrameError::Empty);
    }
    if span[0] != START_BYTE {
        return Err(FrameError::BadStartByte(span[0]));
    }

    let (body, tail) = span.split_at(span.len() - CHECKSUM_LEN);
    let received = u16::from_be_bytes([tail[0], tail[1]]);
    let computed = checksum(body);
    if received != computed {
        return Err(FrameError::ChecksumMismatch { received, computed });
    }
    Ok(span)
}

/// `true` when `bytes` holds a frame with a matching checksum.
///
/// Never panics, whatever the input.
pub fn is_valid_frame(bytes: &[u8]) -> bool {
    validate(bytes).is_ok()
}

/// Frames a command for transmission: separator, frame, separator.
pub fn serialize_frame(command: &Command) -> Result<Vec<u8>, FrameError> {
    let frame = Frame::try_from(command)?;
    let encoded = frame.encode();

    let mut out = Vec::with_capacity(encoded.len() + 2 * RECORD_SEPARATOR.len());
    out.extend_from_slice(&RECORD_SEPARATOR);
    out.extend_from_slice(&encoded);
    out.extend_from_slice(&RECORD_SEPARATOR);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One checksum-validated bus message.
///
/// A `Frame` only comes from [`parse`](Self::parse), which rejects any
/// span whose checksum does not match, or from [`new`](Self::new), whose
/// [`encode`](Self::encode) computes the checksum. Either way a `Frame`
/// is checksum-valid, and its fields are read-only so it stays that way.
///
/// `payload_length` is kept exactly as the header declared it so the
/// decoder can reject frames where it disagrees with `payload`; see
/// [`check_length`](Self::check_length).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    message_type: u8,
    destination: u8,
    source: u8,
    command: u8,
    payload_length: u8,
    payload: Vec<u8>,
}

impl Frame {
    /// Builds a consistent frame around `payload`.
    pub fn new(
        message_type: u8,
        destination: u8,
        source: u8,
        command: u8,
        payload: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let payload_length = u8::try_from(payload.len())
            .map_err(|_| FrameError::PayloadTooLarge(payload.len()))?;
        Ok(Self {
            message_type,
            destination,
            source,
            command,
            payload_length,
            payload,
        })
    }

    /// Validates `bytes` and reads the header fields and payload.
    ///
    /// A checksum-valid span too short to hold a header is reported as
    /// [`FrameError::LengthMismatch`].
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        let span = validate(bytes)?;
        if span.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(FrameError::LengthMismatch {
                declared: span.get(5).map_or(0, |&n| usize::from(n)),
                actual: 0,
            });
        }

        Ok(Self {
            message_type: span[1],
            destination: span[2],
            source: span[3],
            command: span[4],
            payload_length: span[5],
            payload: span[HEADER_LEN..span.len() - CHECKSUM_LEN].to_vec(),
        })
    }

    pub fn message_type(&self) -> u8 {
        self.message_type
    }

    pub fn destination(&self) -> u8 {
        self.destination
    }

    pub fn source(&self) -> u8 {
        self.source
    }

    pub fn command(&self) -> u8 {
        self.command
    }

    /// The payload length as the header declared it.
    pub fn payload_length(&self) -> u8 {
        self.payload_length
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The trailing checksum: the sum of every byte before it.
    pub fn checksum(&self) -> u16 {
        let header = [
            START_BYTE,
            self.message_type,
            self.destination,
            self.source,
            self.command,
            self.payload_length,
        ];
        checksum(&header).wrapping_add(checksum(&self.payload))
    }

    /// Fails when the declared payload length disagrees with the payload.
    pub fn check_length(&self) -> Result<(), FrameError> {
        let declared = usize::from(self.payload_length);
        if declared == self.payload.len() {
            Ok(())
        } else {
            Err(FrameError::LengthMismatch {
                declared,
                actual: self.payload.len(),
            })
        }
    }

    /// Encodes the frame without separators, checksum appended.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len() + CHECKSUM_LEN);
        out.extend_from_slice(&[
            START_BYTE,
            self.message_type,
            self.destination,
            self.source,
            self.command,
            self.payload_length,
        ]);
        out.extend_from_slice(&self.payload);
        let sum = checksum(&out);
        out.extend_from_slice(&sum.to_be_bytes());
        out
    }
}

impl TryFrom<&Command> for Frame {
    type Error = FrameError;

    fn try_from(command: &Command) -> Result<Self, Self::Error> {
        Frame::new(
            command.message_type,
            command.destination,
            command.source,
            command.command_code,
            command.payload.clone(),
        )
    }
}
