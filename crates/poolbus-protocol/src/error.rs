//! Error types for the protocol layer.
//!
//! Frame-level failures ([`FrameError`]) never escape the stream
//! pipeline: they are classified, counted in
//! [`ProtocolStats`](crate::ProtocolStats), and the offending message is
//! dropped. Encode-side failures ([`CommandError`]) are reported back to
//! the caller per desired-state delta so a batch can carry on without
//! the one that failed.

/// Why a candidate message was not accepted as a frame.
///
/// The variants split into three accounting buckets:
///
/// - [`Empty`](Self::Empty): idle filler or a fragment too short to be
///   a frame. Ignored, never counted as bad.
/// - [`BadStartByte`](Self::BadStartByte) and
///   [`ChecksumMismatch`](Self::ChecksumMismatch): a frame-shaped span
///   that is corrupt. Counted in `bad_frames`.
/// - [`LengthMismatch`](Self::LengthMismatch): checksum passed but the
///   header disagrees with the payload it carries. Counted in
///   `unprocessed_payloads`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Fewer than three bytes remained after idle bytes were stripped.
    #[error("empty frame")]
    Empty,

    /// The span did not begin with the start marker.
    #[error("bad start byte {0:#04x}")]
    BadStartByte(u8),

    /// The trailing checksum does not match the sum of the frame bytes.
    #[error("checksum mismatch: frame carries {received:#06x}, computed {computed:#06x}")]
    ChecksumMismatch { received: u16, computed: u16 },

    /// The header is truncated or declares a payload length that
    /// disagrees with the bytes actually present.
    #[error("payload length mismatch: header declares {declared}, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// An outbound payload does not fit the one-byte length field.
    #[error("payload of {0} bytes exceeds the 255 byte frame limit")]
    PayloadTooLarge(usize),
}

impl FrameError {
    /// Whether this failure counts toward `bad_frames`.
    pub fn is_bad_frame(&self) -> bool {
        matches!(self, Self::BadStartByte(_) | Self::ChecksumMismatch { .. })
    }
}

/// Why a desired-state delta could not be turned into a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// No encoder is registered under this selector name.
    #[error("unknown selector: {0}")]
    UnknownSelector(String),

    /// The target value has the wrong type or is out of range.
    #[error("invalid value for {selector}: {reason}")]
    InvalidValue { selector: String, reason: String },

    /// A heat change needs all four heating parameters; this one was
    /// neither in the delta nor in the current device state.
    #[error("missing heating parameter: {0}")]
    MissingParameter(&'static str),

    /// The command could not be framed.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Errors from the state-document codec.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a state document failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Parsing a state document failed.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
