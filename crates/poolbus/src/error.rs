//! Unified error type for the poolbus controller.

use poolbus_protocol::{CommandError, ProtocolError};
use poolbus_transport::TransportError;

/// Top-level error that wraps the sub-crate errors.
///
/// Frame-level failures never show up here: the stream pipeline absorbs
/// them into [`ProtocolStats`](poolbus_protocol::ProtocolStats). What
/// surfaces is the byte source failing, a state document that will not
/// encode or decode, or a state sink that went away.
#[derive(Debug, thiserror::Error)]
pub enum PoolbusError {
    /// The connection failed to open, read or write.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A state document failed to encode or decode.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A desired-state delta could not be turned into a command.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The receiving end of a state sink was dropped.
    #[error("state sink closed")]
    SinkClosed,
}
