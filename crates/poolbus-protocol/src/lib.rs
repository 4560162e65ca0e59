//! Wire protocol for the pool equipment bus.
//!
//! This crate is the protocol engine proper:
//!
//! - **Frame codec** ([`Frame`], [`frame::validate`],
//!   [`frame::serialize_frame`]): delimiting, checksum validation and
//!   serialization of bus frames.
//! - **Payload decoders** ([`DecoderRegistry`]): `(type, command)`
//!   dispatch to functions that turn payload bytes into a
//!   [`StatusFragment`].
//! - **Command encoders** ([`EncoderRegistry`]): selector names to
//!   circuit and heat-change [`Command`]s.
//! - **Engine** ([`Protocol`]): the above plus [`ProtocolStats`].
//! - **State documents** ([`Codec`], [`JsonCodec`]): the JSON shapes
//!   used to publish state and receive desired-state deltas.
//!
//! # Architecture
//!
//! ```text
//! bytes → Frame → StatusFragment → DeviceState
//! DesiredState → Command → Frame → bytes
//! ```
//!
//! Everything here is synchronous and allocation-light; the pipelines in
//! the `poolbus` crate drive it.

pub mod codec;
pub mod command;
mod error;
pub mod frame;
pub mod payload;
mod protocol;
mod types;

pub use codec::{
    Codec, DecodedDelta, DeltaDocument, DeltaValue, ReportedDocument, decode_delta,
    encode_reported,
};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use command::{
    Command, CommandDefaults, EncoderRegistry, HeatParam, HeatSettings, HeaterMode, Selector,
};
pub use error::{CommandError, FrameError, ProtocolError};
pub use frame::{Frame, IDLE_BYTE, RECORD_SEPARATOR, START_BYTE};
pub use payload::{DecodeOutcome, Decoder, DecoderRegistry};
pub use protocol::Protocol;
pub use types::{DesiredState, DeviceState, PayloadKey, ProtocolStats, StatusFragment, Value};
