//! # poolbus
//!
//! Host-side controller for a pool equipment RS-485 bus.
//!
//! The bus controller broadcasts status frames; this crate reads them off
//! a [`Connection`], keeps a merged [`DeviceState`] and turns desired
//! state back into command frames.
//!
//! ```text
//! Connection ─► StreamPipeline ─► DeviceState ─► StateSink
//! DesiredState ─► ReversePipeline ─► Connection
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use poolbus::{Controller, FileConnection};
//!
//! let mut controller = Controller::new(FileConnection::new("capture.bin"));
//! while !controller.connection().is_exhausted() {
//!     controller.poll_once()?;
//! }
//! println!("{:?}", controller.state());
//! # Ok::<(), poolbus::PoolbusError>(())
//! ```

mod config;
mod controller;
mod error;
pub mod pipeline;
pub mod reverse;

pub use config::{ControllerConfig, PipelineConfig};
pub use controller::{Controller, DocumentSink, StateSink};
pub use error::PoolbusError;
pub use pipeline::{BatchOutcome, PipelinePhase, Segmenter, StreamPipeline};
pub use reverse::{EncodedBatch, ReversePipeline};

pub use poolbus_poll::{PollConfig, PollPolicy, PollScheduler};
pub use poolbus_protocol::{
    Codec, DecodedDelta, DesiredState, DeviceState, JsonCodec, Protocol, ProtocolStats,
    StatusFragment, Value, decode_delta, encode_reported,
};
pub use poolbus_transport::{Connection, ConnectionId, FileConnection, MemoryConnection};
#[cfg(feature = "serial")]
pub use poolbus_transport::{SerialConfig, SerialConnection};

use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber.
///
/// Honours `RUST_LOG` and falls back to `info`. Calling it more than once
/// is harmless.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
