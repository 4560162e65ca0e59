//! Byte source/sink abstraction for the pool equipment bus.
//!
//! Provides the [`Connection`] trait the poll loop reads from and writes
//! to, plus three implementations:
//!
//! - [`MemoryConnection`]: scripted chunks in, captured writes out.
//! - [`FileConnection`]: replays a raw bus capture, read-only.
//! - `SerialConnection`: an RS-485 adapter (feature `serial`).
//!
//! # Feature Flags
//!
//! - `serial`: serial port connection via the `serialport` crate

mod error;
mod file;
mod memory;
#[cfg(feature = "serial")]
mod serial;

pub use error::TransportError;
pub use file::FileConnection;
pub use memory::MemoryConnection;
#[cfg(feature = "serial")]
pub use serial::{SerialConfig, SerialConnection};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique ID.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A byte stream to and from the bus.
///
/// Reads never block: [`poll_read`](Self::poll_read) returns whatever is
/// waiting, possibly nothing. Chunk boundaries carry no meaning; frames
/// routinely straddle them.
pub trait Connection: Send + 'static {
    /// Whether the connection is ready for reads and writes.
    fn is_open(&self) -> bool;

    /// Opens (or reopens) the underlying device.
    fn open(&mut self) -> Result<(), TransportError>;

    /// Returns the bytes currently available, or an empty vector.
    fn poll_read(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Writes `data`, returning how many bytes were accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
