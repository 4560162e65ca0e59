//! In-memory connection for tests and embedding.

use std::collections::VecDeque;

use crate::{Connection, ConnectionId, TransportError};

/// A [`Connection`] fed from a queue of scripted chunks.
///
/// Each [`poll_read`](Connection::poll_read) pops one chunk, so tests can
/// control exactly where chunk boundaries fall. Everything written is
/// captured and available through [`written`](Self::written).
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    open: bool,
    incoming: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    writes: usize,
    fail_reads: bool,
}

impl MemoryConnection {
    /// A closed connection with nothing queued.
    pub fn new() -> Self {
        Self {
            id: ConnectionId::next(),
            open: false,
            incoming: VecDeque::new(),
            written: Vec::new(),
            writes: 0,
            fail_reads: false,
        }
    }

    /// A closed connection that will yield `chunks` in order.
    pub fn with_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut conn = Self::new();
        conn.incoming.extend(chunks);
        conn
    }

    /// Queues another chunk for a later read.
    pub fn push_chunk(&mut self, chunk: impl Into<Vec<u8>>) {
        self.incoming.push_back(chunk.into());
    }

    /// Number of chunks not yet read.
    pub fn pending(&self) -> usize {
        self.incoming.len()
    }

    /// All bytes written so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Number of write calls so far.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Makes every subsequent read fail, simulating a dead device.
    pub fn fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    pub fn close(&mut self) {
        self.open = false;
    }
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection for MemoryConnection {
    fn is_open(&self) -> bool {
        self.open
    }

    fn open(&mut self) -> Result<(), TransportError> {
        self.open = true;
        Ok(())
    }

    fn poll_read(&mut self) -> Result<Vec<u8>, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen(self.id.to_string()));
        }
        if self.fail_reads {
            return Err(TransportError::ReceiveFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted read failure",
            )));
        }
        Ok(self.incoming.pop_front().unwrap_or_default())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen(self.id.to_string()));
        }
        self.written.extend_from_slice(data);
        self.writes += 1;
        Ok(data.len())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
