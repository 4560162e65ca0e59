//! Capture-file replay.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::{Connection, ConnectionId, TransportError};

/// Default number of bytes handed out per poll.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Replays a raw bus capture as if it were arriving on the wire.
///
/// At most `chunk_size` bytes are returned per poll so a long capture is
/// fed through the pipeline in several batches. Once the file is
/// exhausted every poll returns nothing. Writes are refused.
#[derive(Debug)]
pub struct FileConnection {
    id: ConnectionId,
    path: PathBuf,
    chunk_size: usize,
    file: Option<File>,
    exhausted: bool,
}

impl FileConnection {
    /// Creates a replay of `path`; nothing is opened until
    /// [`open`](Connection::open).
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            id: ConnectionId::next(),
            path: path.as_ref().to_path_buf(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            file: None,
            exhausted: false,
        }
    }

    /// Sets the per-poll read size (minimum 1).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the whole capture has been read.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl Connection for FileConnection {
    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn open(&mut self) -> Result<(), TransportError> {
        let file = File::open(&self.path).map_err(TransportError::OpenFailed)?;
        tracing::info!(id = %self.id, path = %self.path.display(), "capture opened");
        self.file = Some(file);
        self.exhausted = false;
        Ok(())
    }

    fn poll_read(&mut self) -> Result<Vec<u8>, TransportError> {
        let Some(file) = self.file.as_mut() else {
            return Err(TransportError::NotOpen(self.path.display().to_string()));
        };
        if self.exhausted {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; self.chunk_size];
        let n = file.read(&mut buf).map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            tracing::debug!(id = %self.id, "capture exhausted");
            self.exhausted = true;
        }
        buf.truncate(n);
        Ok(buf)
    }

    fn write(&mut self, _data: &[u8]) -> Result<usize, TransportError> {
        Err(TransportError::ReadOnly)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
