/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection has not been opened, or was closed.
    #[error("connection not open: {0}")]
    NotOpen(String),

    /// Opening the underlying device or file failed.
    #[error("open failed: {0}")]
    OpenFailed(#[source] std::io::Error),

    /// Reading from the byte source failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Writing to the byte sink failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// The connection only reads (e.g. a capture replay).
    #[error("connection is read-only")]
    ReadOnly,

    /// The serial port driver reported an error.
    #[cfg(feature = "serial")]
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}
