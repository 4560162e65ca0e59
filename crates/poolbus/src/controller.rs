//! The controller: one connection, both pipelines, one poll loop.
//!
//! [`Controller::poll_once`] and [`Controller::apply_desired`] are the
//! synchronous building blocks. [`Controller::run`] drives them from a
//! `tokio::select!` loop until a shutdown future resolves:
//!
//! ```text
//! poll scheduler ──► poll_once ──► StreamPipeline ──► StateSink
//! desired channel ─► apply_desired ─► ReversePipeline ─► Connection::write
//! ```

use std::future::Future;

use poolbus_poll::{PollConfig, PollScheduler};
use poolbus_protocol::{
    Codec, DecoderRegistry, DesiredState, DeviceState, EncoderRegistry, Protocol, ProtocolStats,
    encode_reported,
};
use poolbus_transport::Connection;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::pipeline::{BatchOutcome, StreamPipeline};
use crate::reverse::{EncodedBatch, ReversePipeline};
use crate::{ControllerConfig, PoolbusError};

// ---------------------------------------------------------------------------
// StateSink
// ---------------------------------------------------------------------------

/// Receives the device state whenever a poll cycle changed it.
pub trait StateSink: Send {
    fn publish(&mut self, state: &DeviceState) -> Result<(), PoolbusError>;
}

/// A [`StateSink`] that encodes each update as a reported-state document
/// and sends the bytes down a channel.
pub struct DocumentSink<K: Codec> {
    codec: K,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl<K: Codec> DocumentSink<K> {
    pub fn new(codec: K, tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { codec, tx }
    }
}

impl<K: Codec> StateSink for DocumentSink<K> {
    fn publish(&mut self, state: &DeviceState) -> Result<(), PoolbusError> {
        let document = encode_reported(&self.codec, state)?;
        self.tx.send(document).map_err(|_| PoolbusError::SinkClosed)
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Owns a connection and the pipelines that read and write it.
pub struct Controller<C: Connection> {
    connection: C,
    pipeline: StreamPipeline,
    poll: PollConfig,
}

impl<C: Connection> Controller<C> {
    pub fn new(connection: C) -> Self {
        Self::with_config(connection, ControllerConfig::default())
    }

    pub fn with_config(connection: C, config: ControllerConfig) -> Self {
        let protocol = Protocol::with_registries(
            DecoderRegistry::standard(),
            EncoderRegistry::standard(config.commands),
        );
        Self {
            connection,
            pipeline: StreamPipeline::with_protocol(config.pipeline, protocol),
            poll: config.poll,
        }
    }

    /// Reads whatever the connection has and feeds it through the stream
    /// pipeline, opening the connection first if needed.
    ///
    /// Only a failing connection is an error; bad frames are counted in
    /// [`stats`](Self::stats).
    pub fn poll_once(&mut self) -> Result<BatchOutcome, PoolbusError> {
        self.ensure_open()?;
        let chunk = self.connection.poll_read()?;
        if chunk.is_empty() {
            return Ok(BatchOutcome::default());
        }
        Ok(self.pipeline.feed(&chunk))
    }

    /// Encodes `desired` and sends every command that encoded in a single
    /// write. Nothing is written when no delta encoded.
    ///
    /// Transmission is fire-and-forget: a successful write is the only
    /// confirmation.
    pub fn apply_desired(&mut self, desired: &DesiredState) -> Result<EncodedBatch, PoolbusError> {
        let batch =
            ReversePipeline::new(self.pipeline.protocol().encoders()).encode(desired, self.state());

        for (selector, err) in &batch.failures {
            warn!(
                conn = %self.connection.id(),
                selector = %selector,
                error = %err,
                "desired state dropped"
            );
        }
        if batch.is_empty() {
            return Ok(batch);
        }

        self.ensure_open()?;
        let written = self.connection.write(&batch.bytes)?;
        debug!(
            conn = %self.connection.id(),
            commands = batch.commands.len(),
            bytes = written,
            "commands sent"
        );
        Ok(batch)
    }

    /// Runs the poll loop until `shutdown` resolves.
    ///
    /// Each poll feeds the stream pipeline and, when the device state
    /// changed, publishes it to `sink`. Deltas arriving on `desired` are
    /// applied between polls. A failed poll or write is logged and the
    /// loop carries on; a failing sink ends it.
    pub async fn run<S, F>(
        &mut self,
        mut desired: mpsc::Receiver<DesiredState>,
        sink: &mut S,
        shutdown: F,
    ) -> Result<(), PoolbusError>
    where
        S: StateSink,
        F: Future<Output = ()>,
    {
        let mut scheduler = PollScheduler::new(self.poll.clone());
        let mut desired_open = true;
        tokio::pin!(shutdown);

        info!(conn = %self.connection.id(), "controller running");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(conn = %self.connection.id(), "controller shutting down");
                    break;
                }
                delta = desired.recv(), if desired_open => match delta {
                    Some(delta) => {
                        if let Err(err) = self.apply_desired(&delta) {
                            warn!(conn = %self.connection.id(), error = %err, "write failed");
                        }
                    }
                    None => {
                        debug!(conn = %self.connection.id(), "desired-state channel closed");
                        desired_open = false;
                    }
                },
                _ = scheduler.wait_for_poll() => {
                    let result = self.poll_once();
                    scheduler.record_poll_end();
                    match result {
                        Ok(outcome) if outcome.is_changed() => sink.publish(self.state())?,
                        Ok(_) => {}
                        Err(err) => {
                            warn!(conn = %self.connection.id(), error = %err, "poll failed");
                        }
                    }
                }
            }
        }

        info!(
            conn = %self.connection.id(),
            polls = scheduler.metrics().total_polls,
            overruns = scheduler.metrics().total_overruns,
            stats = %self.stats(),
            "controller stopped"
        );
        Ok(())
    }

    fn ensure_open(&mut self) -> Result<(), PoolbusError> {
        if !self.connection.is_open() {
            self.connection.open()?;
            self.pipeline.discard_partial();
            info!(conn = %self.connection.id(), "connection opened");
        }
        Ok(())
    }

    /// The merged device state.
    pub fn state(&self) -> &DeviceState {
        self.pipeline.state()
    }

    pub fn stats(&self) -> ProtocolStats {
        self.pipeline.stats()
    }

    pub fn reset_stats(&mut self) {
        self.pipeline.reset_stats();
    }

    /// The current state as a `{"state": {"reported": {...}}}` document.
    pub fn reported_document<K: Codec>(&self, codec: &K) -> Result<Vec<u8>, PoolbusError> {
        Ok(encode_reported(codec, self.state())?)
    }

    pub fn pipeline(&self) -> &StreamPipeline {
        &self.pipeline
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    pub fn into_connection(self) -> C {
        self.connection
    }
}
