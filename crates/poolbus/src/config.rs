//! Controller configuration.

use poolbus_poll::PollConfig;
use poolbus_protocol::CommandDefaults;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Configuration for the stream pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Largest partial message kept between chunks. A longer run of
    /// bytes without a record separator is discarded with a warning.
    pub max_partial_len: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_partial_len: 4096,
        }
    }
}

// ---------------------------------------------------------------------------
// ControllerConfig
// ---------------------------------------------------------------------------

/// Everything a [`Controller`](crate::Controller) needs besides its
/// connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub pipeline: PipelineConfig,
    pub poll: PollConfig,
    /// Addressing for outbound commands.
    pub commands: CommandDefaults,
}
