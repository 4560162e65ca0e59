//! Fixed-interval poll scheduler for the pool equipment bus.
//!
//! The bus controller broadcasts status a few times a second; the host
//! only has to read whatever accumulated in the serial driver at a
//! steady cadence. This crate paces that read loop with overrun handling
//! and timing metrics.
//!
//! # Timing model
//!
//! The scheduler keeps one absolute deadline, `next_poll`. Each call to
//! [`PollScheduler::wait_for_poll`] sleeps until that deadline and then
//! moves it forward by one interval. Working from absolute deadlines
//! (instead of sleeping `interval` after each poll) means the time spent
//! inside a poll does not stretch the cadence: a 450 ms interval with a
//! 30 ms read still polls every 450 ms.
//!
//! The interval itself is usually derived from the serial read timeout
//! with [`PollConfig::from_read_timeout`]. Polling slightly faster than
//! the driver times out keeps the receive buffer from piling up between
//! reads.
//!
//! # Overruns
//!
//! A poll overruns when the loop comes back to `wait_for_poll` after its
//! deadline has already passed, because the previous cycle or the
//! desired-state handler took too long. [`PollPolicy`] decides what
//! happens next:
//!
//! - [`PollPolicy::Skip`] counts the missed deadlines, fires once right
//!   away, and schedules the next poll one interval from now. A slow
//!   cycle never causes a burst of back-to-back reads.
//! - [`PollPolicy::Drop`] fires right away but keeps the original grid,
//!   so the cadence stays phase-locked to when the scheduler started.
//!
//! There is no catch-up mode. Reading the bus twice in a row gains
//! nothing because one read already drains everything the driver
//! buffered.
//!
//! # Budget monitoring
//!
//! [`PollScheduler::record_poll_end`] measures how long the cycle took
//! and logs a `tracing` warning when it used more than
//! `budget_warn_threshold` of the interval. The same measurement feeds
//! an exponential moving average in [`PollMetrics`].
//!
//! # Pausing
//!
//! A paused scheduler's `wait_for_poll` never resolves, so the `select!`
//! arm is simply never taken while the other arms keep running.
//! Resuming restarts the grid from the current instant rather than
//! replaying the polls that were missed while paused.
//!
//! # Integration
//!
//! The scheduler is designed to sit inside the controller's
//! `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(delta) = desired_rx.recv() => { /* encode and write */ }
//!         _ = scheduler.wait_for_poll() => {
//!             controller.poll_once()?;
//!             scheduler.record_poll_end();
//!         }
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a poll fires late.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollPolicy {
    /// Forget the missed deadlines and schedule from now.
    #[default]
    Skip,
    /// Keep the original cadence; the next poll fires at its
    /// originally scheduled time even if that is already past.
    Drop,
}

/// Full configuration for the poll scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Time between polls.
    pub interval: Duration,
    /// Overrun handling policy.
    pub policy: PollPolicy,
    /// A warning is logged when a poll cycle takes more than this
    /// fraction of the interval. Default: 0.80.
    pub budget_warn_threshold: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(450),
            policy: PollPolicy::default(),
            budget_warn_threshold: 0.80,
        }
    }
}

impl PollConfig {
    /// Shortest interval accepted.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

    /// A config polling every `interval`.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Polls at 90% of the serial read timeout so a poll never lands
    /// exactly on the driver's own timeout.
    pub fn from_read_timeout(timeout: Duration) -> Self {
        Self::with_interval(timeout.mul_f64(0.9))
    }

    /// Clamps out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_secs_f64() * 1000.0,
                "poll interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }
}

// ---------------------------------------------------------------------------
// Poll info / metrics
// ---------------------------------------------------------------------------

/// Information about a poll, returned by [`PollScheduler::wait_for_poll`].
#[derive(Debug, Clone)]
pub struct PollInfo {
    /// Monotonically increasing poll number (starts at 1).
    pub poll: u64,
    /// `true` if this poll fired more than 10% of an interval late.
    pub overrun: bool,
    /// Whole intervals missed (0 in normal operation).
    pub polls_skipped: u64,
}

/// Runtime metrics for the poll scheduler.
#[derive(Debug, Clone, Default)]
pub struct PollMetrics {
    pub total_polls: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Exponential moving average of poll-cycle time (α = 0.1).
    pub avg_poll_time: Duration,
    pub max_poll_time: Duration,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-interval poll scheduler. One per connection.
pub struct PollScheduler {
    config: PollConfig,
    poll_count: u64,
    next_poll: TokioInstant,
    /// Set by `wait_for_poll`, consumed by `record_poll_end`.
    poll_start: Option<Instant>,
    paused: bool,
    metrics: PollMetrics,
}

impl PollScheduler {
    /// Creates a scheduler; the first poll is due one interval from now.
    pub fn new(config: PollConfig) -> Self {
        let config = config.validated();
        debug!(
            interval_ms = config.interval.as_secs_f64() * 1000.0,
            policy = ?config.policy,
            "poll scheduler created"
        );
        Self {
            next_poll: TokioInstant::now() + config.interval,
            config,
            poll_count: 0,
            poll_start: None,
            paused: false,
            metrics: PollMetrics::default(),
        }
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self::new(PollConfig::with_interval(interval))
    }

    /// Waits until the next poll is due.
    ///
    /// While paused this future pends forever so `tokio::select!` keeps
    /// serving its other branches.
    pub async fn wait_for_poll(&mut self) -> PollInfo {
        if self.paused {
            std::future::pending::<()>().await;
        }

        let next = self.next_poll;
        let interval = self.config.interval;
        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.poll_count += 1;
        self.poll_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > interval / 10;
        let mut polls_skipped = 0u64;

        self.next_poll = match self.config.policy {
            PollPolicy::Skip => {
                if overrun {
                    polls_skipped = (late_by.as_nanos() / interval.as_nanos()) as u64;
                    if polls_skipped > 0 {
                        warn!(
                            poll = self.poll_count,
                            skipped = polls_skipped,
                            late_ms = late_by.as_secs_f64() * 1000.0,
                            "poll overrun, skipping ahead"
                        );
                    }
                }
                now + interval
            }
            PollPolicy::Drop => {
                if overrun {
                    warn!(
                        poll = self.poll_count,
                        late_ms = late_by.as_secs_f64() * 1000.0,
                        "poll overrun, keeping original cadence"
                    );
                }
                next + interval
            }
        };

        if overrun {
            self.metrics.total_overruns += 1;
        }
        self.metrics.total_skipped += polls_skipped;
        self.metrics.total_polls += 1;

        trace!(poll = self.poll_count, overrun, "poll fired");

        PollInfo {
            poll: self.poll_count,
            overrun,
            polls_skipped,
        }
    }

    /// Records that the work for the current poll has finished.
    pub fn record_poll_end(&mut self) {
        let Some(start) = self.poll_start.take() else {
            return;
        };
        let elapsed = start.elapsed();

        let utilization = elapsed.as_secs_f64() / self.config.interval.as_secs_f64();
        if utilization >= self.config.budget_warn_threshold {
            warn!(
                poll = self.poll_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                utilization_pct = format!("{:.1}", utilization * 100.0),
                "poll cycle approaching interval"
            );
        }

        if elapsed > self.metrics.max_poll_time {
            self.metrics.max_poll_time = elapsed;
        }
        let alpha = 0.1;
        let prev = self.metrics.avg_poll_time.as_secs_f64();
        self.metrics.avg_poll_time =
            Duration::from_secs_f64(prev * (1.0 - alpha) + elapsed.as_secs_f64() * alpha);
    }

    /// Stops polling until [`resume`](Self::resume). Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(poll = self.poll_count, "poll scheduler paused");
        }
    }

    /// Resumes polling one interval from now.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.next_poll = TokioInstant::now() + self.config.interval;
            debug!(poll = self.poll_count, "poll scheduler resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn poll_count(&self) -> u64 {
        self.poll_count
    }

    pub fn metrics(&self) -> &PollMetrics {
        &self.metrics
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }
}
