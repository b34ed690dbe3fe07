//! Caller-visible run state and countdown.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::errors::{GenflowError, RunPhase};

/// The state of the control that triggered a run.
///
/// A run always ends in `Succeeded` or `Failed`, never in `InProgress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ControlState {
    /// No run has started.
    Idle,
    /// A run is active.
    InProgress {
        /// Seconds left on the countdown.
        remaining_secs: u64,
    },
    /// The document was delivered.
    Succeeded {
        /// The delivered file name.
        filename: String,
    },
    /// The run failed.
    Failed {
        /// The phase that failed.
        phase: RunPhase,
        /// A message naming the failure.
        message: String,
    },
}

impl ControlState {
    /// Builds the failed state for an error.
    #[must_use]
    pub fn failed(error: &GenflowError) -> Self {
        Self::Failed {
            phase: error.phase(),
            message: error.to_string(),
        }
    }

    /// Returns true while the control should stay disabled.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::InProgress { .. })
    }

    /// Returns true for `Succeeded` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

/// Countdown shown while a run is active.
///
/// The displayed value never drops below one second while the run is still
/// going; expiry is what aborts the transport.
#[derive(Debug, Clone, Copy)]
pub struct Countdown {
    total: Duration,
    started: Instant,
}

impl Countdown {
    /// Starts a countdown now.
    #[must_use]
    pub fn start(total: Duration) -> Self {
        Self {
            total,
            started: Instant::now(),
        }
    }

    /// Starts the same duration over from now.
    ///
    /// Used when the fallback request takes over from an expired stream.
    pub fn restart(&mut self) {
        self.started = Instant::now();
    }

    /// The configured total duration.
    #[must_use]
    pub const fn total(&self) -> Duration {
        self.total
    }

    /// The instant at which the countdown expires.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.started + self.total
    }

    /// Time left before expiry.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.started.elapsed())
    }

    /// Whole seconds left for display, floored at one.
    #[must_use]
    pub fn remaining_secs(&self) -> u64 {
        let remaining = self.remaining();
        let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        secs.max(1)
    }

    /// Returns true once the countdown has run out.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.started.elapsed() >= self.total
    }

    /// The state to show while this countdown runs.
    #[must_use]
    pub fn control_state(&self) -> ControlState {
        ControlState::InProgress {
            remaining_secs: self.remaining_secs(),
        }
    }
}
