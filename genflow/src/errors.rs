//! Error types for genflow.
//!
//! Fatal failures surface as [`GenflowError`] and carry a [`RunPhase`] so
//! callers can tell a rejected input from a dead transport from a failed
//! render. Protocol and best-effort failures are logged where they happen and
//! never reach this type.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The phase of a run a fatal error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// The trigger or result did not satisfy a precondition.
    Validation,
    /// The pipeline itself reported failure.
    Generation,
    /// Both the stream and the fallback request failed.
    Transport,
    /// The document could not be rendered.
    Render,
    /// The rendered document could not be delivered.
    Delivery,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Generation => write!(f, "generation"),
            Self::Transport => write!(f, "transport"),
            Self::Render => write!(f, "render"),
            Self::Delivery => write!(f, "delivery"),
        }
    }
}

/// A network or HTTP failure before the stream reached a terminal event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request could not be sent or the connection dropped.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The (possibly truncated) response body.
        body: String,
    },

    /// The stream ended before a `done` or `error` event.
    #[error("stream ended before a terminal event")]
    Incomplete,

    /// The countdown expired and the connection was aborted.
    #[error("timed out after {0}s")]
    Timeout(u64),

    /// The frame buffer grew past its limit without a delimiter.
    #[error("frame buffer exceeded {0} bytes")]
    BufferOverflow(usize),

    /// The response body could not be decoded.
    #[error("invalid response body: {0}")]
    InvalidBody(String),
}

/// The main error type for genflow operations.
#[derive(Debug, Error)]
pub enum GenflowError {
    /// A transport failure (pre-fallback).
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The pipeline reported an explicit error event.
    #[error("Generation failed at stage {stage}: {message}")]
    Stage {
        /// The stage that was in progress, if any.
        stage: String,
        /// The message carried by the error event.
        message: String,
    },

    /// The stream and the single fallback attempt both failed.
    #[error("Generation failed: stream error ({stream}); fallback error ({fallback})")]
    Fallback {
        /// Why the stream attempt failed.
        stream: String,
        /// Why the fallback attempt failed.
        fallback: String,
    },

    /// The document render step failed.
    #[error("Document render failed: {0}")]
    Render(String),

    /// The rendered document could not be delivered.
    #[error("Document delivery failed: {0}")]
    Delivery(String),

    /// A best-effort step failed. Never surfaced by the orchestrator.
    #[error("Best-effort step '{step}' failed: {message}")]
    BestEffort {
        /// The step name.
        step: String,
        /// The failure message.
        message: String,
    },

    /// A precondition was not met.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GenflowError {
    /// Creates a stage error.
    #[must_use]
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Creates a combined fallback error.
    #[must_use]
    pub fn fallback(stream: impl fmt::Display, fallback: impl fmt::Display) -> Self {
        Self::Fallback {
            stream: stream.to_string(),
            fallback: fallback.to_string(),
        }
    }

    /// Creates a best-effort error.
    #[must_use]
    pub fn best_effort(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BestEffort {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Returns the run phase this error is attributed to.
    #[must_use]
    pub const fn phase(&self) -> RunPhase {
        match self {
            Self::Stage { .. } => RunPhase::Generation,
            Self::Transport(_) | Self::Fallback { .. } => RunPhase::Transport,
            Self::Render(_) => RunPhase::Render,
            Self::Delivery(_) | Self::Io(_) => RunPhase::Delivery,
            Self::BestEffort { .. }
            | Self::Precondition(_)
            | Self::Config(_)
            | Self::Serialization(_) => RunPhase::Validation,
        }
    }

    /// Returns true if this error class never changes the caller outcome.
    #[must_use]
    pub const fn is_best_effort(&self) -> bool {
        matches!(self, Self::BestEffort { .. })
    }
}

impl From<serde_json::Error> for GenflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_error_mentions_both_failures() {
        let err = GenflowError::fallback(TransportError::Incomplete, "HTTP 502");
        let msg = err.to_string();
        assert!(msg.contains("stream ended before a terminal event"));
        assert!(msg.contains("HTTP 502"));
        assert_eq!(err.phase(), RunPhase::Transport);
    }

    #[test]
    fn test_phase_attribution() {
        assert_eq!(
            GenflowError::stage("experience", "rate limited").phase(),
            RunPhase::Generation
        );
        assert_eq!(GenflowError::Render("boom".into()).phase(), RunPhase::Render);
        assert_eq!(
            GenflowError::Precondition("x".into()).phase(),
            RunPhase::Validation
        );
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Status {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 503: unavailable");
        assert_eq!(TransportError::Timeout(180).to_string(), "timed out after 180s");
    }

    #[test]
    fn test_best_effort_flag() {
        assert!(GenflowError::best_effort("upload", "503").is_best_effort());
        assert!(!GenflowError::Render("x".into()).is_best_effort());
    }

    #[test]
    fn test_serde_error_conversion() {
        let err: GenflowError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, GenflowError::Serialization(_)));
    }
}
