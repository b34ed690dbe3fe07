//! Progress sink trait and implementations.

use serde::Serialize;
use tracing::{debug, info, Level};

use crate::core::{StageKey, StageMap};
use crate::pipeline::ControlState;

/// A progress notification from a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Stage data changed.
    StageUpdated {
        /// Correlation id of the run.
        request_id: String,
        /// The focal stage.
        active: StageKey,
        /// Snapshot of all stages.
        stages: StageMap,
    },
    /// The triggering control changed state.
    ControlChanged {
        /// The new state.
        state: ControlState,
    },
    /// The stream failed and the fallback request is being sent.
    FallbackStarted {
        /// Correlation id of the run.
        request_id: String,
        /// Why the stream attempt failed.
        reason: String,
    },
    /// The rendered document was stored for the work item.
    ArtifactUploaded {
        /// The work item id.
        target_id: String,
        /// The stored file name.
        filename: String,
    },
    /// A best-effort step failed.
    StepFailed {
        /// The step name.
        step: String,
        /// The failure message.
        message: String,
    },
}

impl ProgressEvent {
    /// Returns the dotted event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::StageUpdated { .. } => "stage.updated",
            Self::ControlChanged { .. } => "control.changed",
            Self::FallbackStarted { .. } => "fallback.started",
            Self::ArtifactUploaded { .. } => "artifact.uploaded",
            Self::StepFailed { .. } => "step.failed",
        }
    }
}

/// Receives progress notifications.
///
/// Implementations must not block and must not fail; a UI layer typically
/// copies the event into its own state.
pub trait ProgressSink: Send + Sync {
    /// Handles one event.
    fn emit(&self, event: &ProgressEvent);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgressSink;

impl ProgressSink for NoOpProgressSink {
    fn emit(&self, _event: &ProgressEvent) {
        // Intentionally empty - discards all events
    }
}

/// A sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingProgressSink {
    level: Level,
}

impl Default for LoggingProgressSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingProgressSink {
    /// Creates a logging sink with the specified level.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl ProgressSink for LoggingProgressSink {
    fn emit(&self, event: &ProgressEvent) {
        let event_type = event.event_type();
        match event {
            ProgressEvent::StageUpdated { request_id, active, .. } => {
                if self.level == Level::DEBUG {
                    debug!(event_type, %request_id, active = %active, "Progress: {}", event_type);
                } else {
                    info!(event_type, %request_id, active = %active, "Progress: {}", event_type);
                }
            }
            other => {
                if self.level == Level::DEBUG {
                    debug!(event_type, event = ?other, "Progress: {}", event_type);
                } else {
                    info!(event_type, event = ?other, "Progress: {}", event_type);
                }
            }
        }
    }
}

/// A collecting sink for tests and headless callers.
#[derive(Debug, Default)]
pub struct CollectingProgressSink {
    events: parking_lot::RwLock<Vec<ProgressEvent>>,
}

impl CollectingProgressSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events whose type starts with a prefix.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<ProgressEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type().starts_with(type_prefix))
            .cloned()
            .collect()
    }

    /// Returns every control state reported, in order.
    #[must_use]
    pub fn control_states(&self) -> Vec<ControlState> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::ControlChanged { state } => Some(state.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for CollectingProgressSink {
    fn emit(&self, event: &ProgressEvent) {
        self.events.write().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploaded() -> ProgressEvent {
        ProgressEvent::ArtifactUploaded {
            target_id: "jd-1".to_string(),
            filename: "a.pdf".to_string(),
        }
    }

    #[test]
    fn test_noop_and_logging_sinks() {
        NoOpProgressSink.emit(&uploaded());
        LoggingProgressSink::default().emit(&uploaded());
        LoggingProgressSink::debug().emit(&ProgressEvent::StageUpdated {
            request_id: "r".to_string(),
            active: StageKey::Review,
            stages: StageMap::new(),
        });
        // Should not panic
    }

    #[test]
    fn test_collecting_sink_filter() {
        let sink = CollectingProgressSink::new();
        assert!(sink.is_empty());

        sink.emit(&uploaded());
        sink.emit(&ProgressEvent::ControlChanged {
            state: ControlState::Idle,
        });
        sink.emit(&ProgressEvent::StepFailed {
            step: "upload".to_string(),
            message: "503".to_string(),
        });

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events_of_type("artifact.").len(), 1);
        assert_eq!(sink.control_states(), vec![ControlState::Idle]);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let json = serde_json::to_value(uploaded()).unwrap();
        assert_eq!(json["type"], "artifact_uploaded");
        assert_eq!(json["target_id"], "jd-1");
    }
}
