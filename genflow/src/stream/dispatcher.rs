//! Maps protocol events onto state-machine transitions.

use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::payload::{self, CompletionPayload};
use super::SseFrame;
use crate::core::{StageFields, StageKey, WorkflowResult};
use crate::events::{ProgressEvent, ProgressSink};
use crate::pipeline::StageMachine;

/// A recognized protocol event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// The pipeline started.
    Start,
    /// One stage finished with its output.
    StageResult {
        /// The stage.
        stage: StageKey,
        /// The extracted output.
        fields: StageFields,
    },
    /// Partial output of a running stage.
    Chunk {
        /// The stage, when named; otherwise the running stage.
        stage: Option<StageKey>,
        /// The partial text.
        content: String,
    },
    /// The pipeline finished.
    Done(CompletionPayload),
    /// The pipeline failed.
    Error {
        /// The failure message.
        message: String,
    },
    /// Any other event name.
    Unknown(String),
}

impl ProtocolEvent {
    /// Decodes a frame into a protocol event.
    #[must_use]
    pub fn from_frame(frame: &SseFrame) -> Self {
        let body = &frame.data;
        match frame.event.as_str() {
            "start" => Self::Start,
            "done" => Self::Done(CompletionPayload::parse(body)),
            "error" => Self::Error {
                message: payload::error_message(body),
            },
            "chunk" | "stage_chunk" | "content_chunk" => payload::chunk_content(body).map_or_else(
                || Self::Unknown(frame.event.clone()),
                |content| Self::Chunk {
                    stage: payload::chunk_stage(body),
                    content,
                },
            ),
            name => match name.parse::<StageKey>() {
                Ok(stage) => Self::StageResult {
                    stage,
                    fields: payload::stage_fields(stage, body),
                },
                Err(_) => Self::Unknown(name.to_string()),
            },
        }
    }
}

/// Where a dispatched stream stands.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// No terminal event yet.
    Running,
    /// A `done` event arrived.
    Done(WorkflowResult),
    /// An `error` event arrived.
    Failed {
        /// The stage that was in progress.
        stage: Option<StageKey>,
        /// The message carried by the event.
        message: String,
    },
}

impl DispatchOutcome {
    /// Returns true once a terminal event was applied.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Applies events to a state machine strictly in delivery order.
pub struct EventDispatcher {
    machine: StageMachine,
    request_id: String,
    sink: Arc<dyn ProgressSink>,
    outcome: DispatchOutcome,
    stage_events: usize,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("request_id", &self.request_id)
            .field("active", &self.machine.active_stage())
            .field("outcome", &self.outcome)
            .field("stage_events", &self.stage_events)
            .finish()
    }
}

impl EventDispatcher {
    /// Creates a dispatcher that owns `machine` for one run.
    #[must_use]
    pub fn new(machine: StageMachine, request_id: impl Into<String>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            machine,
            request_id: request_id.into(),
            sink,
            outcome: DispatchOutcome::Running,
            stage_events: 0,
        }
    }

    /// Decodes and applies one frame.
    ///
    /// Breaks once a terminal event has been applied.
    pub fn dispatch(&mut self, frame: SseFrame) -> ControlFlow<()> {
        debug!(request_id = %self.request_id, event = %frame.event, "Dispatching frame");
        self.apply(ProtocolEvent::from_frame(&frame))
    }

    /// Applies one protocol event.
    pub fn apply(&mut self, event: ProtocolEvent) -> ControlFlow<()> {
        if self.outcome.is_terminal() {
            warn!(request_id = %self.request_id, ?event, "Ignoring event after terminal event");
            return ControlFlow::Break(());
        }

        let changed = match event {
            ProtocolEvent::Start => self.machine.activate(StageKey::Classification),
            ProtocolEvent::StageResult { stage, fields } => {
                self.stage_events += 1;
                info!(request_id = %self.request_id, stage = %stage, "Stage completed");
                self.machine.complete_stage(stage, fields)
            }
            ProtocolEvent::Chunk { stage, content } => {
                match stage.or_else(|| self.machine.in_progress()) {
                    Some(key) => self.machine.append_stream_content(key, &content),
                    None => false,
                }
            }
            ProtocolEvent::Done(payload) => {
                self.finish(payload);
                true
            }
            ProtocolEvent::Error { message } => {
                let stage = self.machine.mark_error(message.clone());
                warn!(request_id = %self.request_id, stage = ?stage, %message, "Pipeline reported an error");
                self.outcome = DispatchOutcome::Failed { stage, message };
                true
            }
            ProtocolEvent::Unknown(name) => {
                debug!(request_id = %self.request_id, event = %name, "Ignoring unknown event");
                false
            }
        };

        if changed {
            self.emit_snapshot();
        }
        if self.outcome.is_terminal() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    fn finish(&mut self, payload: CompletionPayload) {
        let CompletionPayload {
            final_completion,
            final_experience_text,
            role_classification,
            steps,
        } = payload;

        if let Some(fields) = final_completion.clone() {
            self.machine.complete_stage(StageKey::Review, fields);
        }

        let summary = match steps {
            Some(mut steps) => {
                if let Some(fields) = final_completion {
                    steps.entry(StageKey::Review).or_insert(fields);
                }
                steps
            }
            None => {
                debug!(request_id = %self.request_id, "Done without summary; reconciling from recorded stages");
                self.machine.recorded_summary()
            }
        };
        self.machine.apply_summary(summary);

        let result = WorkflowResult::from_stages(
            self.machine.snapshot(),
            final_experience_text,
            role_classification,
        );
        info!(
            request_id = %self.request_id,
            stage_events = self.stage_events,
            "Stream completed"
        );
        self.outcome = DispatchOutcome::Done(result);
    }

    fn emit_snapshot(&self) {
        self.sink.emit(&ProgressEvent::StageUpdated {
            request_id: self.request_id.clone(),
            active: self.machine.active_stage(),
            stages: self.machine.snapshot(),
        });
    }

    /// Returns the current outcome.
    #[must_use]
    pub const fn outcome(&self) -> &DispatchOutcome {
        &self.outcome
    }

    /// Number of per-stage result events applied.
    #[must_use]
    pub const fn stage_events_seen(&self) -> usize {
        self.stage_events
    }

    /// Read access to the state machine.
    #[must_use]
    pub const fn machine(&self) -> &StageMachine {
        &self.machine
    }

    /// Returns the machine and outcome, ending the dispatcher.
    #[must_use]
    pub fn into_parts(self) -> (StageMachine, DispatchOutcome) {
        (self.machine, self.outcome)
    }
}
