//! Entry point that owns one generation run end to end.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::{ControlState, Countdown, FallbackCoordinator, StageMachine};
use crate::config::GenflowConfig;
use crate::core::{StageKey, TriggerInput, WorkflowRequest, WorkflowResult};
use crate::errors::{GenflowError, TransportError};
use crate::events::{NoOpProgressSink, ProgressEvent, ProgressSink};
use crate::observability::PhaseTimer;
use crate::ports::GenerationBackend;
use crate::post::{DeliveryReport, PostGenerationOrchestrator};
use crate::stream::{read_frames, DispatchOutcome, EventDispatcher, FrameParser, DEFAULT_MAX_BUFFER};
use crate::utils::generate_request_id;

/// Default countdown for a run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// A run that delivered its document.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Correlation id of the run.
    pub request_id: String,
    /// The generation result.
    pub result: WorkflowResult,
    /// What the post-generation chain did.
    pub delivery: DeliveryReport,
    /// True when the result came from the fallback request.
    pub used_fallback: bool,
}

enum StreamAttempt {
    Completed(WorkflowResult),
    Rejected {
        stage: Option<StageKey>,
        message: String,
    },
    Interrupted(StageMachine, TransportError),
}

/// Validates a trigger, streams, falls back once if needed, then delivers.
///
/// Each run builds a fresh [`StageMachine`]; overlapping runs are the
/// caller's concern.
pub struct WorkflowCoordinator {
    backend: Arc<dyn GenerationBackend>,
    fallback: FallbackCoordinator,
    orchestrator: PostGenerationOrchestrator,
    progress: Arc<dyn ProgressSink>,
    timeout: Duration,
    max_frame_buffer: usize,
}

impl std::fmt::Debug for WorkflowCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowCoordinator")
            .field("timeout", &self.timeout)
            .field("max_frame_buffer", &self.max_frame_buffer)
            .finish_non_exhaustive()
    }
}

impl WorkflowCoordinator {
    /// Creates a coordinator with the default countdown and buffer limit.
    #[must_use]
    pub fn new(backend: Arc<dyn GenerationBackend>, orchestrator: PostGenerationOrchestrator) -> Self {
        Self {
            fallback: FallbackCoordinator::new(backend.clone()),
            backend,
            orchestrator,
            progress: Arc::new(NoOpProgressSink),
            timeout: DEFAULT_TIMEOUT,
            max_frame_buffer: DEFAULT_MAX_BUFFER,
        }
    }

    /// Builds a coordinator wired to the HTTP backend, a filesystem sink in
    /// the configured download directory and the given cache.
    #[cfg(feature = "http")]
    pub fn from_config(
        config: &GenflowConfig,
        cache: Arc<dyn crate::ports::KeyValueStore>,
    ) -> Result<Self, GenflowError> {
        let http = Arc::new(crate::adapters::HttpBackend::new(config.clone())?);
        let orchestrator = PostGenerationOrchestrator::new(
            cache,
            http.clone(),
            Arc::new(crate::adapters::FileSystemSink::new(config.download_dir.clone())),
            http.clone(),
            http.clone(),
        );
        Ok(Self::new(http, orchestrator).with_config(config))
    }

    /// Applies the timeout and buffer limit of a configuration.
    #[must_use]
    pub fn with_config(mut self, config: &GenflowConfig) -> Self {
        self.timeout = config.timeout();
        self.max_frame_buffer = config.max_frame_buffer;
        self
    }

    /// Sets the countdown.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the progress sink for this coordinator and its orchestrator.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.orchestrator = self.orchestrator.with_progress(progress.clone());
        self.progress = progress;
        self
    }

    /// Runs one generation end to end.
    ///
    /// Always reports a terminal [`ControlState`] before returning.
    pub async fn run(&self, trigger: &TriggerInput) -> Result<RunOutcome, GenflowError> {
        let timer = PhaseTimer::start("run");
        let outcome = self.execute(trigger).await;
        let state = match &outcome {
            Ok(run) => {
                info!(
                    request_id = %run.request_id,
                    filename = %run.delivery.filename,
                    used_fallback = run.used_fallback,
                    duration_ms = timer.elapsed_ms(),
                    "Run succeeded"
                );
                ControlState::Succeeded {
                    filename: run.delivery.filename.clone(),
                }
            }
            Err(e) => {
                error!(target_id = %trigger.target_id, phase = %e.phase(), error = %e, "Run failed");
                ControlState::failed(e)
            }
        };
        self.set_control(state);
        outcome
    }

    async fn execute(&self, trigger: &TriggerInput) -> Result<RunOutcome, GenflowError> {
        trigger.validate()?;

        let request_id = generate_request_id();
        let mut countdown = Countdown::start(self.timeout);
        self.set_control(countdown.control_state());
        info!(%request_id, target_id = %trigger.target_id, "Starting generation run");

        let request = trigger.to_request(request_id.clone());
        let machine = StageMachine::started();
        self.emit_stages(&request_id, &machine);

        let attempt = self.stream(&request, machine, &countdown).await;
        let (result, used_fallback) = match attempt {
            StreamAttempt::Completed(result) => (result, false),
            StreamAttempt::Rejected { stage, message } => {
                let stage = stage.map_or("unknown", StageKey::as_str);
                return Err(GenflowError::stage(stage, message));
            }
            StreamAttempt::Interrupted(mut machine, stream_error) => {
                self.progress.emit(&ProgressEvent::FallbackStarted {
                    request_id: request_id.clone(),
                    reason: stream_error.to_string(),
                });
                countdown.restart();
                self.set_control(countdown.control_state());
                let result = tokio::time::timeout(
                    countdown.remaining(),
                    self.fallback.recover(&request, &stream_error, &mut machine),
                )
                .await
                .map_err(|_| {
                    GenflowError::fallback(
                        &stream_error,
                        TransportError::Timeout(countdown.total().as_secs()),
                    )
                })??;
                self.emit_stages(&request_id, &machine);
                (result, true)
            }
        };

        self.set_control(countdown.control_state());
        let delivery = self.orchestrator.run(trigger, &result).await?;

        Ok(RunOutcome {
            request_id,
            result,
            delivery,
            used_fallback,
        })
    }

    async fn stream(
        &self,
        request: &WorkflowRequest,
        machine: StageMachine,
        countdown: &Countdown,
    ) -> StreamAttempt {
        let mut dispatcher =
            EventDispatcher::new(machine, request.request_id.clone(), self.progress.clone());
        let mut parser = FrameParser::with_max_buffer(self.max_frame_buffer);

        let attempt = async {
            let stream = self.backend.open_stream(request).await?;
            read_frames(stream, &mut parser, |frame| dispatcher.dispatch(frame)).await
        };
        let read = tokio::time::timeout(countdown.remaining(), attempt)
            .await
            .unwrap_or_else(|_| Err(TransportError::Timeout(countdown.total().as_secs())));

        if parser.frames_dropped() > 0 {
            warn!(
                request_id = %request.request_id,
                dropped = parser.frames_dropped(),
                "Dropped malformed frames"
            );
        }

        let (machine, outcome) = dispatcher.into_parts();
        match (outcome, read) {
            (DispatchOutcome::Done(result), _) => StreamAttempt::Completed(result),
            (DispatchOutcome::Failed { stage, message }, _) => StreamAttempt::Rejected { stage, message },
            (DispatchOutcome::Running, Err(e)) => {
                warn!(request_id = %request.request_id, error = %e, "Stream transport failed");
                StreamAttempt::Interrupted(machine, e)
            }
            (DispatchOutcome::Running, Ok(())) => {
                warn!(request_id = %request.request_id, "Stream ended without a terminal event");
                StreamAttempt::Interrupted(machine, TransportError::Incomplete)
            }
        }
    }

    fn set_control(&self, state: ControlState) {
        self.progress.emit(&ProgressEvent::ControlChanged { state });
    }

    fn emit_stages(&self, request_id: &str, machine: &StageMachine) {
        self.progress.emit(&ProgressEvent::StageUpdated {
            request_id: request_id.to_string(),
            active: machine.active_stage(),
            stages: machine.snapshot(),
        });
    }
}
