//! Single non-streaming retry after a failed stream.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use super::StageMachine;
use crate::core::{StageKey, WorkflowRequest, WorkflowResult};
use crate::errors::{GenflowError, TransportError};
use crate::ports::GenerationBackend;
use crate::stream::{payload, CompletionPayload};

/// Recovers a run whose stream failed before a terminal event.
///
/// Exactly one request is sent; there is no backoff and no second retry.
pub struct FallbackCoordinator {
    backend: Arc<dyn GenerationBackend>,
}

impl std::fmt::Debug for FallbackCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackCoordinator").finish_non_exhaustive()
    }
}

impl FallbackCoordinator {
    /// Creates a coordinator over a backend.
    #[must_use]
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    /// Sends the fallback request and reconciles `machine` from its summary.
    ///
    /// Any failure is reported together with `stream_error` as one
    /// [`GenflowError::Fallback`].
    pub async fn recover(
        &self,
        request: &WorkflowRequest,
        stream_error: &TransportError,
        machine: &mut StageMachine,
    ) -> Result<WorkflowResult, GenflowError> {
        info!(request_id = %request.request_id, reason = %stream_error, "Stream failed; sending fallback request");

        let body = self
            .backend
            .generate(&request.to_fallback())
            .await
            .map_err(|e| {
                warn!(request_id = %request.request_id, error = %e, "Fallback request failed");
                GenflowError::fallback(stream_error, e)
            })?;

        let completion = parse_response(&body).map_err(|message| {
            warn!(request_id = %request.request_id, %message, "Fallback reported failure");
            GenflowError::fallback(stream_error, message)
        })?;

        let CompletionPayload {
            final_completion,
            final_experience_text,
            role_classification,
            steps,
        } = completion;

        let mut summary = steps.unwrap_or_default();
        if let Some(fields) = final_completion {
            summary.entry(StageKey::Review).or_insert(fields);
        }
        if !machine.apply_summary(summary) {
            return Err(GenflowError::fallback(
                stream_error,
                "run was halted before reconciliation",
            ));
        }

        info!(request_id = %request.request_id, "Fallback succeeded");
        Ok(WorkflowResult::from_stages(
            machine.snapshot(),
            final_experience_text,
            role_classification,
        ))
    }
}

/// Interprets a fallback response body.
///
/// Only `success: true` counts as success; the error message otherwise comes
/// from `error`/`message`.
pub fn parse_response(body: &Value) -> Result<CompletionPayload, String> {
    if !body.is_object() {
        return Err("fallback response is not a JSON object".to_string());
    }
    match body.get("success").and_then(Value::as_bool) {
        Some(true) => Ok(CompletionPayload::parse(body)),
        Some(false) => Err(payload::error_message(body)),
        None => Err("fallback response has no success flag".to_string()),
    }
}
