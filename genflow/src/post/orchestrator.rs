//! Downstream actions once a final result exists.

use std::sync::Arc;
use tracing::{error, info, warn};

use super::filename::document_filename;
use crate::core::{TriggerInput, WorkflowResult, PROFILE_FORMAT_FIELD, PROFILE_NAME_FIELD};
use crate::errors::GenflowError;
use crate::events::{NoOpProgressSink, ProgressEvent, ProgressSink};
use crate::observability::PhaseTimer;
use crate::utils::iso_timestamp;
use crate::ports::{
    experience_key, ArtifactStore, ArtifactUpload, DocumentRenderer, DocumentSink,
    ExperienceRecord, KeyValueStore, MetadataStore, RenderRequest, RenderedDocument,
    DEFAULT_FORMAT,
};

/// What the post-generation chain did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// The delivered file name.
    pub filename: String,
    /// Size of the delivered document.
    pub document_bytes: usize,
    /// Whether the best-effort upload succeeded.
    pub uploaded: bool,
    /// Whether the best-effort metadata save succeeded.
    pub metadata_saved: bool,
}

/// Runs cache, render, delivery, upload and metadata save in order.
///
/// Render and delivery failures end the chain; upload and metadata save are
/// best-effort and run concurrently after delivery.
pub struct PostGenerationOrchestrator {
    cache: Arc<dyn KeyValueStore>,
    renderer: Arc<dyn DocumentRenderer>,
    sink: Arc<dyn DocumentSink>,
    artifacts: Arc<dyn ArtifactStore>,
    metadata: Arc<dyn MetadataStore>,
    progress: Arc<dyn ProgressSink>,
}

impl std::fmt::Debug for PostGenerationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostGenerationOrchestrator").finish_non_exhaustive()
    }
}

impl PostGenerationOrchestrator {
    /// Creates an orchestrator over its collaborators.
    #[must_use]
    pub fn new(
        cache: Arc<dyn KeyValueStore>,
        renderer: Arc<dyn DocumentRenderer>,
        sink: Arc<dyn DocumentSink>,
        artifacts: Arc<dyn ArtifactStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            cache,
            renderer,
            sink,
            artifacts,
            metadata,
            progress: Arc::new(NoOpProgressSink),
        }
    }

    /// Sets the progress sink.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Runs the chain for one result.
    ///
    /// Re-running repeats every step; cache, upload and metadata writes are
    /// upserts.
    pub async fn run(
        &self,
        trigger: &TriggerInput,
        result: &WorkflowResult,
    ) -> Result<DeliveryReport, GenflowError> {
        if !result.has_final_fields() {
            return Err(GenflowError::Precondition(
                "result is missing final experience text or role classification".to_string(),
            ));
        }

        let target_id = trigger.target_id.as_str();
        let profile = result
            .final_profile
            .as_ref()
            .filter(|p| p.is_object())
            .unwrap_or(&trigger.profile_data);

        self.cache
            .put(&experience_key(target_id), &result.final_experience_text)
            .await?;

        let format_preference = profile
            .get(PROFILE_FORMAT_FIELD)
            .and_then(serde_json::Value::as_str)
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(DEFAULT_FORMAT)
            .to_string();
        let request = RenderRequest {
            profile_data: profile.clone(),
            final_experience_text: result.final_experience_text.clone(),
            format_preference,
            title_hint: trigger.title.clone(),
        };

        let timer = PhaseTimer::start("render");
        let document = self.renderer.render(&request).await.map_err(|e| {
            let e = match e {
                GenflowError::Render(_) => e,
                other => GenflowError::Render(other.to_string()),
            };
            error!(target_id, error = %e, "Document render failed");
            e
        })?;
        info!(
            target_id,
            bytes = document.len(),
            duration_ms = timer.elapsed_ms(),
            "Document rendered"
        );

        let name = profile
            .get(PROFILE_NAME_FIELD)
            .and_then(serde_json::Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| trigger.person_name());
        let filename = document_filename(name, &trigger.organization, &trigger.title);

        self.sink.deliver(&filename, &document).await.map_err(|e| {
            let e = match e {
                GenflowError::Delivery(_) => e,
                other => GenflowError::Delivery(other.to_string()),
            };
            error!(target_id, %filename, error = %e, "Document delivery failed");
            e
        })?;
        info!(target_id, %filename, "Document delivered");

        let (uploaded, metadata_saved) = tokio::join!(
            self.upload(trigger, &filename, &document),
            self.save_metadata(trigger, result)
        );

        Ok(DeliveryReport {
            filename,
            document_bytes: document.len(),
            uploaded,
            metadata_saved,
        })
    }

    async fn upload(&self, trigger: &TriggerInput, filename: &str, document: &RenderedDocument) -> bool {
        let upload = ArtifactUpload {
            target_id: trigger.target_id.clone(),
            owner_id: trigger.owner_id.clone(),
            filename: filename.to_string(),
            document: document.clone(),
        };
        match self.artifacts.upload(&upload).await {
            Ok(()) => {
                info!(target_id = %trigger.target_id, filename, "Document uploaded");
                self.progress.emit(&ProgressEvent::ArtifactUploaded {
                    target_id: trigger.target_id.clone(),
                    filename: filename.to_string(),
                });
                true
            }
            Err(e) => {
                self.best_effort_failed("upload", &e);
                false
            }
        }
    }

    async fn save_metadata(&self, trigger: &TriggerInput, result: &WorkflowResult) -> bool {
        let record = ExperienceRecord {
            target_id: trigger.target_id.clone(),
            owner_id: trigger.owner_id.clone(),
            final_experience_text: result.final_experience_text.clone(),
            role_classification: result.role_classification.clone(),
            generated_at: iso_timestamp(),
        };
        match self.metadata.save(&record).await {
            Ok(()) => true,
            Err(e) => {
                self.best_effort_failed("metadata_save", &e);
                false
            }
        }
    }

    fn best_effort_failed(&self, step: &str, cause: &GenflowError) {
        let e = GenflowError::best_effort(step, cause.to_string());
        warn!(step, error = %e, "Best-effort step failed");
        self.progress.emit(&ProgressEvent::StepFailed {
            step: step.to_string(),
            message: cause.to_string(),
        });
    }
}
