//! Collaborator seams of a generation run.
//!
//! The coordinator and orchestrator depend only on these traits; the HTTP,
//! filesystem and in-memory adapters live in [`crate::adapters`].

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::core::{FallbackRequest, WorkflowRequest};
use crate::errors::{GenflowError, TransportError};
use crate::stream::ByteStream;

/// Format used when the profile names none.
pub const DEFAULT_FORMAT: &str = "A4";

/// Prefix of the key the final experience text is stored under.
pub const EXPERIENCE_KEY_PREFIX: &str = "genflow:experience:";

/// Returns the key-value key for a work item's experience text.
#[must_use]
pub fn experience_key(target_id: &str) -> String {
    format!("{EXPERIENCE_KEY_PREFIX}{target_id}")
}

/// The generation backend: streaming and non-streaming endpoints.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Opens the event stream for a request.
    ///
    /// Non-success statuses and connection failures are transport errors.
    async fn open_stream(&self, request: &WorkflowRequest) -> Result<ByteStream, TransportError>;

    /// Sends the single non-streaming request and returns its JSON body.
    async fn generate(&self, request: &FallbackRequest) -> Result<serde_json::Value, TransportError>;
}

/// Body of a render request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    /// The candidate profile (review output when available).
    pub profile_data: serde_json::Value,
    /// Final experience text.
    pub final_experience_text: String,
    /// Page format, e.g. `A4`.
    pub format_preference: String,
    /// Role title of the work item.
    pub title_hint: String,
}

/// A rendered binary document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    /// Document bytes.
    pub bytes: Bytes,
    /// MIME type reported by the renderer.
    pub content_type: String,
}

impl RenderedDocument {
    /// Creates a PDF document.
    #[must_use]
    pub fn pdf(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: "application/pdf".to_string(),
        }
    }

    /// Returns the document size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the document is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A document upload to durable per-item storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactUpload {
    /// The work item id.
    pub target_id: String,
    /// Owner of the work item.
    pub owner_id: Option<String>,
    /// File name of the document.
    pub filename: String,
    /// The document.
    pub document: RenderedDocument,
}

/// Experience metadata saved for a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceRecord {
    /// The work item id.
    pub target_id: String,
    /// Owner of the work item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Final experience text.
    pub final_experience_text: String,
    /// Role classification.
    pub role_classification: String,
    /// When the record was produced, RFC 3339.
    #[serde(default)]
    pub generated_at: String,
}

/// Renders a document from the final result.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Renders the document; failures are fatal for the run.
    async fn render(&self, request: &RenderRequest) -> Result<RenderedDocument, GenflowError>;
}

/// Hands a rendered document to the user.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Delivers the document under `filename`.
    async fn deliver(&self, filename: &str, document: &RenderedDocument) -> Result<(), GenflowError>;
}

/// Durable per-item document storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Uploads (or replaces) the document of a work item.
    async fn upload(&self, upload: &ArtifactUpload) -> Result<(), GenflowError>;
}

/// Persists experience metadata.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Upserts the record of a work item.
    async fn save(&self, record: &ExperienceRecord) -> Result<(), GenflowError>;
}

/// A string key-value store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Writes one key, leaving every other key untouched.
    async fn put(&self, key: &str, value: &str) -> Result<(), GenflowError>;

    /// Reads one key.
    async fn get(&self, key: &str) -> Result<Option<String>, GenflowError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_experience_key() {
        assert_eq!(experience_key("jd-42"), "genflow:experience:jd-42");
    }

    #[test]
    fn test_render_request_wire_names() {
        let request = RenderRequest {
            profile_data: serde_json::json!({"fullName": "Ada"}),
            final_experience_text: "text".to_string(),
            format_preference: DEFAULT_FORMAT.to_string(),
            title_hint: "SRE".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["finalExperienceText"], "text");
        assert_eq!(json["formatPreference"], "A4");
        assert_eq!(json["titleHint"], "SRE");
    }

    #[test]
    fn test_experience_record_omits_missing_owner() {
        let record = ExperienceRecord {
            target_id: "jd-1".to_string(),
            owner_id: None,
            final_experience_text: "t".to_string(),
            role_classification: "r".to_string(),
            generated_at: "2026-01-01T00:00:00.000000+00:00".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("ownerId").is_none());
        assert_eq!(json["targetId"], "jd-1");
        assert_eq!(json["generatedAt"], "2026-01-01T00:00:00.000000+00:00");
    }
}
