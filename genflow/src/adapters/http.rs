//! `reqwest` implementation of the backend endpoints.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GenflowConfig;
use crate::core::{FallbackRequest, WorkflowRequest};
use crate::errors::{GenflowError, TransportError};
use crate::ports::{
    ArtifactStore, ArtifactUpload, DocumentRenderer, ExperienceRecord, GenerationBackend,
    MetadataStore, RenderRequest, RenderedDocument,
};
use crate::stream::{payload, ByteStream};

/// Longest error body kept in a [`TransportError::Status`].
const MAX_ERROR_BODY: usize = 512;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for every backend endpoint.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    config: GenflowConfig,
}

impl HttpBackend {
    /// Builds a client from a validated configuration.
    pub fn new(config: GenflowConfig) -> Result<Self, GenflowError> {
        config.validate()?;
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GenflowError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &GenflowConfig {
        &self.config
    }

    fn transport_error(&self, err: &reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.config.timeout_secs)
        } else {
            TransportError::Connection(err.to_string())
        }
    }

    async fn check_status(&self, response: Response) -> Result<Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        warn!(status = status.as_u16(), "Backend returned an error status");
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn open_stream(&self, request: &WorkflowRequest) -> Result<ByteStream, TransportError> {
        let url = self.config.url(&self.config.stream_path);
        debug!(%url, request_id = %request.request_id, "Opening generation stream");

        let response = self
            .client
            .post(&url)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        let response = self.check_status(response).await?;

        let timeout_secs = self.config.timeout_secs;
        Ok(response
            .bytes_stream()
            .map_err(move |e| {
                if e.is_timeout() {
                    TransportError::Timeout(timeout_secs)
                } else {
                    TransportError::Connection(e.to_string())
                }
            })
            .boxed())
    }

    async fn generate(&self, request: &FallbackRequest) -> Result<serde_json::Value, TransportError> {
        let url = self.config.url(&self.config.generate_path);
        debug!(%url, "Sending non-streaming generation request");

        let response = self
            .client
            .post(&url)
            .timeout(self.config.timeout())
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        let response = self.check_status(response).await?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| TransportError::InvalidBody(e.to_string()))
    }
}

#[async_trait]
impl DocumentRenderer for HttpBackend {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedDocument, GenflowError> {
        let url = self.config.url(&self.config.render_path);
        let response = self
            .client
            .post(&url)
            .timeout(self.config.timeout())
            .json(request)
            .send()
            .await
            .map_err(|e| GenflowError::Render(self.transport_error(&e).to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .map(|v| payload::error_message(&v))
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(GenflowError::Render(message));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/pdf")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GenflowError::Render(e.to_string()))?;
        Ok(RenderedDocument {
            bytes,
            content_type,
        })
    }
}

#[async_trait]
impl ArtifactStore for HttpBackend {
    async fn upload(&self, upload: &ArtifactUpload) -> Result<(), GenflowError> {
        let url = self.config.url(&self.config.upload_path);
        let part = Part::bytes(upload.document.bytes.to_vec())
            .file_name(upload.filename.clone())
            .mime_str("application/pdf")
            .map_err(|e| GenflowError::Transport(TransportError::InvalidBody(e.to_string())))?;
        let mut form = Form::new()
            .part("file", part)
            .text("targetId", upload.target_id.clone());
        if let Some(owner_id) = &upload.owner_id {
            form = form.text("ownerId", owner_id.clone());
        }

        let response = self
            .client
            .post(&url)
            .timeout(self.config.timeout())
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        self.check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for HttpBackend {
    async fn save(&self, record: &ExperienceRecord) -> Result<(), GenflowError> {
        let url = self.config.url(&self.config.metadata_path);
        let response = self
            .client
            .post(&url)
            .timeout(self.config.timeout())
            .json(record)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        self.check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{read_frames, FrameParser};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::ops::ControlFlow;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn backend_for(server: &MockServer) -> HttpBackend {
        HttpBackend::new(GenflowConfig::default().with_base_url(server.uri())).unwrap()
    }

    fn workflow_request() -> WorkflowRequest {
        WorkflowRequest {
            source_document: "We need Go".to_string(),
            profile_data: json!({"fullName": "Ada"}),
            request_id: "req-1".to_string(),
        }
    }

    fn render_request() -> RenderRequest {
        RenderRequest {
            profile_data: json!({"fullName": "Ada"}),
            final_experience_text: "Shipped services".to_string(),
            format_preference: "A4".to_string(),
            title_hint: "SRE".to_string(),
        }
    }

    #[tokio::test]
    async fn test_stream_body_feeds_the_frame_parser() {
        let server = MockServer::start().await;
        let body = "event: start\ndata: {}\n\nevent: done\ndata: {\"steps\":{}}\n\n";
        Mock::given(method("POST"))
            .and(path("/api/jd2cv-full/langchain-generate/stream"))
            .and(header("accept", "text/event-stream"))
            .and(body_json(json!({
                "sourceDocument": "We need Go",
                "profileData": {"fullName": "Ada"},
                "requestId": "req-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let stream = backend_for(&server)
            .await
            .open_stream(&workflow_request())
            .await
            .unwrap();
        let mut parser = FrameParser::new();
        let mut names = Vec::new();
        read_frames(stream, &mut parser, |frame| {
            names.push(frame.event);
            ControlFlow::Continue(())
        })
        .await
        .unwrap();
        assert_eq!(names, vec!["start".to_string(), "done".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_error_status_is_a_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/jd2cv-full/langchain-generate/stream"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = match backend_for(&server).await.open_stream(&workflow_request()).await {
            Ok(_) => panic!("expected a status error"),
            Err(e) => e,
        };
        assert_eq!(
            err,
            TransportError::Status {
                status: 503,
                body: "busy".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_long_error_body_is_truncated_on_a_char_boundary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/jd2cv-full/langchain-generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("\u{e9}".repeat(400)))
            .mount(&server)
            .await;

        let request = workflow_request().to_fallback();
        let err = backend_for(&server).await.generate(&request).await.unwrap_err();
        match err {
            TransportError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), MAX_ERROR_BODY);
                assert!(body.chars().all(|c| c == '\u{e9}'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_returns_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/jd2cv-full/langchain-generate"))
            .and(body_json(json!({
                "sourceDocument": "We need Go",
                "profileData": {"fullName": "Ada"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let body = backend_for(&server)
            .await
            .generate(&workflow_request().to_fallback())
            .await
            .unwrap();
        assert_eq!(body, json!({"success": true}));
    }

    #[tokio::test]
    async fn test_generate_rejects_non_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/jd2cv-full/langchain-generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .await
            .generate(&workflow_request().to_fallback())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidBody(_)));
    }

    #[tokio::test]
    async fn test_render_returns_document_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/jd2cv-full/v2/generate-pdf"))
            .and(body_partial_json(json!({
                "finalExperienceText": "Shipped services",
                "formatPreference": "A4",
                "titleHint": "SRE"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"%PDF-1.7".to_vec(), "application/pdf"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let document = backend_for(&server).await.render(&render_request()).await.unwrap();
        assert_eq!(document.bytes.as_ref(), b"%PDF-1.7");
        assert_eq!(document.content_type, "application/pdf");
    }

    #[tokio::test]
    async fn test_render_error_uses_json_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/jd2cv-full/v2/generate-pdf"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({"error": "template missing"})),
            )
            .mount(&server)
            .await;

        let err = backend_for(&server).await.render(&render_request()).await.unwrap_err();
        assert!(matches!(err, GenflowError::Render(ref m) if m == "template missing"));
    }

    #[tokio::test]
    async fn test_render_error_without_json_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/jd2cv-full/v2/generate-pdf"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = backend_for(&server).await.render(&render_request()).await.unwrap_err();
        assert!(matches!(err, GenflowError::Render(ref m) if m == "HTTP 502"));
    }

    #[tokio::test]
    async fn test_upload_sends_multipart_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/jds/upload-pdf"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let upload = ArtifactUpload {
            target_id: "jd-1".to_string(),
            owner_id: Some("user-7".to_string()),
            filename: "Ada_Acme_SRE_Resume.pdf".to_string(),
            document: RenderedDocument::pdf(&b"%PDF-1.7"[..]),
        };
        backend_for(&server).await.upload(&upload).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let request = &requests[0];
        let content_type = request
            .headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.starts_with("multipart/form-data"));

        let body = String::from_utf8_lossy(&request.body);
        assert!(body.contains(r#"name="file"; filename="Ada_Acme_SRE_Resume.pdf""#));
        assert!(body.contains("%PDF-1.7"));
        assert!(body.contains(r#"name="targetId""#));
        assert!(body.contains("jd-1"));
        assert!(body.contains(r#"name="ownerId""#));
        assert!(body.contains("user-7"));
    }

    #[tokio::test]
    async fn test_upload_omits_missing_owner_and_maps_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/jds/upload-pdf"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let upload = ArtifactUpload {
            target_id: "jd-1".to_string(),
            owner_id: None,
            filename: "a.pdf".to_string(),
            document: RenderedDocument::pdf(&b"%PDF"[..]),
        };
        let err = backend_for(&server).await.upload(&upload).await.unwrap_err();
        assert!(matches!(
            err,
            GenflowError::Transport(TransportError::Status { status: 503, .. })
        ));

        let requests = server.received_requests().await.unwrap();
        assert!(!String::from_utf8_lossy(&requests[0].body).contains("ownerId"));
    }

    #[tokio::test]
    async fn test_save_posts_experience_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/jd2cv-full/langchain-experience"))
            .and(body_json(json!({
                "targetId": "jd-1",
                "ownerId": "user-7",
                "finalExperienceText": "Shipped services",
                "roleClassification": "Backend",
                "generatedAt": "2026-01-01T00:00:00.000000+00:00"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let record = ExperienceRecord {
            target_id: "jd-1".to_string(),
            owner_id: Some("user-7".to_string()),
            final_experience_text: "Shipped services".to_string(),
            role_classification: "Backend".to_string(),
            generated_at: "2026-01-01T00:00:00.000000+00:00".to_string(),
        };
        backend_for(&server).await.save(&record).await.unwrap();
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = GenflowConfig::default().with_base_url("not-a-url");
        assert!(matches!(HttpBackend::new(config), Err(GenflowError::Config(_))));
    }

    #[test]
    fn test_new_keeps_config() {
        let backend = HttpBackend::new(GenflowConfig::default().with_timeout_secs(30)).unwrap();
        assert_eq!(backend.config().timeout_secs, 30);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_a_transport_error() {
        // Port 9 (discard) on localhost is expected to refuse connections.
        let backend =
            HttpBackend::new(GenflowConfig::default().with_base_url("http://127.0.0.1:9")).unwrap();
        let request = WorkflowRequest {
            source_document: "jd".to_string(),
            profile_data: serde_json::json!({}),
            request_id: "r".to_string(),
        };
        let err = match backend.open_stream(&request).await {
            Ok(_) => panic!("expected connection failure"),
            Err(e) => e,
        };
        assert!(matches!(err, TransportError::Connection(_)));
    }
}
