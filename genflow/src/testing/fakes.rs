//! Recording collaborator fakes.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::time::Duration;

use crate::core::{FallbackRequest, WorkflowRequest};
use crate::errors::{GenflowError, TransportError};
use crate::ports::{
    ArtifactStore, ArtifactUpload, DocumentRenderer, DocumentSink, ExperienceRecord,
    GenerationBackend, MetadataStore, RenderRequest, RenderedDocument,
};
use crate::stream::ByteStream;

/// Encodes one event-stream frame.
#[must_use]
pub fn sse_frame(event: &str, data: &Value) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

/// What the scripted stream does when opened.
#[derive(Debug, Clone)]
pub enum StreamScript {
    /// The request itself fails.
    Refuse(TransportError),
    /// The body yields these chunks and then ends.
    Chunks(Vec<Bytes>),
    /// The body yields these chunks and then fails.
    ChunksThenError(Vec<Bytes>, TransportError),
    /// The body yields these chunks and then never ends.
    ChunksThenHang(Vec<Bytes>),
}

impl StreamScript {
    /// A stream of whole frames delivered as one chunk each.
    #[must_use]
    pub fn frames(frames: &[(&str, Value)]) -> Self {
        Self::Chunks(
            frames
                .iter()
                .map(|(event, data)| Bytes::from(sse_frame(event, data)))
                .collect(),
        )
    }
}

/// A backend that replays a scripted stream and a canned fallback body.
#[derive(Debug)]
pub struct ScriptedBackend {
    script: Mutex<StreamScript>,
    fallback: Mutex<Result<Value, TransportError>>,
    fallback_delay: Duration,
    stream_requests: Mutex<Vec<WorkflowRequest>>,
    fallback_requests: Mutex<Vec<FallbackRequest>>,
}

impl ScriptedBackend {
    /// Creates a backend whose fallback fails with a 500.
    #[must_use]
    pub fn new(script: StreamScript) -> Self {
        Self {
            script: Mutex::new(script),
            fallback: Mutex::new(Err(TransportError::Status {
                status: 500,
                body: "fallback not scripted".to_string(),
            })),
            fallback_delay: Duration::ZERO,
            stream_requests: Mutex::new(Vec::new()),
            fallback_requests: Mutex::new(Vec::new()),
        }
    }

    /// Sets the fallback response.
    #[must_use]
    pub fn with_fallback(self, response: Result<Value, TransportError>) -> Self {
        *self.fallback.lock() = response;
        self
    }

    /// Delays the fallback response.
    #[must_use]
    pub fn with_fallback_delay(mut self, delay: Duration) -> Self {
        self.fallback_delay = delay;
        self
    }

    /// Number of streams opened.
    #[must_use]
    pub fn stream_calls(&self) -> usize {
        self.stream_requests.lock().len()
    }

    /// Number of fallback requests sent.
    #[must_use]
    pub fn fallback_calls(&self) -> usize {
        self.fallback_requests.lock().len()
    }

    /// The streaming requests received.
    #[must_use]
    pub fn stream_requests(&self) -> Vec<WorkflowRequest> {
        self.stream_requests.lock().clone()
    }

    /// The fallback requests received.
    #[must_use]
    pub fn fallback_requests(&self) -> Vec<FallbackRequest> {
        self.fallback_requests.lock().clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn open_stream(&self, request: &WorkflowRequest) -> Result<ByteStream, TransportError> {
        self.stream_requests.lock().push(request.clone());
        let script = self.script.lock().clone();
        let stream = match script {
            StreamScript::Refuse(e) => return Err(e),
            StreamScript::Chunks(chunks) => futures::stream::iter(chunks.into_iter().map(Ok)).boxed(),
            StreamScript::ChunksThenError(chunks, e) => futures::stream::iter(
                chunks.into_iter().map(Ok).chain(std::iter::once(Err(e))),
            )
            .boxed(),
            StreamScript::ChunksThenHang(chunks) => futures::stream::iter(chunks.into_iter().map(Ok))
                .chain(futures::stream::pending())
                .boxed(),
        };
        Ok(stream)
    }

    async fn generate(&self, request: &FallbackRequest) -> Result<Value, TransportError> {
        self.fallback_requests.lock().push(request.clone());
        let response = self.fallback.lock().clone();
        if !self.fallback_delay.is_zero() {
            tokio::time::sleep(self.fallback_delay).await;
        }
        response
    }
}

/// A renderer returning fixed bytes or a fixed failure.
#[derive(Debug)]
pub struct RecordingRenderer {
    failure: Option<String>,
    requests: Mutex<Vec<RenderRequest>>,
}

impl RecordingRenderer {
    /// A renderer that succeeds with a small PDF.
    #[must_use]
    pub fn new() -> Self {
        Self {
            failure: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A renderer that always fails with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// The render requests received.
    #[must_use]
    pub fn requests(&self) -> Vec<RenderRequest> {
        self.requests.lock().clone()
    }
}

impl Default for RecordingRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentRenderer for RecordingRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedDocument, GenflowError> {
        self.requests.lock().push(request.clone());
        match &self.failure {
            Some(message) => Err(GenflowError::Render(message.clone())),
            None => Ok(RenderedDocument::pdf(Bytes::from_static(b"%PDF-1.7 test"))),
        }
    }
}

/// A document sink that keeps delivered file names.
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<(String, usize)>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivered `(filename, size)` pairs.
    #[must_use]
    pub fn delivered(&self) -> Vec<(String, usize)> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl DocumentSink for RecordingSink {
    async fn deliver(&self, filename: &str, document: &RenderedDocument) -> Result<(), GenflowError> {
        self.delivered.lock().push((filename.to_string(), document.len()));
        Ok(())
    }
}

/// An artifact store that records uploads, optionally failing them.
#[derive(Debug, Default)]
pub struct RecordingArtifactStore {
    fail: bool,
    uploads: Mutex<Vec<ArtifactUpload>>,
}

impl RecordingArtifactStore {
    /// A store that accepts uploads.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects every upload.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// Uploads attempted.
    #[must_use]
    pub fn uploads(&self) -> Vec<ArtifactUpload> {
        self.uploads.lock().clone()
    }
}

#[async_trait]
impl ArtifactStore for RecordingArtifactStore {
    async fn upload(&self, upload: &ArtifactUpload) -> Result<(), GenflowError> {
        self.uploads.lock().push(upload.clone());
        if self.fail {
            return Err(TransportError::Status {
                status: 503,
                body: "storage unavailable".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// A metadata store that records saves.
#[derive(Debug, Default)]
pub struct RecordingMetadataStore {
    records: Mutex<Vec<ExperienceRecord>>,
}

impl RecordingMetadataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records saved.
    #[must_use]
    pub fn records(&self) -> Vec<ExperienceRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl MetadataStore for RecordingMetadataStore {
    async fn save(&self, record: &ExperienceRecord) -> Result<(), GenflowError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}
