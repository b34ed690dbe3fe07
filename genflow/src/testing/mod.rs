//! Scripted fakes for exercising runs without a network.
//!
//! Every fake records what it was given so tests can assert on call order
//! and payloads.

mod fakes;

pub use fakes::{
    sse_frame, RecordingArtifactStore, RecordingMetadataStore, RecordingRenderer,
    RecordingSink, ScriptedBackend, StreamScript,
};
