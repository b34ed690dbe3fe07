//! # Genflow
//!
//! Client-side coordinator for a streamed, four-stage AI generation pipeline.
//!
//! A run:
//!
//! - **Streams**: decodes the backend's event stream frame by frame
//! - **Tracks progress**: drives a classification, experience, profile, review
//!   state machine from the decoded events
//! - **Falls back**: retries once through the non-streaming endpoint when the
//!   stream breaks before finishing
//! - **Delivers**: renders the document, hands it to the user, then uploads it
//!   and saves its metadata on a best-effort basis
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use genflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = GenflowConfig::from_env()?;
//! let coordinator = WorkflowCoordinator::from_config(&config, Arc::new(MemoryStore::new()))?
//!     .with_progress(Arc::new(LoggingProgressSink::default()));
//!
//! let outcome = coordinator.run(&trigger).await?;
//! println!("saved {}", outcome.delivery.filename);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod adapters;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod ports;
pub mod post;
pub mod stream;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    #[cfg(feature = "http")]
    pub use crate::adapters::HttpBackend;
    pub use crate::adapters::{FileSystemSink, MemoryStore};
    pub use crate::config::GenflowConfig;
    pub use crate::core::{
        StageData, StageKey, StageStatus, TriggerInput, WorkflowRequest, WorkflowResult,
    };
    pub use crate::errors::{GenflowError, RunPhase, TransportError};
    pub use crate::events::{
        CollectingProgressSink, LoggingProgressSink, NoOpProgressSink, ProgressEvent,
        ProgressSink,
    };
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        ControlState, Countdown, RunOutcome, StageMachine, WorkflowCoordinator,
    };
    pub use crate::ports::{
        ArtifactStore, DocumentRenderer, DocumentSink, GenerationBackend, KeyValueStore,
        MetadataStore,
    };
    pub use crate::post::PostGenerationOrchestrator;
}
