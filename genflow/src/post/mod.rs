//! Post-generation chain: cache, render, deliver, upload, save.

mod filename;
mod orchestrator;

pub use filename::{document_filename, sanitize_component};
pub use orchestrator::{DeliveryReport, PostGenerationOrchestrator};
