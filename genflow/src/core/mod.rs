//! Core domain model types for genflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage key and status enums
//! - Per-stage data and merge fields
//! - Workflow trigger, request and result types

mod stage_data;
mod status;
mod workflow;

pub use stage_data::{StageData, StageFields, StructuredFields, TokenUsage};
pub use status::{StageKey, StageStatus};
pub use workflow::{
    FallbackRequest, StageMap, TriggerInput, WorkflowRequest, WorkflowResult,
    PROFILE_EMAIL_FIELD, PROFILE_FORMAT_FIELD, PROFILE_NAME_FIELD,
};
