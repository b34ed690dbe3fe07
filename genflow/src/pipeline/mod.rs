//! Run orchestration.
//!
//! This module provides:
//! - The four-stage state machine
//! - Caller-visible control state and countdown
//! - The single-attempt fallback
//! - The coordinator that drives one run end to end

mod control;
mod coordinator;
mod fallback;
mod machine;


pub use control::{ControlState, Countdown};
pub use coordinator::{RunOutcome, WorkflowCoordinator, DEFAULT_TIMEOUT};
pub use fallback::{parse_response as parse_fallback_response, FallbackCoordinator};
pub use machine::StageMachine;
