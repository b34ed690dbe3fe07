//! Progress reporting for generation runs.
//!
//! Runs report stage snapshots and control-state changes through a
//! [`ProgressSink`], which keeps the coordinator free of any rendering layer.

mod sink;

pub use sink::{
    CollectingProgressSink, LoggingProgressSink, NoOpProgressSink, ProgressEvent, ProgressSink,
};
