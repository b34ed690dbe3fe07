//! Event-stream decoding and dispatch.
//!
//! This module provides:
//! - The incremental frame parser
//! - Tolerant payload extraction
//! - The event dispatcher driving the stage state machine

mod dispatcher;
mod frame;
pub mod payload;

pub use dispatcher::{DispatchOutcome, EventDispatcher, ProtocolEvent};
pub use frame::{read_frames, FrameParser, SseFrame, DEFAULT_EVENT, DEFAULT_MAX_BUFFER};
pub use payload::CompletionPayload;

use bytes::Bytes;
use futures::stream::BoxStream;

use crate::errors::TransportError;

/// An incremental response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;
