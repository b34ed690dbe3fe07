//! Incremental decoder for `text/event-stream` frames.
//!
//! Bytes are buffered raw and only complete frames are decoded, so the output
//! does not depend on where chunk boundaries fall (mid-frame, mid-JSON token
//! or inside a multi-byte UTF-8 sequence).

use futures::StreamExt;
use std::ops::ControlFlow;
use tracing::{debug, warn};

use super::ByteStream;
use crate::errors::TransportError;

/// Default upper bound on buffered, undelimited bytes (1 MiB).
pub const DEFAULT_MAX_BUFFER: usize = 1024 * 1024;

/// Event name used when a frame has no `event:` line.
pub const DEFAULT_EVENT: &str = "message";

/// A decoded frame: an event name and its JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    /// The event name.
    pub event: String,
    /// The decoded `data:` body, or `Null` when the frame carried none.
    pub data: serde_json::Value,
}

impl SseFrame {
    /// Creates a frame.
    #[must_use]
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Where delimiter scanning resumes in the undecided tail of the buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ScanCursor {
    /// Start of the line being scanned.
    line_start: usize,
    /// First byte not yet examined.
    pos: usize,
}

/// Buffered frame parser.
///
/// Each buffered byte is examined once while looking for the blank line that
/// ends a frame, so a large frame arriving in small chunks costs linear work.
#[derive(Debug)]
pub struct FrameParser {
    buffer: Vec<u8>,
    cursor: ScanCursor,
    max_buffer: usize,
    frames_emitted: usize,
    frames_dropped: usize,
    bytes_scanned: usize,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    /// Creates a parser with the default buffer limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_buffer(DEFAULT_MAX_BUFFER)
    }

    /// Creates a parser with a custom buffer limit.
    #[must_use]
    pub fn with_max_buffer(max_buffer: usize) -> Self {
        Self {
            buffer: Vec::new(),
            cursor: ScanCursor::default(),
            max_buffer,
            frames_emitted: 0,
            frames_dropped: 0,
            bytes_scanned: 0,
        }
    }

    /// Number of frames handed to the callback so far.
    #[must_use]
    pub const fn frames_emitted(&self) -> usize {
        self.frames_emitted
    }

    /// Number of frames dropped because their body was not valid JSON.
    #[must_use]
    pub const fn frames_dropped(&self) -> usize {
        self.frames_dropped
    }

    /// Number of bytes examined while looking for frame delimiters.
    #[must_use]
    pub const fn bytes_scanned(&self) -> usize {
        self.bytes_scanned
    }

    /// Number of bytes currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Appends a chunk and emits every frame it completes, in order.
    ///
    /// Emission stops early when the callback breaks; the remaining buffered
    /// frames are kept.
    pub fn push<F>(&mut self, chunk: &[u8], on_frame: &mut F) -> Result<ControlFlow<()>, TransportError>
    where
        F: FnMut(SseFrame) -> ControlFlow<()>,
    {
        self.buffer.extend_from_slice(chunk);

        loop {
            let scan_start = self.cursor.pos;
            let found = find_frame_end(&self.buffer, &mut self.cursor);
            self.bytes_scanned += self.cursor.pos - scan_start;
            let Some((frame_len, consumed)) = found else {
                break;
            };
            let raw: Vec<u8> = self.buffer.drain(..consumed).collect();
            self.cursor = ScanCursor::default();
            if let Some(frame) = self.decode(&raw[..frame_len]) {
                self.frames_emitted += 1;
                if on_frame(frame).is_break() {
                    return Ok(ControlFlow::Break(()));
                }
            }
        }

        if self.buffer.len() > self.max_buffer {
            return Err(TransportError::BufferOverflow(self.max_buffer));
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Parses whatever remains buffered as a final frame.
    pub fn finish<F>(&mut self, on_frame: &mut F) -> ControlFlow<()>
    where
        F: FnMut(SseFrame) -> ControlFlow<()>,
    {
        let rest = std::mem::take(&mut self.buffer);
        self.cursor = ScanCursor::default();
        if rest.iter().all(u8::is_ascii_whitespace) {
            return ControlFlow::Continue(());
        }
        debug!(bytes = rest.len(), "Flushing trailing frame at end of stream");
        match self.decode(&rest) {
            Some(frame) => {
                self.frames_emitted += 1;
                on_frame(frame)
            }
            None => ControlFlow::Continue(()),
        }
    }

    fn decode(&mut self, raw: &[u8]) -> Option<SseFrame> {
        let text = String::from_utf8_lossy(raw);
        let (event, data) = parse_fields(&text)?;
        let event = event.unwrap_or_else(|| DEFAULT_EVENT.to_string());

        let Some(data) = data else {
            return Some(SseFrame::new(event, serde_json::Value::Null));
        };
        match serde_json::from_str(&data) {
            Ok(value) => Some(SseFrame::new(event, value)),
            Err(e) => {
                self.frames_dropped += 1;
                warn!(event = %event, error = %e, "Dropping frame with malformed JSON body");
                None
            }
        }
    }
}

/// Finds the first blank line in `buf`, resuming from `cursor`.
///
/// Returns `(frame_len, consumed_len)`: the frame occupies `buf[..frame_len]`
/// and the delimiter ends at `consumed_len`. A trailing lone `\r` is left
/// undecided until more bytes arrive. On `None` the cursor records how far
/// the scan got.
fn find_frame_end(buf: &[u8], cursor: &mut ScanCursor) -> Option<(usize, usize)> {
    let mut line_start = cursor.line_start;
    let mut i = cursor.pos;
    let found = loop {
        if i >= buf.len() {
            break None;
        }
        let eol_len = match buf[i] {
            b'\n' => 1,
            b'\r' => match buf.get(i + 1) {
                Some(b'\n') => 2,
                Some(_) => 1,
                None => break None,
            },
            _ => {
                i += 1;
                continue;
            }
        };
        if i == line_start {
            break Some((line_start, i + eol_len));
        }
        i += eol_len;
        line_start = i;
    };
    *cursor = ScanCursor {
        line_start,
        pos: i,
    };
    found
}

/// Splits a frame into its `event:` name and joined `data:` body.
///
/// Returns `None` for frames with neither field (comments, keep-alives).
fn parse_fields(text: &str) -> Option<(Option<String>, Option<String>)> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut event = None;
    let mut data: Option<String> = None;

    for line in normalized.split('\n') {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.trim().to_string()),
            "data" => match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            },
            _ => {}
        }
    }

    if event.is_none() && data.is_none() {
        None
    } else {
        Some((event, data))
    }
}

/// Reads a byte stream to its end, emitting frames in arrival order.
///
/// Stops reading (dropping the stream) as soon as the callback breaks.
pub async fn read_frames<F>(
    mut stream: ByteStream,
    parser: &mut FrameParser,
    mut on_frame: F,
) -> Result<(), TransportError>
where
    F: FnMut(SseFrame) -> ControlFlow<()>,
{
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if parser.push(&chunk, &mut on_frame)?.is_break() {
            return Ok(());
        }
    }
    let _ = parser.finish(&mut on_frame);
    Ok(())
}
