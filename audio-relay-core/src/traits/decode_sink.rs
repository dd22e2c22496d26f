use std::sync::Arc;

use crate::models::config::MediaFormat;
use crate::models::error::RelayError;

/// An event reported by a decode sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// The underlying media container finished opening.
    Opened,

    /// The most recent `append` was fully consumed; the next segment may
    /// be submitted.
    AppendComplete,

    /// The sink failed outside an `append` call.
    Fault(String),
}

/// Callback invoked for each decode sink event.
///
/// May fire on an arbitrary thread, including synchronously from inside
/// `open` or `append`.
pub type DecodeEventCallback = Arc<dyn Fn(DecodeEvent) + Send + Sync + 'static>;

/// An external incremental decoder/renderer.
///
/// Mirrors the shape of a media-source buffer: opening is asynchronous,
/// appends are one-at-a-time and complete asynchronously, and the stream
/// is finished with an explicit end-of-stream signal.
pub trait DecodeSink: Send {
    /// Whether the sink can decode the given container format.
    fn supports(&self, format: &MediaFormat) -> bool;

    /// Begin opening the container. `DecodeEvent::Opened` follows.
    fn open(
        &mut self,
        format: &MediaFormat,
        on_event: DecodeEventCallback,
    ) -> Result<(), RelayError>;

    /// Whether the container is open and able to accept appends.
    fn is_open(&self) -> bool;

    /// Submit one segment. `DecodeEvent::AppendComplete` follows on
    /// success; an error means the segment cannot be consumed.
    fn append(&mut self, segment: Vec<u8>) -> Result<(), RelayError>;

    /// Signal that no further segments will arrive.
    fn end_of_stream(&mut self);

    /// Release the sink and any renderer resources. Idempotent.
    fn close(&mut self);
}

/// Produces a fresh decode sink for each joined channel.
///
/// Pipelines are replaced, not reused, on every join.
pub trait DecodeSinkFactory: Send + Sync {
    fn make_sink(&self) -> Box<dyn DecodeSink>;
}
