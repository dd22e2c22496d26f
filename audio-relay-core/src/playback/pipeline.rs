use crate::models::config::MediaFormat;
use crate::models::error::RelayError;
use crate::models::state::PipelineState;
use crate::traits::decode_sink::{DecodeEventCallback, DecodeSink};

/// A decode pipeline scoped to one joined channel.
///
/// Wraps the external decode sink together with its state machine and the
/// ready-grace bookkeeping. A pipeline is created on join and torn down on
/// leave, transport close, or an unrecoverable decode fault, never reused.
///
/// The sink slot is an `Option` so the controller can move the sink out for
/// the duration of an append and submit without holding its lock; an absent
/// sink therefore means an append is in flight.
pub(crate) struct DecodePipeline {
    sink: Option<Box<dyn DecodeSink>>,
    format: MediaFormat,
    state: PipelineState,
    grace_started: bool,
}

impl DecodePipeline {
    pub fn new(sink: Box<dyn DecodeSink>, format: MediaFormat) -> Self {
        Self {
            sink: Some(sink),
            format,
            state: PipelineState::Unopened,
            grace_started: false,
        }
    }

    /// Begin opening the underlying container.
    pub fn open(&mut self, on_event: DecodeEventCallback) -> Result<(), RelayError> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(RelayError::InvalidState("pipeline has no sink".into()));
        };
        sink.open(&self.format, on_event)?;
        self.state = PipelineState::Opening;
        Ok(())
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn set_state(&mut self, state: PipelineState) {
        self.state = state;
    }

    /// Whether the ready grace period has already been scheduled.
    pub fn grace_started(&self) -> bool {
        self.grace_started
    }

    pub fn mark_grace_started(&mut self) {
        self.grace_started = true;
    }

    /// Whether the sink is present (no append currently in flight).
    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Whether the underlying container is open for appends.
    pub fn sink_is_open(&self) -> bool {
        self.sink.as_ref().is_some_and(|s| s.is_open())
    }

    /// Move the sink out for an append submission.
    pub fn take_sink(&mut self) -> Option<Box<dyn DecodeSink>> {
        self.sink.take()
    }

    /// Return the sink after an append submission.
    pub fn put_sink(&mut self, sink: Box<dyn DecodeSink>) {
        self.sink = Some(sink);
    }

    /// Finish the stream and release the sink. Idempotent; safe while an
    /// append is in flight (the drain loop closes the orphaned sink).
    pub fn teardown(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if sink.is_open() {
                sink.end_of_stream();
            }
            sink.close();
        }
        self.state = PipelineState::Closed;
    }
}
