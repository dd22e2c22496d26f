use crate::models::config::CaptureConstraints;
use crate::models::error::RelayError;

/// An external incremental encode engine.
///
/// Samples are pushed as they are captured; the cadence timer flushes one
/// opaque segment per tick via `take_segment`. The codec itself lives
/// behind this trait and is not part of the relay.
pub trait SegmentEncoder: Send {
    /// Reset the engine for a new stream under the given constraints.
    fn begin(&mut self, constraints: &CaptureConstraints) -> Result<(), RelayError>;

    /// Feed captured mono samples at the constraint sample rate.
    fn push_samples(&mut self, samples: &[f32]);

    /// Flush the segment accumulated since the previous flush.
    ///
    /// May return an empty segment when no audio arrived; empty segments
    /// are never forwarded.
    fn take_segment(&mut self) -> Result<Vec<u8>, RelayError>;

    /// Finalize the stream, returning any trailing segment.
    fn finish(&mut self) -> Result<Vec<u8>, RelayError>;
}
