use std::sync::Arc;

use crate::models::config::CaptureConstraints;
use crate::models::error::RelayError;
use crate::models::state::SourceKind;

/// Callback invoked when captured samples are available.
///
/// Parameters:
/// - `samples`: Interleaved f32 samples.
/// - `sample_rate`: The actual sample rate of the delivered audio.
/// - `channels`: Number of channels (1 = mono, 2 = stereo interleaved).
pub type SampleCallback = Arc<dyn Fn(&[f32], u32, u16) + Send + Sync + 'static>;

/// A source of raw audio samples for the transmitter.
///
/// Implemented by the live-device backend and by the fallback reference
/// tone. The callback fires on the source's own delivery thread; keep
/// processing minimal.
pub trait CaptureSource: Send {
    /// Which kind of signal this source produces.
    fn kind(&self) -> SourceKind;

    /// Whether the source can currently deliver audio.
    fn is_available(&self) -> bool;

    /// Start delivering samples under the given constraints.
    fn start(
        &mut self,
        constraints: &CaptureConstraints,
        callback: SampleCallback,
    ) -> Result<(), RelayError>;

    /// Stop delivery and release the underlying device or loop.
    fn stop(&mut self);

    /// Human-readable description of the backing source.
    fn description(&self) -> String;
}
