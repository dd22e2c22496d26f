//! Bundled reference-tone asset loading.
//!
//! The fallback source plays a WAV asset shipped with the transmitter,
//! referenced by path. Samples are folded to mono up front; the tone
//! source loops them at the asset's native rate.

use std::path::Path;

use audio_relay_core::models::error::RelayError;
use audio_relay_core::processing::mono::downmix_to_mono;
use audio_relay_core::processing::tone::ToneSource;

/// Load a WAV asset into a looping fallback source.
pub fn wav_tone_source(path: &Path) -> Result<ToneSource, RelayError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| RelayError::ConfigurationFailed(format!("failed to open tone asset: {e}")))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| RelayError::ConfigurationFailed(format!("bad tone asset: {e}")))?,
        hound::SampleFormat::Int => {
            let full_scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<Result<_, _>>()
                .map_err(|e| RelayError::ConfigurationFailed(format!("bad tone asset: {e}")))?
        }
    };

    let mono = downmix_to_mono(&samples, spec.channels as usize);
    Ok(ToneSource::from_samples(
        mono,
        spec.sample_rate,
        format!("reference tone ({})", path.display()),
    ))
}
