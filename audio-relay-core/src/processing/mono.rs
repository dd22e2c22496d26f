//! Constraint conformance for captured audio.
//!
//! Sources deliver whatever the device gives them; before samples reach the
//! encoder they are folded to mono and brought to the constraint sample
//! rate. Linear interpolation is enough here: the relay targets speech.

/// Downmix interleaved multi-channel audio to mono by averaging the
/// channels of each frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample mono audio from `source_rate` to `target_rate` by linear
/// interpolation. Returns the input unchanged when the rates match.
pub fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_count = (samples.len() as f64 * ratio) as usize;
    let mut output = Vec::with_capacity(output_count);

    for i in 0..output_count {
        let position = i as f64 / ratio;
        let index = position as usize;
        let fraction = (position - index as f64) as f32;

        let value = if index + 1 < samples.len() {
            samples[index] * (1.0 - fraction) + samples[index + 1] * fraction
        } else {
            samples[samples.len() - 1]
        };
        output.push(value);
    }
    output
}

/// Fold arbitrary device output to mono at the target rate.
pub fn conform(samples: &[f32], channels: u16, source_rate: u32, target_rate: u32) -> Vec<f32> {
    let mono = downmix_to_mono(samples, channels as usize);
    resample_linear(&mono, source_rate, target_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn downmix_stereo_averages_frames() {
        let stereo = [0.2, 0.8, 0.4, 0.6];
        let mono = downmix_to_mono(&stereo, 2);
        assert_eq!(mono.len(), 2);
        assert_relative_eq!(mono[0], 0.5, epsilon = 1e-6);
        assert_relative_eq!(mono[1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn downmix_mono_is_passthrough() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix_to_mono(&samples, 1), samples);
    }

    #[test]
    fn resample_same_rate_is_passthrough() {
        let samples = vec![1.0, 2.0, 3.0];
        assert_eq!(resample_linear(&samples, 48_000, 48_000), samples);
    }

    #[test]
    fn resample_upsample_2x_interpolates_midpoints() {
        let result = resample_linear(&[0.0, 1.0], 24_000, 48_000);
        assert_eq!(result.len(), 4);
        assert_relative_eq!(result[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(result[1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn resample_downsample_halves_length() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        let result = resample_linear(&samples, 48_000, 24_000);
        assert_eq!(result.len(), 50);
    }

    #[test]
    fn conform_stereo_to_mono_target_rate() {
        let stereo: Vec<f32> = (0..200).map(|i| (i % 2) as f32).collect();
        let result = conform(&stereo, 2, 48_000, 24_000);
        // 100 stereo frames → 100 mono samples → 50 at half rate,
        // every frame averaging to 0.5.
        assert_eq!(result.len(), 50);
        assert_relative_eq!(result[10], 0.5, epsilon = 1e-6);
    }
}
