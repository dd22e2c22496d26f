//! Fallback reference-tone source.
//!
//! When no live input device can be acquired the transmitter keeps
//! streaming by looping a reference signal: either the bundled tone asset
//! (loaded by a backend) or a synthesized sine. Delivery is paced in real
//! time so downstream cadence behaves exactly as with a live device.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::models::config::CaptureConstraints;
use crate::models::error::RelayError;
use crate::models::state::SourceKind;
use crate::traits::capture_source::{CaptureSource, SampleCallback};

/// Delivery block length as a fraction of a second. 10 ms blocks keep the
/// loop responsive to `stop` without busy-waiting.
const BLOCKS_PER_SECOND: u32 = 100;

/// A looping, real-time-paced capture source backed by a fixed sample
/// buffer.
pub struct ToneSource {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    description: String,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ToneSource {
    /// Source backed by preloaded mono samples (e.g. the bundled WAV asset).
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, description: impl Into<String>) -> Self {
        Self {
            samples: Arc::new(samples),
            sample_rate,
            description: description.into(),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Source backed by one second of a synthesized sine reference tone.
    pub fn sine(frequency: f32, sample_rate: u32) -> Self {
        let samples: Vec<f32> = (0..sample_rate)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                0.25 * (TAU * frequency * t).sin()
            })
            .collect();
        Self::from_samples(
            samples,
            sample_rate,
            format!("{frequency} Hz reference tone"),
        )
    }
}

impl CaptureSource for ToneSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Fallback
    }

    fn is_available(&self) -> bool {
        !self.samples.is_empty()
    }

    fn start(
        &mut self,
        _constraints: &CaptureConstraints,
        callback: SampleCallback,
    ) -> Result<(), RelayError> {
        if self.samples.is_empty() {
            return Err(RelayError::SourceUnavailable);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RelayError::InvalidState("tone source already running".into()));
        }

        let samples = Arc::clone(&self.samples);
        let sample_rate = self.sample_rate;
        let running = Arc::clone(&self.running);

        let block_len = (sample_rate / BLOCKS_PER_SECOND).max(1) as usize;
        let block_interval = Duration::from_secs(1) / BLOCKS_PER_SECOND;

        let handle = thread::Builder::new()
            .name("fallback-tone".into())
            .spawn(move || {
                let mut position = 0usize;
                let mut block = Vec::with_capacity(block_len);
                while running.load(Ordering::SeqCst) {
                    block.clear();
                    for _ in 0..block_len {
                        block.push(samples[position]);
                        position = (position + 1) % samples.len();
                    }
                    callback(&block, sample_rate, 1);
                    thread::sleep(block_interval);
                }
            })
            .map_err(|e| {
                log::error!("failed to spawn tone thread: {e}");
                RelayError::SourceUnavailable
            })?;

        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn collect_for(source: &mut ToneSource, window: Duration) -> Vec<f32> {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&collected);
        let callback: SampleCallback = Arc::new(move |samples, _rate, _channels| {
            sink.lock().extend_from_slice(samples);
        });
        source
            .start(&CaptureConstraints::default(), callback)
            .unwrap();
        thread::sleep(window);
        source.stop();
        let collected = collected.lock();
        collected.clone()
    }

    #[test]
    fn sine_stays_within_amplitude() {
        let mut source = ToneSource::sine(440.0, 8_000);
        let samples = collect_for(&mut source, Duration::from_millis(50));
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|s| s.abs() <= 0.25 + 1e-6));
    }

    #[test]
    fn short_asset_loops() {
        // 10 samples at 8 kHz is far less than one delivery block; the
        // source must wrap around rather than run out.
        let asset: Vec<f32> = (0..10).map(|i| i as f32 / 10.0).collect();
        let mut source = ToneSource::from_samples(asset, 8_000, "test asset");
        let samples = collect_for(&mut source, Duration::from_millis(50));
        assert!(samples.len() > 10);
        assert_eq!(samples[0], samples[10]);
    }

    #[test]
    fn empty_asset_is_unavailable() {
        let mut source = ToneSource::from_samples(Vec::new(), 8_000, "empty");
        assert!(!source.is_available());
        let callback: SampleCallback = Arc::new(|_, _, _| {});
        assert_eq!(
            source.start(&CaptureConstraints::default(), callback),
            Err(RelayError::SourceUnavailable)
        );
    }

    #[test]
    fn stop_without_start_is_safe() {
        let mut source = ToneSource::sine(440.0, 8_000);
        source.stop();
        source.stop();
    }
}
