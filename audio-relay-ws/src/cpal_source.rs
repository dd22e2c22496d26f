//! Live input device capture via cpal.
//!
//! The cpal stream handle is not `Send`, so the stream is built, played,
//! and dropped on a dedicated thread; `start` blocks until the stream is
//! confirmed up or failed. Samples are delivered at the device's native
//! rate and channel count; the controller conforms them to the capture
//! constraints.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};

use audio_relay_core::models::config::CaptureConstraints;
use audio_relay_core::models::error::RelayError;
use audio_relay_core::models::state::SourceKind;
use audio_relay_core::traits::capture_source::{CaptureSource, SampleCallback};

/// Microphone capture source backed by the default cpal host.
pub struct CpalSource {
    device_name: Option<String>,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CpalSource {
    /// Capture from the system default input device.
    pub fn default_device() -> Self {
        Self {
            device_name: None,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Capture from a specific input device by name.
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    fn find_device(&self) -> Result<cpal::Device, RelayError> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host.default_input_device().ok_or(RelayError::SourceUnavailable),
            Some(wanted) => host
                .input_devices()
                .map_err(|e| RelayError::ConfigurationFailed(e.to_string()))?
                .find(|d| d.name().map(|n| &n == wanted).unwrap_or(false))
                .ok_or(RelayError::SourceUnavailable),
        }
    }
}

impl CaptureSource for CpalSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Live
    }

    fn is_available(&self) -> bool {
        self.find_device().is_ok()
    }

    fn start(
        &mut self,
        constraints: &CaptureConstraints,
        callback: SampleCallback,
    ) -> Result<(), RelayError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RelayError::InvalidState("capture already running".into()));
        }

        // cpal has no portable toggles for echo cancellation, noise
        // suppression, or auto gain; the constraint flags stay advisory.
        log::debug!(
            "capture processing flags: aec={} ns={} agc={}",
            constraints.echo_cancellation,
            constraints.noise_suppression,
            constraints.auto_gain
        );

        let device = match self.find_device() {
            Ok(d) => d,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let running = Arc::clone(&self.running);
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let handle = thread::Builder::new()
            .name("cpal-capture".into())
            .spawn(move || {
                let stream = match build_stream(&device, callback) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(RelayError::ConfigurationFailed(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // The stream lives as long as this thread does.
                while running.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(50));
                }
                drop(stream);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                RelayError::ConfigurationFailed(format!("failed to spawn capture thread: {e}"))
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.handle = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(RelayError::SourceUnavailable)
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn description(&self) -> String {
        self.device_name
            .clone()
            .unwrap_or_else(|| "default input device".into())
    }
}

fn build_stream(device: &cpal::Device, callback: SampleCallback) -> Result<cpal::Stream, RelayError> {
    let supported = device
        .default_input_config()
        .map_err(|e| RelayError::ConfigurationFailed(e.to_string()))?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    match sample_format {
        SampleFormat::F32 => build_typed::<f32>(device, &config, callback),
        SampleFormat::I16 => build_typed::<i16>(device, &config, callback),
        SampleFormat::U16 => build_typed::<u16>(device, &config, callback),
        other => Err(RelayError::ConfigurationFailed(format!(
            "unsupported sample format: {other:?}"
        ))),
    }
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    callback: SampleCallback,
) -> Result<cpal::Stream, RelayError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let rate = config.sample_rate.0;
    let channels = config.channels;

    device
        .build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|s| s.to_sample::<f32>()).collect();
                callback(&samples, rate, channels);
            },
            |e| log::error!("capture stream error: {e}"),
            None,
        )
        .map_err(|e| RelayError::ConfigurationFailed(e.to_string()))
}
