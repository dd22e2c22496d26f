use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::models::config::CaptureConstraints;
use crate::models::error::RelayError;
use crate::models::state::{SessionPhase, SourceKind};
use crate::traits::capture_source::{CaptureSource, SampleCallback};

/// One capture run: an acquired source feeding the encoder, flushed on a
/// fixed cadence.
///
/// Phases:
/// ```text
/// idle → acquiring → live | fallback → streaming → stopped
/// ```
/// Acquisition prefers the live device; when the device cannot be acquired
/// the bundled reference tone takes over, so the transmitter always has a
/// signal to emit.
pub(crate) struct CaptureSession {
    phase: SessionPhase,
    kind: Option<SourceKind>,
    running: Arc<AtomicBool>,
    cadence: Option<thread::JoinHandle<()>>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            kind: None,
            running: Arc::new(AtomicBool::new(false)),
            cadence: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn kind(&self) -> Option<SourceKind> {
        self.kind
    }

    /// Acquire a sample source: the live device if possible, otherwise the
    /// fallback tone. Device failure is recoverable and never surfaces to
    /// the caller; only losing both sources is an error.
    pub fn acquire(
        &mut self,
        live: &mut dyn CaptureSource,
        fallback: &mut dyn CaptureSource,
        constraints: &CaptureConstraints,
        callback: SampleCallback,
    ) -> Result<SourceKind, RelayError> {
        if self.phase != SessionPhase::Idle {
            return Err(RelayError::InvalidState(format!(
                "cannot acquire from {:?}",
                self.phase
            )));
        }
        self.phase = SessionPhase::Acquiring;

        match live.start(constraints, Arc::clone(&callback)) {
            Ok(()) => {
                log::info!("capturing from {}", live.description());
                self.phase = SessionPhase::Live;
                self.kind = Some(SourceKind::Live);
                Ok(SourceKind::Live)
            }
            Err(device_err) => {
                log::warn!(
                    "live device unavailable ({device_err}); switching to {}",
                    fallback.description()
                );
                match fallback.start(constraints, callback) {
                    Ok(()) => {
                        self.phase = SessionPhase::Fallback;
                        self.kind = Some(SourceKind::Fallback);
                        Ok(SourceKind::Fallback)
                    }
                    Err(e) => {
                        log::error!("fallback source failed: {e}");
                        self.phase = SessionPhase::Stopped;
                        Err(RelayError::SourceUnavailable)
                    }
                }
            }
        }
    }

    /// Start the cadence loop, invoking `flush` once per interval while
    /// the session runs. Valid once a source is acquired.
    pub fn stream(
        &mut self,
        interval: Duration,
        flush: impl Fn() + Send + 'static,
    ) -> Result<(), RelayError> {
        let source = match self.phase {
            SessionPhase::Live => SourceKind::Live,
            SessionPhase::Fallback => SourceKind::Fallback,
            _ => {
                return Err(RelayError::InvalidState(format!(
                    "cannot stream from {:?}",
                    self.phase
                )))
            }
        };

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);

        let handle = thread::Builder::new()
            .name("segment-cadence".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    thread::sleep(interval);
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    flush();
                }
            })
            .expect("failed to spawn cadence thread");

        self.cadence = Some(handle);
        self.phase = SessionPhase::Streaming { source };
        Ok(())
    }

    /// Stop the cadence loop. The caller releases the source and encoder.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.cadence.take() {
            let _ = handle.join();
        }
        self.phase = SessionPhase::Stopped;
    }
}
