use crate::models::error::RelayError;
use crate::models::state::{PlaybackPhase, TransmitState};

/// Event delegate for the listener controller.
///
/// Methods are called from controller worker threads, never while the
/// controller lock is held. Implementations should marshal to the UI
/// thread if needed.
pub trait PlaybackDelegate: Send + Sync {
    /// Called when the connection phase changes.
    fn on_phase_changed(&self, phase: &PlaybackPhase);

    /// Called when a fresh channel directory arrives.
    fn on_channel_list(&self, channels: &[String]);

    /// Called when an error surfaces (transport loss, decode fault).
    fn on_error(&self, error: &RelayError);
}

/// Event delegate for the transmitter controller.
pub trait TransmitDelegate: Send + Sync {
    /// Called when the transmitter state changes.
    fn on_state_changed(&self, state: &TransmitState);

    /// Called when the registry reports the channel's listener count.
    fn on_listener_count(&self, count: u64);

    /// Called when an error surfaces.
    fn on_error(&self, error: &RelayError);
}
