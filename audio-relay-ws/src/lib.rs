//! # audio-relay-ws
//!
//! Concrete I/O backends for audio-relay-kit.
//!
//! Provides:
//! - `WsConnector` — WebSocket transport sessions via tokio-tungstenite
//! - `CpalSource` — Microphone capture via cpal
//! - `devices` — Input device enumeration
//! - `fallback` — Bundled reference-tone WAV loading
//!
//! ## Usage
//! ```ignore
//! use audio_relay_core::{CaptureController, TransmitConfig, ToneSource};
//! use audio_relay_ws::{CpalSource, WsConnector};
//!
//! let connector = WsConnector::new("ws://relay.local/ws/transmitter");
//! let controller = CaptureController::new(
//!     Box::new(connector),
//!     Box::new(CpalSource::default_device()),
//!     Box::new(ToneSource::sine(440.0, 48_000)),
//!     Box::new(my_encoder),
//!     TransmitConfig::default(),
//! )?;
//! controller.start("en")?;
//! ```

pub mod cpal_source;
pub mod devices;
pub mod fallback;
pub mod ws_transport;

pub use cpal_source::CpalSource;
pub use fallback::wav_tone_source;
pub use ws_transport::WsConnector;
