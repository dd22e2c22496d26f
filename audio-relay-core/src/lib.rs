//! # audio-relay-core
//!
//! Transport-agnostic core of the live audio relay.
//!
//! Two independent client pipelines share nothing but the wire contract: a
//! transmitter captures, encodes, and forwards audio segments into a named
//! channel, and listeners buffer and decode the segments relayed back out.
//! Concrete transports, devices, and codec engines plug in through the
//! traits in this crate; the WebSocket/cpal backends live in
//! `audio-relay-ws`.
//!
//! ## Architecture
//!
//! ```text
//! audio-relay-core (this crate)
//! ├── traits/       ← Transport, CaptureSource, SegmentEncoder, DecodeSink, delegates
//! ├── models/       ← RelayError, state machines, configs, wire messages
//! ├── processing/   ← mono conformance DSP, fallback reference tone
//! ├── transmit/     ← CaptureController (handshake, capture, cadence)
//! └── playback/     ← PlaybackController (directory, queue, drain)
//! ```

pub mod models;
pub mod playback;
pub mod processing;
pub mod traits;
pub mod transmit;

pub(crate) mod timer;

// Re-export key types at crate root for convenience.
pub use models::config::{CaptureConstraints, MediaFormat, PlaybackConfig, TransmitConfig};
pub use models::error::RelayError;
pub use models::message::{ControlMessage, InboundFrame};
pub use models::state::{PipelineState, PlaybackPhase, SessionPhase, SourceKind, TransmitState};
pub use playback::controller::PlaybackController;
pub use playback::queue::SegmentQueue;
pub use processing::tone::ToneSource;
pub use traits::capture_source::{CaptureSource, SampleCallback};
pub use traits::decode_sink::{DecodeEvent, DecodeEventCallback, DecodeSink, DecodeSinkFactory};
pub use traits::delegate::{PlaybackDelegate, TransmitDelegate};
pub use traits::segment_encoder::SegmentEncoder;
pub use traits::transport::{Transport, TransportConnector, TransportEvent, TransportEventCallback};
pub use transmit::controller::CaptureController;
