use std::sync::Arc;

use crate::models::error::RelayError;
use crate::models::message::InboundFrame;

/// An event delivered by a transport session.
///
/// Frames carry the payload-type discriminant decided at the transport
/// boundary; `Closed` fires exactly once, for both orderly and failed
/// shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(InboundFrame),
    Closed,
}

/// Callback invoked for each transport event.
///
/// Fires on the transport's own thread; keep processing minimal and never
/// block on the transport from inside it.
pub type TransportEventCallback = Arc<dyn Fn(TransportEvent) + Send + Sync + 'static>;

/// A live bidirectional message session.
///
/// Exactly one per controller instance. A closed session is discarded,
/// never reused; sends on a closed session fail with `NotConnected`.
pub trait Transport: Send + Sync {
    /// Whether the session is currently open.
    fn is_open(&self) -> bool;

    /// Send a text frame.
    fn send_text(&self, text: &str) -> Result<(), RelayError>;

    /// Send an opaque binary segment.
    fn send_binary(&self, segment: &[u8]) -> Result<(), RelayError>;

    /// Begin an orderly close. Idempotent; the `Closed` event follows.
    fn close(&self);
}

/// Opens transport sessions.
///
/// Implemented by the WebSocket backend; controller tests plug in fakes.
pub trait TransportConnector: Send + Sync {
    /// Open a session, blocking until it is usable or failed.
    ///
    /// Events arrive via `on_event` from the moment this returns `Ok`.
    fn connect(&self, on_event: TransportEventCallback) -> Result<Box<dyn Transport>, RelayError>;
}
