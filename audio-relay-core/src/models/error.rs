use thiserror::Error;

/// Errors that can occur in the relay pipelines.
///
/// Transport and handshake failures are surfaced to the operator; decode and
/// device failures are recoverable and handled inside the controllers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("transport failed: {0}")]
    Transport(String),

    #[error("transport is not open")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("timed out waiting for handshake reply")]
    HandshakeTimeout,

    #[error("channel name must not be empty")]
    EmptyChannelName,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("no capture source available")]
    SourceUnavailable,

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("decode failed: {0}")]
    DecodeFailed(String),

    #[error("no supported media format")]
    UnsupportedFormat,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),
}
