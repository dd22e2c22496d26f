/// Which capture source is feeding the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A live input device.
    Live,
    /// The bundled reference tone, used when no device can be acquired.
    Fallback,
}

/// Transmitter state machine.
///
/// State transitions:
/// ```text
/// idle → connecting → awaiting-handshake → streaming → stopped → idle
/// ```
/// Every error edge leads to `Stopped`, after which the controller resets
/// itself to `Idle` and can be started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitState {
    Idle,
    Connecting,
    AwaitingHandshake,
    Streaming { source: SourceKind },
    Stopped,
}

impl TransmitState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }

    /// The active source kind while streaming.
    pub fn source(&self) -> Option<SourceKind> {
        match self {
            Self::Streaming { source } => Some(*source),
            _ => None,
        }
    }
}

/// Capture session phase, tracked from acquisition through streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Acquiring,
    Live,
    Fallback,
    Streaming { source: SourceKind },
    Stopped,
}

/// Decode pipeline state machine.
///
/// State transitions:
/// ```text
/// unopened → opening → ready ↔ draining
///                        ↓        ↓
///                     faulted / closed
/// ```
/// A faulted pipeline stays faulted until torn down on leave or rejoin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Unopened,
    Opening,
    Ready,
    Draining,
    Faulted,
    Closed,
}

impl PipelineState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, Self::Faulted)
    }

    /// Whether queued segments may still reach the decoder.
    pub fn accepts_segments(&self) -> bool {
        matches!(
            self,
            Self::Unopened | Self::Opening | Self::Ready | Self::Draining
        )
    }
}

/// Listener connection phase, reported to the delegate for status display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackPhase {
    Disconnected,
    Connected,
    Joined(String),
}

impl PlaybackPhase {
    pub fn is_connected(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// The joined channel name, if any.
    pub fn channel(&self) -> Option<&str> {
        match self {
            Self::Joined(name) => Some(name),
            _ => None,
        }
    }
}
