use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::config::TransmitConfig;
use crate::models::error::RelayError;
use crate::models::message::{ControlMessage, InboundFrame, HANDSHAKE_ACCEPTED};
use crate::models::state::{SessionPhase, SourceKind, TransmitState};
use crate::processing::mono;
use crate::traits::capture_source::{CaptureSource, SampleCallback};
use crate::traits::delegate::TransmitDelegate;
use crate::traits::segment_encoder::SegmentEncoder;
use crate::traits::transport::{Transport, TransportConnector, TransportEvent, TransportEventCallback};
use crate::transmit::reply::ReplyCorrelator;
use crate::transmit::session::CaptureSession;

/// Mutable transmitter state, protected by one lock.
struct TransmitInner {
    state: TransmitState,
    transport: Option<Arc<dyn Transport>>,
    session: Option<CaptureSession>,
}

/// State reachable from transport threads and the cadence loop.
struct TransmitShared {
    inner: Mutex<TransmitInner>,
    replies: ReplyCorrelator,
    delegate: Mutex<Option<Arc<dyn TransmitDelegate>>>,
    config: TransmitConfig,
    live: Mutex<Box<dyn CaptureSource>>,
    fallback: Mutex<Box<dyn CaptureSource>>,
    encoder: Mutex<Box<dyn SegmentEncoder>>,
}

/// Transmitter-side controller: connects, performs the name handshake, and
/// streams encoder segments for as long as the session is accepted.
///
/// ```text
/// idle → connecting → awaiting-handshake → streaming → stopped → idle
/// ```
/// Handshake rejection and timeout are terminal for the attempt; a new
/// `start` call is required. Device loss is not: capture falls back to the
/// bundled reference tone.
pub struct CaptureController {
    shared: Arc<TransmitShared>,
    connector: Box<dyn TransportConnector>,
}

impl CaptureController {
    pub fn new(
        connector: Box<dyn TransportConnector>,
        live: Box<dyn CaptureSource>,
        fallback: Box<dyn CaptureSource>,
        encoder: Box<dyn SegmentEncoder>,
        config: TransmitConfig,
    ) -> Result<Self, RelayError> {
        config.validate().map_err(RelayError::ConfigurationFailed)?;
        Ok(Self {
            shared: Arc::new(TransmitShared {
                inner: Mutex::new(TransmitInner {
                    state: TransmitState::Idle,
                    transport: None,
                    session: None,
                }),
                replies: ReplyCorrelator::new(),
                delegate: Mutex::new(None),
                config,
                live: Mutex::new(live),
                fallback: Mutex::new(fallback),
                encoder: Mutex::new(encoder),
            }),
            connector,
        })
    }

    pub fn set_delegate(&self, delegate: Arc<dyn TransmitDelegate>) {
        *self.shared.delegate.lock() = Some(delegate);
    }

    pub fn state(&self) -> TransmitState {
        self.shared.inner.lock().state
    }

    pub fn session_phase(&self) -> Option<SessionPhase> {
        self.shared.inner.lock().session.as_ref().map(|s| s.phase())
    }

    /// Connect, announce the channel name, and start streaming once the
    /// registry accepts it.
    ///
    /// Blocks through connection and handshake. On rejection or timeout the
    /// session is closed and the controller returns to idle; the reason is
    /// in the returned error.
    pub fn start(&self, channel: &str) -> Result<(), RelayError> {
        let channel = channel.trim();
        if channel.is_empty() {
            return Err(RelayError::EmptyChannelName);
        }

        {
            let mut inner = self.shared.inner.lock();
            if !inner.state.is_idle() {
                return Err(RelayError::InvalidState(format!(
                    "cannot start while {:?}",
                    inner.state
                )));
            }
            inner.state = TransmitState::Connecting;
        }
        notify_state(&self.shared);

        let shared = Arc::clone(&self.shared);
        let on_event: TransportEventCallback =
            Arc::new(move |event| handle_transport_event(&shared, event));
        let transport: Arc<dyn Transport> = match self.connector.connect(on_event) {
            Ok(t) => Arc::from(t),
            Err(e) => {
                shutdown(&self.shared, None);
                return Err(e);
            }
        };

        {
            let mut inner = self.shared.inner.lock();
            inner.transport = Some(Arc::clone(&transport));
            inner.state = TransmitState::AwaitingHandshake;
        }
        notify_state(&self.shared);

        // Register the expectation before the name goes out so a fast
        // reply cannot slip past the waiter.
        let pending = self.shared.replies.expect();
        if let Err(e) = transport.send_text(channel) {
            self.shared.replies.cancel();
            shutdown(&self.shared, None);
            return Err(e);
        }

        let verdict = pending.wait(self.shared.config.handshake_timeout);
        self.shared.replies.cancel();

        let reply = match verdict {
            Ok(reply) => reply,
            Err(e) => {
                shutdown(&self.shared, None);
                return Err(e);
            }
        };
        if reply != HANDSHAKE_ACCEPTED {
            shutdown(&self.shared, None);
            return Err(RelayError::HandshakeRejected(reply));
        }

        match begin_streaming(&self.shared, transport) {
            Ok(()) => Ok(()),
            Err(e) => {
                shutdown(&self.shared, None);
                Err(e)
            }
        }
    }

    /// Stop streaming, release the capture source, and close the session.
    /// Safe to call repeatedly and after a transport close.
    pub fn stop(&self) {
        shutdown(&self.shared, None);
    }
}

/// Acquire a source, arm the encoder, and start the cadence loop.
fn begin_streaming(
    shared: &Arc<TransmitShared>,
    transport: Arc<dyn Transport>,
) -> Result<(), RelayError> {
    let constraints = shared.config.constraints;

    let callback: SampleCallback = {
        let shared = Arc::clone(shared);
        Arc::new(move |samples, rate, channels| {
            let conformed = mono::conform(samples, channels, rate, constraints.sample_rate);
            shared.encoder.lock().push_samples(&conformed);
        })
    };

    let mut session = CaptureSession::new();
    let kind = {
        let mut live = shared.live.lock();
        let mut fallback = shared.fallback.lock();
        session.acquire(live.as_mut(), fallback.as_mut(), &constraints, callback)?
    };

    if let Err(e) = shared.encoder.lock().begin(&constraints) {
        release_source(shared, kind);
        return Err(e);
    }

    let interval = match kind {
        SourceKind::Live => shared.config.live_interval,
        SourceKind::Fallback => shared.config.fallback_interval,
    };

    let flush = {
        let shared = Arc::clone(shared);
        let transport = Arc::clone(&transport);
        move || flush_segment(&shared, &transport)
    };
    session.stream(interval, flush)?;

    {
        let mut inner = shared.inner.lock();
        inner.session = Some(session);
        inner.state = TransmitState::Streaming { source: kind };
    }
    notify_state(shared);
    Ok(())
}

/// One cadence tick: flush the encoder and forward the segment while the
/// session is open. Segments produced against a closed session are
/// dropped; backpressure is transport-level only.
fn flush_segment(shared: &Arc<TransmitShared>, transport: &Arc<dyn Transport>) {
    let segment = match shared.encoder.lock().take_segment() {
        Ok(segment) => segment,
        Err(e) => {
            log::error!("segment flush failed: {e}");
            return;
        }
    };
    if segment.is_empty() {
        return;
    }
    if !transport.is_open() {
        log::debug!("dropping {} byte segment: transport not open", segment.len());
        return;
    }
    if let Err(e) = transport.send_binary(&segment) {
        log::warn!("failed to forward segment: {e}");
    }
}

fn handle_transport_event(shared: &Arc<TransmitShared>, event: TransportEvent) {
    match event {
        TransportEvent::Frame(InboundFrame::Text(text)) => {
            if shared.replies.resolve(&text) {
                return;
            }
            match ControlMessage::parse(&text) {
                Some(ControlMessage::ListenerCount(count)) => {
                    if let Some(delegate) = current_delegate(shared) {
                        delegate.on_listener_count(count);
                    }
                }
                // Directory updates are a listener-side concern.
                Some(ControlMessage::ChannelList(_)) => {}
                None => log::debug!("ignoring non-control text frame: {text}"),
            }
        }
        TransportEvent::Frame(InboundFrame::Binary(_)) => {
            log::debug!("ignoring unexpected binary frame on transmitter session");
        }
        TransportEvent::Closed => {
            shared.replies.cancel();
            let was_active = {
                let inner = shared.inner.lock();
                inner.session.is_some()
            };
            shutdown(
                shared,
                if was_active {
                    Some(RelayError::ConnectionClosed)
                } else {
                    None
                },
            );
        }
    }
}

/// Stop capture, release the source, close the transport, return to idle.
/// Idempotent; every error edge funnels through here.
fn shutdown(shared: &Arc<TransmitShared>, error: Option<RelayError>) {
    let (session, transport) = {
        let mut guard = shared.inner.lock();
        let inner = &mut *guard;
        let already_down = inner.session.is_none() && inner.transport.is_none();
        if inner.state == TransmitState::Stopped || (already_down && inner.state.is_idle()) {
            return;
        }
        inner.state = TransmitState::Stopped;
        (inner.session.take(), inner.transport.take())
    };
    notify_state(shared);

    if let Some(mut session) = session {
        let kind = session.kind();
        session.stop();
        if let Some(kind) = kind {
            release_source(shared, kind);
        }

        match shared.encoder.lock().finish() {
            Ok(tail) if !tail.is_empty() => {
                if let Some(t) = transport.as_ref().filter(|t| t.is_open()) {
                    if let Err(e) = t.send_binary(&tail) {
                        log::debug!("failed to forward trailing segment: {e}");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => log::debug!("encoder finish failed: {e}"),
        }
    }

    shared.replies.cancel();
    if let Some(t) = transport {
        t.close();
    }

    // Ready for the next start.
    shared.inner.lock().state = TransmitState::Idle;

    if let Some(e) = error {
        if let Some(delegate) = current_delegate(shared) {
            delegate.on_error(&e);
        }
    }
}

fn release_source(shared: &TransmitShared, kind: SourceKind) {
    match kind {
        SourceKind::Live => shared.live.lock().stop(),
        SourceKind::Fallback => shared.fallback.lock().stop(),
    }
}

fn current_delegate(shared: &TransmitShared) -> Option<Arc<dyn TransmitDelegate>> {
    shared.delegate.lock().clone()
}

fn notify_state(shared: &Arc<TransmitShared>) {
    let state = shared.inner.lock().state;
    if let Some(delegate) = current_delegate(shared) {
        delegate.on_state_changed(&state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::CaptureConstraints;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    // --- transport fake ---

    #[derive(Default)]
    struct FakeNet {
        open: AtomicBool,
        texts: Mutex<Vec<String>>,
        binaries: Mutex<Vec<Vec<u8>>>,
        callback: Mutex<Option<TransportEventCallback>>,
        refuse_connect: AtomicBool,
    }

    impl FakeNet {
        fn emit(&self, event: TransportEvent) {
            let callback = self.callback.lock().clone();
            if let Some(callback) = callback {
                callback(event);
            }
        }

        fn emit_text(&self, text: &str) {
            self.emit(TransportEvent::Frame(InboundFrame::Text(text.into())));
        }

        fn emit_closed(&self) {
            self.open.store(false, Ordering::SeqCst);
            self.emit(TransportEvent::Closed);
        }

        /// Emit `text` from another thread after a short delay, like a
        /// registry answering the handshake.
        fn reply_later(self: &Arc<Self>, text: &'static str) {
            let net = Arc::clone(self);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                net.emit_text(text);
            });
        }

        fn sent_texts(&self) -> Vec<String> {
            self.texts.lock().clone()
        }

        fn sent_binaries(&self) -> Vec<Vec<u8>> {
            self.binaries.lock().clone()
        }
    }

    struct FakeConnector {
        net: Arc<FakeNet>,
    }

    impl TransportConnector for FakeConnector {
        fn connect(
            &self,
            on_event: TransportEventCallback,
        ) -> Result<Box<dyn Transport>, RelayError> {
            if self.net.refuse_connect.load(Ordering::SeqCst) {
                return Err(RelayError::Transport("connection refused".into()));
            }
            *self.net.callback.lock() = Some(on_event);
            self.net.open.store(true, Ordering::SeqCst);
            Ok(Box::new(FakeTransport {
                net: Arc::clone(&self.net),
            }))
        }
    }

    struct FakeTransport {
        net: Arc<FakeNet>,
    }

    impl Transport for FakeTransport {
        fn is_open(&self) -> bool {
            self.net.open.load(Ordering::SeqCst)
        }

        fn send_text(&self, text: &str) -> Result<(), RelayError> {
            if !self.is_open() {
                return Err(RelayError::NotConnected);
            }
            self.net.texts.lock().push(text.to_owned());
            Ok(())
        }

        fn send_binary(&self, segment: &[u8]) -> Result<(), RelayError> {
            if !self.is_open() {
                return Err(RelayError::NotConnected);
            }
            self.net.binaries.lock().push(segment.to_vec());
            Ok(())
        }

        fn close(&self) {
            self.net.open.store(false, Ordering::SeqCst);
        }
    }

    // --- capture source fake ---

    struct FlaggedSource {
        kind: SourceKind,
        fail: bool,
        started: Arc<AtomicBool>,
    }

    impl CaptureSource for FlaggedSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn is_available(&self) -> bool {
            !self.fail
        }

        fn start(
            &mut self,
            _constraints: &CaptureConstraints,
            _callback: SampleCallback,
        ) -> Result<(), RelayError> {
            if self.fail {
                return Err(RelayError::SourceUnavailable);
            }
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) {
            self.started.store(false, Ordering::SeqCst);
        }

        fn description(&self) -> String {
            "flagged".into()
        }
    }

    // --- encoder fake ---

    /// Emits one scripted segment per flush, then empties.
    struct ScriptedEncoder {
        began: bool,
        segments: VecDeque<Vec<u8>>,
        tail: Vec<u8>,
    }

    impl ScriptedEncoder {
        fn new(segments: Vec<Vec<u8>>) -> Self {
            Self {
                began: false,
                segments: segments.into(),
                tail: Vec::new(),
            }
        }
    }

    impl SegmentEncoder for ScriptedEncoder {
        fn begin(&mut self, _constraints: &CaptureConstraints) -> Result<(), RelayError> {
            self.began = true;
            Ok(())
        }

        fn push_samples(&mut self, _samples: &[f32]) {}

        fn take_segment(&mut self) -> Result<Vec<u8>, RelayError> {
            Ok(self.segments.pop_front().unwrap_or_default())
        }

        fn finish(&mut self) -> Result<Vec<u8>, RelayError> {
            Ok(std::mem::take(&mut self.tail))
        }
    }

    // --- delegate fake ---

    #[derive(Default)]
    struct RecordingDelegate {
        states: Mutex<Vec<TransmitState>>,
        counts: Mutex<Vec<u64>>,
        errors: Mutex<Vec<RelayError>>,
    }

    impl TransmitDelegate for RecordingDelegate {
        fn on_state_changed(&self, state: &TransmitState) {
            self.states.lock().push(*state);
        }

        fn on_listener_count(&self, count: u64) {
            self.counts.lock().push(count);
        }

        fn on_error(&self, error: &RelayError) {
            self.errors.lock().push(error.clone());
        }
    }

    // --- harness ---

    struct Harness {
        controller: CaptureController,
        net: Arc<FakeNet>,
        delegate: Arc<RecordingDelegate>,
        live_started: Arc<AtomicBool>,
        fallback_started: Arc<AtomicBool>,
    }

    fn harness(live_fails: bool, segments: Vec<Vec<u8>>) -> Harness {
        let net = Arc::new(FakeNet::default());
        let delegate = Arc::new(RecordingDelegate::default());
        let live_started = Arc::new(AtomicBool::new(false));
        let fallback_started = Arc::new(AtomicBool::new(false));

        let config = TransmitConfig {
            live_interval: Duration::from_millis(10),
            fallback_interval: Duration::from_millis(10),
            handshake_timeout: Duration::from_millis(500),
            ..Default::default()
        };

        let controller = CaptureController::new(
            Box::new(FakeConnector {
                net: Arc::clone(&net),
            }),
            Box::new(FlaggedSource {
                kind: SourceKind::Live,
                fail: live_fails,
                started: Arc::clone(&live_started),
            }),
            Box::new(FlaggedSource {
                kind: SourceKind::Fallback,
                fail: false,
                started: Arc::clone(&fallback_started),
            }),
            Box::new(ScriptedEncoder::new(segments)),
            config,
        )
        .unwrap();
        controller.set_delegate(Arc::clone(&delegate) as Arc<dyn TransmitDelegate>);

        Harness {
            controller,
            net,
            delegate,
            live_started,
            fallback_started,
        }
    }

    #[test]
    fn empty_channel_name_is_rejected() {
        let h = harness(false, vec![]);
        assert_eq!(h.controller.start("  "), Err(RelayError::EmptyChannelName));
        assert_eq!(h.controller.state(), TransmitState::Idle);
    }

    #[test]
    fn accepted_handshake_starts_live_capture() {
        let h = harness(false, vec![]);
        h.net.reply_later(HANDSHAKE_ACCEPTED);

        h.controller.start("en").unwrap();

        // The channel name is the first and only handshake message.
        assert_eq!(h.net.sent_texts(), vec!["en".to_string()]);
        assert_eq!(
            h.controller.state(),
            TransmitState::Streaming {
                source: SourceKind::Live
            }
        );
        assert!(h.live_started.load(Ordering::SeqCst));
        assert!(!h.fallback_started.load(Ordering::SeqCst));

        h.controller.stop();
    }

    #[test]
    fn rejection_reason_is_surfaced_and_capture_never_starts() {
        let h = harness(false, vec![]);
        h.net.reply_later("Channel already exists");

        let result = h.controller.start("fr");

        assert_eq!(
            result,
            Err(RelayError::HandshakeRejected("Channel already exists".into()))
        );
        assert!(!h.net.open.load(Ordering::SeqCst));
        assert!(!h.live_started.load(Ordering::SeqCst));
        assert_eq!(h.controller.state(), TransmitState::Idle);
    }

    #[test]
    fn handshake_timeout_closes_session() {
        let h = harness(false, vec![]);
        // No reply at all.
        let result = h.controller.start("en");

        assert_eq!(result, Err(RelayError::HandshakeTimeout));
        assert!(!h.net.open.load(Ordering::SeqCst));
        assert!(!h.live_started.load(Ordering::SeqCst));
        assert_eq!(h.controller.state(), TransmitState::Idle);
    }

    #[test]
    fn connect_failure_returns_to_idle() {
        let h = harness(false, vec![]);
        h.net.refuse_connect.store(true, Ordering::SeqCst);

        let result = h.controller.start("en");

        assert!(matches!(result, Err(RelayError::Transport(_))));
        assert_eq!(h.controller.state(), TransmitState::Idle);
    }

    #[test]
    fn device_failure_falls_back_to_tone() {
        let h = harness(true, vec![]);
        h.net.reply_later(HANDSHAKE_ACCEPTED);

        h.controller.start("en").unwrap();

        assert_eq!(
            h.controller.state(),
            TransmitState::Streaming {
                source: SourceKind::Fallback
            }
        );
        assert!(h.fallback_started.load(Ordering::SeqCst));

        h.controller.stop();
        assert!(!h.fallback_started.load(Ordering::SeqCst));
    }

    #[test]
    fn segments_are_forwarded_while_open() {
        let h = harness(
            false,
            vec![b"one".to_vec(), Vec::new(), b"two".to_vec()],
        );
        h.net.reply_later(HANDSHAKE_ACCEPTED);
        h.controller.start("en").unwrap();

        thread::sleep(Duration::from_millis(80));
        h.controller.stop();

        // Empty flushes are skipped; the scripted segments arrive in order.
        assert_eq!(h.net.sent_binaries(), vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn stop_halts_forwarding_and_releases_source() {
        let h = harness(false, vec![]);
        h.net.reply_later(HANDSHAKE_ACCEPTED);
        h.controller.start("en").unwrap();

        h.controller.stop();

        assert_eq!(h.controller.state(), TransmitState::Idle);
        assert!(!h.live_started.load(Ordering::SeqCst));
        assert!(!h.net.open.load(Ordering::SeqCst));

        let sent = h.net.sent_binaries().len();
        thread::sleep(Duration::from_millis(40));
        assert_eq!(h.net.sent_binaries().len(), sent);
    }

    #[test]
    fn stop_is_idempotent() {
        let h = harness(false, vec![]);
        h.net.reply_later(HANDSHAKE_ACCEPTED);
        h.controller.start("en").unwrap();

        h.controller.stop();
        h.controller.stop();

        assert_eq!(h.controller.state(), TransmitState::Idle);
    }

    #[test]
    fn start_while_streaming_is_rejected() {
        let h = harness(false, vec![]);
        h.net.reply_later(HANDSHAKE_ACCEPTED);
        h.controller.start("en").unwrap();

        assert!(matches!(
            h.controller.start("fr"),
            Err(RelayError::InvalidState(_))
        ));

        h.controller.stop();
    }

    #[test]
    fn listener_count_reaches_delegate() {
        let h = harness(false, vec![]);
        h.net.reply_later(HANDSHAKE_ACCEPTED);
        h.controller.start("en").unwrap();

        h.net.emit_text(r#"{"type":"client_count","count":3}"#);
        h.net.emit_text(r#"{"type":"client_count","count":5}"#);
        h.net.emit_text("not a control message");

        assert_eq!(h.delegate.counts.lock().as_slice(), &[3, 5]);

        h.controller.stop();
    }

    #[test]
    fn transport_close_mid_stream_stops_capture() {
        let h = harness(false, vec![]);
        h.net.reply_later(HANDSHAKE_ACCEPTED);
        h.controller.start("en").unwrap();

        h.net.emit_closed();

        assert_eq!(h.controller.state(), TransmitState::Idle);
        assert!(!h.live_started.load(Ordering::SeqCst));
        assert_eq!(
            h.delegate.errors.lock().as_slice(),
            &[RelayError::ConnectionClosed]
        );

        // Stop after the close stays a no-op.
        h.controller.stop();
    }
}
