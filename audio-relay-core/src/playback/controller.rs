use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::config::PlaybackConfig;
use crate::models::error::RelayError;
use crate::models::message::{join_command, ControlMessage, InboundFrame, CMD_LEAVE, CMD_LIST_CHANNELS};
use crate::models::state::{PipelineState, PlaybackPhase};
use crate::playback::pipeline::DecodePipeline;
use crate::playback::queue::SegmentQueue;
use crate::timer::schedule_after;
use crate::traits::decode_sink::{DecodeEvent, DecodeEventCallback, DecodeSink, DecodeSinkFactory};
use crate::traits::delegate::PlaybackDelegate;
use crate::traits::transport::{Transport, TransportConnector, TransportEvent, TransportEventCallback};

/// Mutable listener state, protected by one lock.
struct PlaybackInner {
    transport: Option<Arc<dyn Transport>>,
    pipeline: Option<DecodePipeline>,
    queue: SegmentQueue,

    /// An append has been submitted and its completion is still pending.
    appending: bool,

    /// A not-open-yet drain retry is already on the clock.
    retry_scheduled: bool,

    /// The sink reported open before its pipeline was stored.
    pending_opened: bool,

    /// Bumped on every teardown. Delayed callbacks compare the epoch they
    /// captured at scheduling time and no-op when stale.
    epoch: u64,

    phase: PlaybackPhase,
}

/// State reachable from transport threads and timers.
struct PlaybackShared {
    inner: Mutex<PlaybackInner>,
    delegate: Mutex<Option<Arc<dyn PlaybackDelegate>>>,
    config: PlaybackConfig,
}

/// Listener-side controller: owns one transport session and, per joined
/// channel, one decode pipeline plus the segment queue feeding it.
///
/// Inbound frames are dispatched by payload type: control text updates the
/// channel directory, binary segments are queued and drained into the
/// decoder one at a time. Faults tear the pipeline down without touching
/// the transport, so the listener can rejoin.
pub struct PlaybackController {
    shared: Arc<PlaybackShared>,
    connector: Box<dyn TransportConnector>,
    sinks: Box<dyn DecodeSinkFactory>,
}

impl PlaybackController {
    pub fn new(
        connector: Box<dyn TransportConnector>,
        sinks: Box<dyn DecodeSinkFactory>,
        config: PlaybackConfig,
    ) -> Result<Self, RelayError> {
        config.validate().map_err(RelayError::ConfigurationFailed)?;
        Ok(Self {
            shared: Arc::new(PlaybackShared {
                inner: Mutex::new(PlaybackInner {
                    transport: None,
                    pipeline: None,
                    queue: SegmentQueue::new(),
                    appending: false,
                    retry_scheduled: false,
                    pending_opened: false,
                    epoch: 0,
                    phase: PlaybackPhase::Disconnected,
                }),
                delegate: Mutex::new(None),
                config,
            }),
            connector,
            sinks,
        })
    }

    pub fn set_delegate(&self, delegate: Arc<dyn PlaybackDelegate>) {
        *self.shared.delegate.lock() = Some(delegate);
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.shared.inner.lock().phase.clone()
    }

    pub fn pipeline_state(&self) -> Option<PipelineState> {
        self.shared.inner.lock().pipeline.as_ref().map(|p| p.state())
    }

    pub fn queued_segments(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }

    /// Open a transport session if none is open, then request the channel
    /// directory. A usable existing session is kept as-is.
    pub fn connect(&self) -> Result<(), RelayError> {
        {
            let inner = self.shared.inner.lock();
            if inner.transport.as_ref().is_some_and(|t| t.is_open()) {
                return Ok(());
            }
        }

        let shared = Arc::clone(&self.shared);
        let on_event: TransportEventCallback =
            Arc::new(move |event| handle_transport_event(&shared, event));
        let transport: Arc<dyn Transport> = Arc::from(self.connector.connect(on_event)?);

        {
            let mut inner = self.shared.inner.lock();
            inner.transport = Some(Arc::clone(&transport));
        }
        set_phase(&self.shared, PlaybackPhase::Connected);

        transport.send_text(CMD_LIST_CHANNELS)
    }

    /// Join a channel: fresh queue, fresh pipeline, join request.
    ///
    /// Valid only while the transport session is open.
    pub fn join(&self, channel: &str) -> Result<(), RelayError> {
        let channel = channel.trim();
        if channel.is_empty() {
            return Err(RelayError::EmptyChannelName);
        }

        // Any previous pipeline is replaced, never reused.
        teardown(&self.shared);

        let (transport, epoch) = {
            let inner = self.shared.inner.lock();
            let transport = inner
                .transport
                .clone()
                .filter(|t| t.is_open())
                .ok_or(RelayError::NotConnected)?;
            (transport, inner.epoch)
        };

        let sink = self.sinks.make_sink();
        let format = self
            .shared
            .config
            .formats
            .iter()
            .find(|f| sink.supports(f))
            .cloned()
            .ok_or(RelayError::UnsupportedFormat)?;

        let shared = Arc::clone(&self.shared);
        let on_event: DecodeEventCallback =
            Arc::new(move |event| handle_decode_event(&shared, epoch, event));

        let mut pipeline = DecodePipeline::new(sink, format);
        pipeline.open(on_event)?;

        // Store unless a teardown raced the open.
        let mut pipeline = Some(pipeline);
        let opened_early = {
            let mut inner = self.shared.inner.lock();
            if inner.epoch == epoch {
                inner.queue.clear();
                inner.pipeline = pipeline.take();
                std::mem::take(&mut inner.pending_opened)
            } else {
                false
            }
        };
        if let Some(mut stale) = pipeline {
            stale.teardown();
            return Err(RelayError::InvalidState("torn down while joining".into()));
        }
        // The sink may have reported open before the pipeline was stored.
        if opened_early {
            begin_grace(&self.shared);
        }

        transport.send_text(&join_command(channel))?;
        set_phase(&self.shared, PlaybackPhase::Joined(channel.to_owned()));
        Ok(())
    }

    /// Leave the joined channel and tear down the pipeline.
    ///
    /// Safe to call when nothing is open, and safe to call repeatedly.
    pub fn leave(&self) {
        let transport = self.shared.inner.lock().transport.clone();
        if let Some(t) = transport {
            if t.is_open() {
                if let Err(e) = t.send_text(CMD_LEAVE) {
                    log::warn!("leave request failed: {e}");
                }
            }
        }
        teardown(&self.shared);

        let connected = self
            .shared
            .inner
            .lock()
            .transport
            .as_ref()
            .is_some_and(|t| t.is_open());
        if connected {
            set_phase(&self.shared, PlaybackPhase::Connected);
        }
    }

    /// Close the transport session. Teardown follows via the close event.
    pub fn disconnect(&self) {
        let transport = self.shared.inner.lock().transport.take();
        if let Some(t) = transport {
            t.close();
        }
        teardown(&self.shared);
        set_phase(&self.shared, PlaybackPhase::Disconnected);
    }
}

fn handle_transport_event(shared: &Arc<PlaybackShared>, event: TransportEvent) {
    match event {
        TransportEvent::Frame(InboundFrame::Text(text)) => handle_text(shared, &text),
        TransportEvent::Frame(InboundFrame::Binary(segment)) => handle_segment(shared, segment),
        TransportEvent::Closed => handle_transport_closed(shared),
    }
}

fn handle_text(shared: &Arc<PlaybackShared>, text: &str) {
    match ControlMessage::parse(text) {
        Some(ControlMessage::ChannelList(names)) => {
            if let Some(delegate) = current_delegate(shared) {
                delegate.on_channel_list(&names);
            }
        }
        // Count updates are a transmitter-side concern.
        Some(ControlMessage::ListenerCount(_)) => {}
        None => log::debug!("ignoring non-control text frame: {text}"),
    }
}

fn handle_segment(shared: &Arc<PlaybackShared>, segment: Vec<u8>) {
    let accepted = {
        let mut inner = shared.inner.lock();
        match &inner.pipeline {
            Some(p) if p.state().accepts_segments() => {
                inner.queue.push(segment);
                true
            }
            _ => false,
        }
    };
    if accepted {
        drain(shared);
    } else {
        log::debug!("dropping audio segment: no pipeline to feed");
    }
}

fn handle_transport_closed(shared: &Arc<PlaybackShared>) {
    // Listeners must not keep buffering into a dead pipeline.
    shared.inner.lock().transport = None;
    teardown(shared);
    set_phase(shared, PlaybackPhase::Disconnected);
}

fn handle_decode_event(shared: &Arc<PlaybackShared>, epoch: u64, event: DecodeEvent) {
    match event {
        DecodeEvent::Opened => {
            {
                let mut inner = shared.inner.lock();
                if inner.epoch != epoch {
                    return;
                }
                if inner.pipeline.is_none() {
                    // Still being stored by `join`; it picks the flag up.
                    inner.pending_opened = true;
                    return;
                }
            }
            begin_grace(shared);
        }
        DecodeEvent::AppendComplete => {
            {
                let mut guard = shared.inner.lock();
                let inner = &mut *guard;
                if inner.epoch != epoch {
                    return;
                }
                inner.appending = false;
                if let Some(p) = inner.pipeline.as_mut() {
                    if p.state() == PipelineState::Draining {
                        p.set_state(PipelineState::Ready);
                    }
                }
            }
            // Completion is the sole re-entry point that keeps draining.
            drain(shared);
        }
        DecodeEvent::Fault(reason) => fault(shared, epoch, RelayError::DecodeFailed(reason)),
    }
}

/// Schedule the ready grace period once the container reports open.
///
/// The delay lets a small initial buffer accumulate before the first
/// append, trading a moment of latency against startup stutter.
fn begin_grace(shared: &Arc<PlaybackShared>) {
    let epoch = {
        let mut guard = shared.inner.lock();
        let inner = &mut *guard;
        let epoch = inner.epoch;
        match inner.pipeline.as_mut() {
            Some(p) if p.state() == PipelineState::Opening && !p.grace_started() => {
                p.mark_grace_started();
                epoch
            }
            _ => return,
        }
    };

    let shared = Arc::clone(shared);
    let delay = shared.config.start_delay;
    schedule_after("playback-ready", delay, move || {
        let became_ready = {
            let mut guard = shared.inner.lock();
            let inner = &mut *guard;
            inner.epoch == epoch
                && match inner.pipeline.as_mut() {
                    Some(p) if p.state() == PipelineState::Opening => {
                        p.set_state(PipelineState::Ready);
                        true
                    }
                    _ => false,
                }
        };
        if became_ready {
            drain(&shared);
        }
    });
}

enum DrainStep {
    Submit {
        sink: Box<dyn DecodeSink>,
        segment: Vec<u8>,
        epoch: u64,
    },
    Retry {
        epoch: u64,
    },
}

/// Feed the queue into the decoder, one segment in flight at a time.
///
/// The sink is moved out of the pipeline for the duration of a submission
/// so no lock is held across the append; completions that fire
/// synchronously from inside `append` find the sink absent and yield back
/// to this loop.
fn drain(shared: &Arc<PlaybackShared>) {
    loop {
        let step = {
            let mut guard = shared.inner.lock();
            let inner = &mut *guard;
            let epoch = inner.epoch;
            let Some(pipeline) = inner.pipeline.as_mut() else {
                return;
            };
            if inner.appending
                || !pipeline.state().is_ready()
                || inner.queue.is_empty()
                || !pipeline.has_sink()
            {
                return;
            }
            if !pipeline.sink_is_open() {
                // Container still coming up: try again shortly, keeping
                // every queued byte.
                if inner.retry_scheduled {
                    return;
                }
                inner.retry_scheduled = true;
                DrainStep::Retry { epoch }
            } else {
                let Some(segment) = inner.queue.pop() else {
                    return;
                };
                let Some(sink) = pipeline.take_sink() else {
                    return;
                };
                inner.appending = true;
                pipeline.set_state(PipelineState::Draining);
                DrainStep::Submit {
                    sink,
                    segment,
                    epoch,
                }
            }
        };

        match step {
            DrainStep::Retry { epoch } => {
                let shared = Arc::clone(shared);
                let delay = shared.config.retry_delay;
                schedule_after("playback-drain-retry", delay, move || {
                    let current = {
                        let mut inner = shared.inner.lock();
                        inner.retry_scheduled = false;
                        inner.epoch == epoch
                    };
                    if current {
                        drain(&shared);
                    }
                });
                return;
            }
            DrainStep::Submit {
                mut sink,
                segment,
                epoch,
            } => {
                let result = sink.append(segment);

                let mut sink = Some(sink);
                {
                    let mut guard = shared.inner.lock();
                    let inner = &mut *guard;
                    if inner.epoch == epoch {
                        if let (Some(p), Some(s)) = (inner.pipeline.as_mut(), sink.take()) {
                            p.put_sink(s);
                        }
                    }
                }
                // A teardown raced the append; release the orphan here.
                if let Some(mut orphan) = sink {
                    orphan.close();
                    return;
                }

                if let Err(e) = result {
                    fault(shared, epoch, e);
                    return;
                }
            }
        }
    }
}

/// A segment could not be consumed: drop the whole queue (stale data is
/// assumed) and leave the pipeline faulted for caller-driven cleanup.
/// The transport session stays up so the listener can rejoin.
fn fault(shared: &Arc<PlaybackShared>, epoch: u64, error: RelayError) {
    let faulted = {
        let mut guard = shared.inner.lock();
        let inner = &mut *guard;
        if inner.epoch != epoch {
            false
        } else {
            inner.queue.clear();
            inner.appending = false;
            if let Some(p) = inner.pipeline.as_mut() {
                p.set_state(PipelineState::Faulted);
            }
            true
        }
    };
    if faulted {
        log::warn!("decode pipeline faulted: {error}");
        if let Some(delegate) = current_delegate(shared) {
            delegate.on_error(&error);
        }
    }
}

/// Tear down the pipeline and queue. Idempotent; stale timers and in-flight
/// appends are fenced off by the epoch bump.
fn teardown(shared: &Arc<PlaybackShared>) {
    let pipeline = {
        let mut guard = shared.inner.lock();
        let inner = &mut *guard;
        inner.epoch = inner.epoch.wrapping_add(1);
        inner.appending = false;
        inner.retry_scheduled = false;
        inner.pending_opened = false;
        inner.queue.clear();
        inner.pipeline.take()
    };
    if let Some(mut p) = pipeline {
        p.teardown();
    }
}

fn current_delegate(shared: &PlaybackShared) -> Option<Arc<dyn PlaybackDelegate>> {
    shared.delegate.lock().clone()
}

fn set_phase(shared: &Arc<PlaybackShared>, phase: PlaybackPhase) {
    let changed = {
        let mut inner = shared.inner.lock();
        if inner.phase == phase {
            false
        } else {
            inner.phase = phase.clone();
            true
        }
    };
    if changed {
        if let Some(delegate) = current_delegate(shared) {
            delegate.on_phase_changed(&phase);
        }
    }
}
