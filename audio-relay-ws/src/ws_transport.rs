//! WebSocket transport backend.
//!
//! One connection, one background session thread. The thread runs a small
//! tokio runtime that pumps outbound frames from a channel and delivers
//! inbound frames through the controller callback, with the text/binary
//! discriminant decided here at the boundary. The `Closed` event fires
//! exactly once, whether the shutdown was orderly or not.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use audio_relay_core::models::error::RelayError;
use audio_relay_core::models::message::InboundFrame;
use audio_relay_core::traits::transport::{
    Transport, TransportConnector, TransportEvent, TransportEventCallback,
};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

enum Command {
    Send(Message),
    Close,
}

/// Connects to a relay endpoint URL (e.g. `ws://host/ws/client` or
/// `ws://host/ws/transmitter`).
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl TransportConnector for WsConnector {
    fn connect(&self, on_event: TransportEventCallback) -> Result<Box<dyn Transport>, RelayError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| RelayError::Transport(format!("failed to build runtime: {e}")))?;

        let (stream, _response) = runtime
            .block_on(connect_async(self.url.as_str()))
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        let session_open = Arc::clone(&open);
        thread::Builder::new()
            .name("ws-transport".into())
            .spawn(move || {
                runtime.block_on(run_session(
                    stream,
                    command_rx,
                    Arc::clone(&on_event),
                    &session_open,
                ));
                session_open.store(false, Ordering::SeqCst);
                on_event(TransportEvent::Closed);
            })
            .map_err(|e| RelayError::Transport(format!("failed to spawn session thread: {e}")))?;

        Ok(Box::new(WsTransport { commands, open }))
    }
}

/// Pump the socket until either side closes or a command asks us to.
async fn run_session(
    stream: WsStream,
    mut commands: UnboundedReceiver<Command>,
    on_event: TransportEventCallback,
    open: &AtomicBool,
) {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(message)) => {
                    if let Err(e) = sink.send(message).await {
                        log::warn!("websocket send failed: {e}");
                        break;
                    }
                }
                Some(Command::Close) | None => {
                    open.store(false, Ordering::SeqCst);
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        log::debug!("close frame not delivered: {e}");
                    }
                    break;
                }
            },
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    on_event(TransportEvent::Frame(InboundFrame::Text(text.to_string())));
                }
                Some(Ok(Message::Binary(payload))) => {
                    on_event(TransportEvent::Frame(InboundFrame::Binary(payload.to_vec())));
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Ping/pong are answered by the protocol layer.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::warn!("websocket receive failed: {e}");
                    break;
                }
            },
        }
    }
}

struct WsTransport {
    commands: UnboundedSender<Command>,
    open: Arc<AtomicBool>,
}

impl WsTransport {
    fn dispatch(&self, message: Message) -> Result<(), RelayError> {
        if !self.is_open() {
            return Err(RelayError::NotConnected);
        }
        self.commands
            .send(Command::Send(message))
            .map_err(|_| RelayError::NotConnected)
    }
}

impl Transport for WsTransport {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send_text(&self, text: &str) -> Result<(), RelayError> {
        self.dispatch(Message::text(text.to_owned()))
    }

    fn send_binary(&self, segment: &[u8]) -> Result<(), RelayError> {
        self.dispatch(Message::binary(segment.to_vec()))
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        let _ = self.commands.send(Command::Close);
    }
}
