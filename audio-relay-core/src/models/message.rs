use serde::Deserialize;

/// Text command requesting the channel directory.
pub const CMD_LIST_CHANNELS: &str = "list_channels";

/// Text command leaving the current channel.
pub const CMD_LEAVE: &str = "leave";

/// Handshake reply confirming the transmitter's channel was created.
/// Any other reply text is a rejection reason.
pub const HANDSHAKE_ACCEPTED: &str = "Channel created";

/// Build the text command joining a channel.
pub fn join_command(channel: &str) -> String {
    format!("join {channel}")
}

/// One inbound transport frame, discriminated by payload type at the
/// transport boundary. Control traffic is text; audio segments are binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// A parsed control message.
///
/// The registry sends the channel directory as a bare JSON array of names,
/// and listener-count updates as a type-tagged JSON object. Anything else
/// is not a control message and is ignored by the controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    ChannelList(Vec<String>),
    ListenerCount(u64),
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum TaggedMessage {
    #[serde(rename = "client_count")]
    ClientCount { count: u64 },
}

impl ControlMessage {
    /// Parse a text frame into a control message, or `None` when the text
    /// is not one (malformed payloads are never an error).
    pub fn parse(text: &str) -> Option<Self> {
        if let Ok(names) = serde_json::from_str::<Vec<String>>(text) {
            return Some(Self::ChannelList(names));
        }
        if let Ok(TaggedMessage::ClientCount { count }) = serde_json::from_str(text) {
            return Some(Self::ListenerCount(count));
        }
        None
    }
}
