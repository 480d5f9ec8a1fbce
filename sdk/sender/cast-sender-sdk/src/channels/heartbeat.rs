use chromecast_protocol::namespaces::Heartbeat;
use chromecast_protocol::HEARTBEAT_NAMESPACE;
use log::{debug, error};

use super::{parse_payload, Channel, ChannelAction, ChannelMessage, OutgoingMessage};
use crate::error::Result;

/// Keeps the connection alive by answering the receiver's pings.
#[derive(Debug, Default)]
pub struct HeartbeatChannel;

impl HeartbeatChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Channel for HeartbeatChannel {
    fn namespace(&self) -> &'static str {
        HEARTBEAT_NAMESPACE
    }

    fn parse(&self, payload: &str) -> Result<ChannelMessage> {
        parse_payload(payload).map(ChannelMessage::Heartbeat)
    }

    fn on_incoming(&self, source_id: &str, message: &ChannelMessage) -> ChannelAction {
        match message {
            ChannelMessage::Heartbeat(Heartbeat::Ping) => {
                debug!("Received ping from {source_id}");
                match OutgoingMessage::new(source_id, &Heartbeat::Pong) {
                    Ok(pong) => ChannelAction::Reply(pong),
                    Err(err) => {
                        error!("Failed to build pong: {err}");
                        ChannelAction::None
                    }
                }
            }
            _ => ChannelAction::None,
        }
    }
}
