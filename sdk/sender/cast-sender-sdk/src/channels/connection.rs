use chromecast_protocol::namespaces::Connection;
use chromecast_protocol::{CONNECTION_NAMESPACE, PLATFORM_DESTINATION_ID};
use log::debug;

use super::{parse_payload, Channel, ChannelAction, ChannelMessage};
use crate::error::Result;
use crate::transport::Transport;

/// Opens and closes virtual connections to endpoints on the receiver.
#[derive(Debug, Default)]
pub struct ConnectionChannel;

impl ConnectionChannel {
    pub fn new() -> Self {
        Self
    }

    /// Nothing answers CONNECT; an unreachable receiver shows up as a
    /// transport failure instead.
    pub async fn connect(&self, transport: &Transport, destination_id: &str) -> Result<()> {
        debug!("Opening virtual connection to {destination_id}");
        transport
            .send(destination_id, &Connection::Connect { conn_type: 0 })
            .await
    }

    pub async fn close(&self, transport: &Transport, destination_id: &str) -> Result<()> {
        debug!("Closing virtual connection to {destination_id}");
        transport.send(destination_id, &Connection::Close).await
    }
}

impl Channel for ConnectionChannel {
    fn namespace(&self) -> &'static str {
        CONNECTION_NAMESPACE
    }

    fn parse(&self, payload: &str) -> Result<ChannelMessage> {
        parse_payload(payload).map(ChannelMessage::Connection)
    }

    fn on_incoming(&self, source_id: &str, message: &ChannelMessage) -> ChannelAction {
        match message {
            ChannelMessage::Connection(Connection::Close) if source_id == PLATFORM_DESTINATION_ID => {
                ChannelAction::Close
            }
            ChannelMessage::Connection(Connection::Close) => {
                debug!("{source_id} closed its virtual connection");
                ChannelAction::None
            }
            _ => ChannelAction::None,
        }
    }
}
