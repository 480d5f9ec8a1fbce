//! Per-namespace protocol handlers.
//!
//! A channel knows how to build the requests of its namespace and how to react
//! to what arrives on it. Channels never own the socket; operations that talk
//! to the receiver borrow the [`Transport`](crate::transport::Transport).

use std::collections::HashMap;
use std::sync::Arc;

use chromecast_protocol::namespaces::{self, Namespace};
use serde::Serialize;

use crate::error::{CastError, Result};

mod connection;
mod heartbeat;
mod media;
mod receiver;

pub use connection::ConnectionChannel;
pub use heartbeat::HeartbeatChannel;
pub use media::{MediaChannel, MediaStatus, SessionResolver};
pub use receiver::{ApplicationSession, ReceiverChannel, ReceiverStatus, StatusListener};

/// A parsed payload, tagged by the namespace it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    Connection(namespaces::Connection),
    Heartbeat(namespaces::Heartbeat),
    Receiver(namespaces::Receiver),
    Media(namespaces::Media),
}

/// A serialized payload ready to be framed.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub namespace: &'static str,
    pub destination_id: String,
    pub payload: String,
}

impl OutgoingMessage {
    pub fn new<T>(destination_id: impl Into<String>, message: &T) -> Result<Self>
    where
        T: Serialize + Namespace,
    {
        Ok(Self {
            namespace: message.name(),
            destination_id: destination_id.into(),
            payload: serde_json::to_string(message)?,
        })
    }
}

/// What the transport should do after a channel saw a message.
#[derive(Debug, PartialEq)]
pub enum ChannelAction {
    None,
    Reply(OutgoingMessage),
    /// The receiver closed the connection.
    Close,
}

pub trait Channel: Send + Sync {
    fn namespace(&self) -> &'static str;

    fn parse(&self, payload: &str) -> Result<ChannelMessage>;

    fn on_incoming(&self, source_id: &str, message: &ChannelMessage) -> ChannelAction;

    /// Drops cached session state after a disconnect.
    fn reset(&self) {}
}

/// Maps namespaces to the channel that owns them.
#[derive(Default)]
pub struct ChannelRouter {
    channels: HashMap<&'static str, Arc<dyn Channel>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, channel: Arc<dyn Channel>) {
        self.channels.insert(channel.namespace(), channel);
    }

    pub fn route(&self, namespace: &str) -> Option<&Arc<dyn Channel>> {
        self.channels.get(namespace)
    }

    pub fn reset(&self) {
        for channel in self.channels.values() {
            channel.reset();
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(payload: &str) -> Result<T> {
    serde_json::from_str(payload).map_err(|err| CastError::protocol(format!("{err}: {payload}")))
}
