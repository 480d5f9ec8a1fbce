//! An in-process cast device speaking the framed protocol over a
//! `tokio::io::duplex` pipe.

use std::time::Duration;

use chromecast_protocol::protos::{CastMessage, Payload};
use chromecast_protocol::{codec, MAX_FRAME_LENGTH};
use serde_json::Value;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A message the device received from the sender.
#[derive(Debug, Clone)]
pub(crate) struct Incoming {
    pub namespace: String,
    pub source_id: String,
    pub destination_id: String,
    pub payload: Value,
}

impl Incoming {
    pub fn message_type(&self) -> &str {
        self.payload["type"].as_str().unwrap_or_default()
    }

    pub fn request_id(&self) -> u64 {
        self.payload["requestId"].as_u64().unwrap_or(0)
    }

    /// Builds an answer on the same namespace, addressed back to the sender.
    pub fn reply(&self, payload: Value) -> CastMessage {
        message(
            &self.namespace,
            &self.destination_id,
            &self.source_id,
            payload,
        )
    }
}

pub(crate) fn message(namespace: &str, source_id: &str, destination_id: &str, payload: Value) -> CastMessage {
    CastMessage::new(
        source_id,
        destination_id,
        namespace,
        Payload::Utf8(payload.to_string()),
    )
}

pub(crate) struct FakeReceiver {
    requests: mpsc::UnboundedReceiver<Incoming>,
    outgoing: mpsc::UnboundedSender<CastMessage>,
    hang_up: CancellationToken,
}

impl FakeReceiver {
    /// Starts the device. `responder` sees every message the sender writes and
    /// returns the frames to answer with.
    pub fn spawn<F>(mut responder: F) -> (DuplexStream, Self)
    where
        F: FnMut(&Incoming) -> Vec<CastMessage> + Send + 'static,
    {
        let (client, server) = tokio::io::duplex(MAX_FRAME_LENGTH * 4);
        let (mut reader, mut writer) = tokio::io::split(server);
        let (requests_tx, requests) = mpsc::unbounded_channel();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<CastMessage>();
        let hang_up = CancellationToken::new();

        let replies = outgoing.clone();
        let token = hang_up.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_FRAME_LENGTH];
            loop {
                let frame = tokio::select! {
                    _ = token.cancelled() => break,
                    frame = codec::read_frame(&mut reader, &mut buf) => frame,
                };
                let Ok(message) = frame else { break };
                let Some(Payload::Utf8(text)) = message.payload() else {
                    continue;
                };
                let incoming = Incoming {
                    namespace: message.namespace,
                    source_id: message.source_id,
                    destination_id: message.destination_id,
                    payload: serde_json::from_str(&text).unwrap(),
                };
                for reply in responder(&incoming) {
                    let _ = replies.send(reply);
                }
                let _ = requests_tx.send(incoming);
            }
        });

        let token = hang_up.clone();
        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = token.cancelled() => break,
                    message = outgoing_rx.recv() => message,
                };
                let Some(message) = message else { break };
                if codec::write_frame(&mut writer, &message).await.is_err() {
                    break;
                }
            }
        });

        (
            client,
            Self {
                requests,
                outgoing,
                hang_up,
            },
        )
    }

    /// Sends an unprompted frame to the sender.
    pub fn inject(&self, message: CastMessage) {
        let _ = self.outgoing.send(message);
    }

    /// Drops the device end of the pipe.
    pub fn hang_up(&mut self) {
        self.hang_up.cancel();
    }

    pub async fn next_request(&mut self) -> Incoming {
        tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .expect("no request within 5s")
            .expect("device stopped")
    }

    /// Skips requests until one of type `message_type` arrives.
    pub async fn next_of_type(&mut self, message_type: &str) -> Incoming {
        loop {
            let request = self.next_request().await;
            if request.message_type() == message_type {
                return request;
            }
        }
    }
}
