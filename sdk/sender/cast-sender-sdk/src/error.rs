use std::time::Duration;

use chromecast_protocol::FrameError;

#[derive(thiserror::Error, Debug)]
pub enum CastError {
    #[error("failed to connect: {0}")]
    Connection(String),
    #[error("request {request_id} timed out after {timeout:?}")]
    RequestTimeout { request_id: u64, timeout: Duration },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("receiver rejected the request: {0}")]
    ReceiverRejected(String),
    #[error("failed to resolve media: {0}")]
    Resolver(#[from] ResolverError),
    #[error("disconnected")]
    Disconnected,
    #[error("not connected")]
    NotConnected,
    #[error("no running application session")]
    NoApplicationSession,
    #[error("no media is loaded")]
    NoMediaSession,
    #[error("a connection attempt is already in progress")]
    ConnectInProgress,
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Frame(#[from] FrameError),
}

impl CastError {
    pub(crate) fn protocol(message: impl ToString) -> Self {
        Self::Protocol(message.to_string())
    }

    pub(crate) fn rejected(message: impl ToString) -> Self {
        Self::ReceiverRejected(message.to_string())
    }
}

/// Failure reported by a [`MediaResolver`](crate::resolver::MediaResolver).
#[derive(thiserror::Error, Debug)]
pub enum ResolverError {
    #[error("unsupported content id: {0}")]
    Unsupported(String),
    #[error("no playable stream for {0}")]
    NoStream(String),
    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = CastError> = std::result::Result<T, E>;
