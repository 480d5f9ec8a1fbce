use std::net::SocketAddr;
use std::time::Duration;

use log::debug;
use tokio::net::TcpStream;

use crate::device::ReceiverInfo;
use crate::error::{CastError, Result};

pub(crate) async fn resolve_addrs(receiver: &ReceiverInfo) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(receiver.authority())
        .await
        .map_err(|err| CastError::Connection(format!("failed to resolve {}: {err}", receiver.host)))?
        .collect();
    if addrs.is_empty() {
        return Err(CastError::Connection(format!(
            "no addresses for {}",
            receiver.host
        )));
    }
    Ok(addrs)
}

/// Races a connection attempt to every address and returns the first that
/// succeeds.
pub(crate) async fn try_connect_tcp(addrs: &[SocketAddr], timeout: Duration) -> Result<TcpStream> {
    if addrs.is_empty() {
        return Err(CastError::Connection("no addresses to connect to".to_owned()));
    }

    debug!("Trying to connect to {addrs:?}...");

    let mut connections: Vec<_> = addrs
        .iter()
        .map(|addr| Box::pin(tokio::time::timeout(timeout, TcpStream::connect(*addr))))
        .collect();

    let mut last_error = String::from("timed out");
    while !connections.is_empty() {
        match futures::future::select_all(connections).await {
            (Ok(Ok(stream)), _, _) => return Ok(stream),
            (Ok(Err(err)), _, remaining) => {
                last_error = err.to_string();
                connections = remaining;
            }
            (Err(_), _, remaining) => connections = remaining,
        }
    }

    Err(CastError::Connection(last_error))
}
