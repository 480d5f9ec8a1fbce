use anyhow::Context;
use futures::Stream;
use log::debug;
use mdns_sd::{ResolvedService, ServiceDaemon, ServiceEvent};

use crate::device::ReceiverInfo;

pub const CHROMECAST_MDNS_SERVICE_NAME: &str = "_googlecast._tcp.local.";
pub const CHROMECAST_ID_TXT: &str = "id";
pub const CHROMECAST_FRIENDLY_NAME_TXT: &str = "fn";
pub const CHROMECAST_MODEL_TXT: &str = "md";

fn strip_service_name(fullname: &str, service_name: &str) -> String {
    if let Some(stripped) = fullname.strip_suffix(&format!(".{service_name}")) {
        stripped.to_string()
    } else {
        fullname.to_string()
    }
}

fn txt(service: &ResolvedService, key: &str) -> Option<String> {
    service
        .get_property_val_str(key)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Returns `None` for services without an IPv4 address.
fn receiver_from_service(service: &ResolvedService) -> Option<ReceiverInfo> {
    let mut addresses: Vec<_> = service.get_addresses_v4().iter().copied().collect();
    addresses.sort();
    let host = addresses.first()?.to_string();
    let port = service.get_port();

    let friendly_name = txt(service, CHROMECAST_FRIENDLY_NAME_TXT).unwrap_or_else(|| {
        strip_service_name(service.get_fullname(), CHROMECAST_MDNS_SERVICE_NAME)
    });
    let id = txt(service, CHROMECAST_ID_TXT).unwrap_or_else(|| format!("{host}:{port}"));

    Some(ReceiverInfo {
        id,
        friendly_name,
        r#type: txt(service, CHROMECAST_MODEL_TXT).unwrap_or_default(),
        host,
        port,
    })
}

/// Browses the local network for cast receivers.
///
/// Every resolution of a receiver is yielded, so the same id can show up
/// more than once. Browsing stops when the stream is dropped.
pub fn discover_receivers() -> anyhow::Result<impl Stream<Item = ReceiverInfo> + Send + 'static> {
    let service_daemon =
        ServiceDaemon::new().context("Failed to create mDNS ServiceDaemon")?;
    let events = service_daemon
        .browse(CHROMECAST_MDNS_SERVICE_NAME)
        .with_context(|| format!("Failed to browse `{CHROMECAST_MDNS_SERVICE_NAME}`"))?;

    Ok(futures::stream::unfold(
        (service_daemon, events),
        |(service_daemon, events)| async move {
            loop {
                match events.recv_async().await.ok()? {
                    ServiceEvent::ServiceResolved(service) => {
                        debug!("Receiver resolved: {service:?}");
                        match receiver_from_service(&service) {
                            Some(receiver) => return Some((receiver, (service_daemon, events))),
                            None => debug!(
                                "Ignoring `{}` without an IPv4 address",
                                service.get_fullname()
                            ),
                        }
                    }
                    ServiceEvent::ServiceRemoved(_, fullname) => {
                        debug!("Receiver `{fullname}` went away");
                    }
                    _ => (),
                }
            }
        },
    ))
}
