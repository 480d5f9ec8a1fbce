use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chromecast_protocol::namespaces::Receiver;
use chromecast_protocol::{self as protocol, Volume, PLATFORM_DESTINATION_ID, RECEIVER_NAMESPACE};
use log::{debug, info};

use super::{parse_payload, Channel, ChannelAction, ChannelMessage};
use crate::config::PlayerConfig;
use crate::error::{CastError, Result};
use crate::transport::Transport;

/// A running cast application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationSession {
    pub app_id: String,
    pub session_id: String,
    /// Destination id for messages addressed to the application.
    pub transport_id: String,
    pub display_name: String,
}

impl From<&protocol::Application> for ApplicationSession {
    fn from(app: &protocol::Application) -> Self {
        Self {
            app_id: app.app_id.clone(),
            session_id: app.session_id.clone(),
            transport_id: app.transport_id.clone(),
            display_name: app.display_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverStatus {
    pub volume_level: f64,
    pub muted: bool,
    pub applications: Vec<ApplicationSession>,
}

impl ReceiverStatus {
    pub fn application(&self, app_id: &str) -> Option<&ApplicationSession> {
        self.applications.iter().find(|app| app.app_id == app_id)
    }
}

impl From<&protocol::Status> for ReceiverStatus {
    fn from(status: &protocol::Status) -> Self {
        Self {
            volume_level: status.volume.level,
            muted: status.volume.muted,
            applications: status
                .applications
                .iter()
                .flatten()
                .map(ApplicationSession::from)
                .collect(),
        }
    }
}

/// Called with every status the receiver pushes without being asked, e.g.
/// after the volume was changed with a remote.
pub type StatusListener = Arc<dyn Fn(&ReceiverStatus) + Send + Sync>;

/// Launches and stops applications and controls the device volume.
///
/// Caches the session of the application it launched until the receiver
/// reports that the application is gone or the player disconnects.
pub struct ReceiverChannel {
    request_timeout: Duration,
    launch_timeout: Duration,
    launch_status_retries: u8,
    launch_retry_delay: Duration,
    session: Mutex<Option<ApplicationSession>>,
    status: Mutex<Option<ReceiverStatus>>,
    status_listener: Option<StatusListener>,
}

impl ReceiverChannel {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            launch_timeout: config.launch_timeout(),
            launch_status_retries: config.launch_status_retries,
            launch_retry_delay: config.launch_retry_delay(),
            session: Mutex::new(None),
            status: Mutex::new(None),
            status_listener: None,
        }
    }

    pub fn with_status_listener(mut self, listener: StatusListener) -> Self {
        self.status_listener = Some(listener);
        self
    }

    pub fn session(&self) -> Option<ApplicationSession> {
        self.session_lock().clone()
    }

    /// Last status the receiver reported, solicited or not.
    pub fn status(&self) -> Option<ReceiverStatus> {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Launches `app_id` and waits until the receiver lists it as running.
    pub async fn launch(&self, transport: &Transport, app_id: &str) -> Result<ApplicationSession> {
        let request_id = transport.next_request_id();
        let reply = transport
            .send_and_await(
                PLATFORM_DESTINATION_ID,
                &Receiver::Launch {
                    app_id: app_id.to_owned(),
                    request_id,
                },
                self.launch_timeout,
            )
            .await?;
        let mut status = expect_status(reply)?;

        let mut attempt = 0;
        loop {
            if let Some(app) = status.application(app_id) {
                info!("Launched {app_id} with session {}", app.session_id);
                *self.session_lock() = Some(app.clone());
                return Ok(app.clone());
            }
            if attempt >= self.launch_status_retries {
                return Err(CastError::rejected(format!(
                    "application {app_id} did not start"
                )));
            }
            attempt += 1;
            debug!("{app_id} is not running yet, polling receiver status ({attempt})");
            tokio::time::sleep(self.launch_retry_delay).await;
            status = self.get_status(transport).await?;
        }
    }

    pub async fn get_status(&self, transport: &Transport) -> Result<ReceiverStatus> {
        let request_id = transport.next_request_id();
        let reply = transport
            .send_and_await(
                PLATFORM_DESTINATION_ID,
                &Receiver::GetStatus { request_id },
                self.request_timeout,
            )
            .await?;
        expect_status(reply)
    }

    pub async fn set_volume(&self, transport: &Transport, level: f64) -> Result<ReceiverStatus> {
        self.send_volume(
            transport,
            Volume {
                level: Some(level.clamp(0.0, 1.0)),
                muted: None,
            },
        )
        .await
    }

    pub async fn set_muted(&self, transport: &Transport, muted: bool) -> Result<ReceiverStatus> {
        self.send_volume(
            transport,
            Volume {
                level: None,
                muted: Some(muted),
            },
        )
        .await
    }

    /// Stops the cached application, if any. The receiver does not reliably
    /// answer STOP, so this only waits for the write.
    pub async fn stop_application(&self, transport: &Transport) -> Result<()> {
        let Some(session) = self.session_lock().take() else {
            return Ok(());
        };
        debug!("Stopping session {}", session.session_id);
        let request_id = transport.next_request_id();
        transport
            .send_and_await(
                PLATFORM_DESTINATION_ID,
                &Receiver::StopSession {
                    request_id,
                    session_id: session.session_id,
                },
                self.request_timeout,
            )
            .await?;
        Ok(())
    }

    async fn send_volume(&self, transport: &Transport, volume: Volume) -> Result<ReceiverStatus> {
        let request_id = transport.next_request_id();
        let reply = transport
            .send_and_await(
                PLATFORM_DESTINATION_ID,
                &Receiver::SetVolume { volume, request_id },
                self.request_timeout,
            )
            .await?;
        expect_status(reply)
    }

    fn session_lock(&self) -> MutexGuard<'_, Option<ApplicationSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn expect_status(reply: Option<ChannelMessage>) -> Result<ReceiverStatus> {
    match reply {
        Some(ChannelMessage::Receiver(Receiver::Status { status, .. })) => {
            Ok(ReceiverStatus::from(&status))
        }
        Some(ChannelMessage::Receiver(Receiver::LaunchError { reason, .. })) => Err(
            CastError::rejected(format!("launch failed: {}", reason.as_deref().unwrap_or("unknown"))),
        ),
        Some(ChannelMessage::Receiver(Receiver::InvalidRequest { reason, .. })) => {
            Err(CastError::rejected(format!("invalid request: {reason:?}")))
        }
        other => Err(CastError::protocol(format!(
            "unexpected reply to receiver request: {other:?}"
        ))),
    }
}

impl Channel for ReceiverChannel {
    fn namespace(&self) -> &'static str {
        RECEIVER_NAMESPACE
    }

    fn parse(&self, payload: &str) -> Result<ChannelMessage> {
        parse_payload(payload).map(ChannelMessage::Receiver)
    }

    fn on_incoming(&self, _source_id: &str, message: &ChannelMessage) -> ChannelAction {
        let ChannelMessage::Receiver(Receiver::Status { status, request_id }) = message else {
            return ChannelAction::None;
        };
        let status = ReceiverStatus::from(status);

        {
            let mut session = self.session_lock();
            if let Some(current) = session.as_ref() {
                match status.application(&current.app_id) {
                    Some(app) => *session = Some(app.clone()),
                    None => {
                        info!("Application {} is no longer running", current.app_id);
                        *session = None;
                    }
                }
            }
        }

        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = Some(status.clone());

        if *request_id == 0 {
            if let Some(listener) = &self.status_listener {
                listener(&status);
            }
        }

        ChannelAction::None
    }

    fn reset(&self) {
        *self.session_lock() = None;
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
