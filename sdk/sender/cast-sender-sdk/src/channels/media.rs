use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chromecast_protocol::namespaces::Media;
use chromecast_protocol::{self as protocol, IdleReason, MEDIA_NAMESPACE};
use log::{debug, warn};

use super::{parse_payload, ApplicationSession, Channel, ChannelAction, ChannelMessage};
use crate::config::PlayerConfig;
use crate::device::{MediaInfo, PlaybackState};
use crate::error::{CastError, Result};
use crate::transport::Transport;

/// Looks up the application session media requests are scoped to.
pub type SessionResolver = Arc<dyn Fn() -> Option<ApplicationSession> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct MediaStatus {
    pub media_session_id: u64,
    pub state: PlaybackState,
    pub idle_reason: Option<IdleReason>,
    /// Seconds into the stream the receiver is playing.
    pub current_time: f64,
    /// Only reported while the media information changes.
    pub duration: Option<f64>,
    pub playback_rate: f64,
    pub active_track_ids: Vec<u64>,
}

impl From<&protocol::MediaStatus> for MediaStatus {
    fn from(status: &protocol::MediaStatus) -> Self {
        Self {
            media_session_id: status.media_session_id,
            state: status.player_state.into(),
            idle_reason: status.idle_reason,
            current_time: status.current_time,
            duration: status.media.as_ref().and_then(|media| media.duration),
            playback_rate: status.playback_rate,
            active_track_ids: status.active_track_ids.clone().unwrap_or_default(),
        }
    }
}

/// Controls playback inside the launched application.
pub struct MediaChannel {
    request_timeout: Duration,
    load_timeout: Duration,
    resolve_session: SessionResolver,
    media_session_id: Mutex<Option<u64>>,
}

impl MediaChannel {
    pub fn new(config: &PlayerConfig, resolve_session: SessionResolver) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            load_timeout: config.load_timeout(),
            resolve_session,
            media_session_id: Mutex::new(None),
        }
    }

    pub fn media_session_id(&self) -> Option<u64> {
        *self.media_session_lock()
    }

    pub async fn load(
        &self,
        transport: &Transport,
        media: &MediaInfo,
        autoplay: bool,
        active_track_ids: &[u64],
    ) -> Result<MediaStatus> {
        let session = self.session()?;
        let request_id = transport.next_request_id();
        let load = Media::Load {
            request_id,
            media: media.to_gcast(),
            autoplay: Some(autoplay),
            current_time: None,
            playback_rate: None,
            active_track_ids: (!active_track_ids.is_empty()).then(|| active_track_ids.to_vec()),
        };

        debug!("Loading {} into session {}", media.content_id, session.session_id);

        let reply = transport
            .send_and_await(&session.transport_id, &load, self.load_timeout)
            .await?;
        let status = expect_statuses(reply)?
            .first()
            .map(MediaStatus::from)
            .ok_or_else(|| CastError::protocol("LOAD was answered without a media status"))?;

        *self.media_session_lock() = Some(status.media_session_id);

        Ok(status)
    }

    pub async fn play(&self, transport: &Transport) -> Result<()> {
        let media_session_id = self.current_media_session()?;
        let request_id = transport.next_request_id();
        self.command(
            transport,
            &Media::Resume {
                media_session_id,
                request_id,
            },
        )
        .await
    }

    pub async fn pause(&self, transport: &Transport) -> Result<()> {
        let media_session_id = self.current_media_session()?;
        let request_id = transport.next_request_id();
        self.command(
            transport,
            &Media::Pause {
                media_session_id,
                request_id,
            },
        )
        .await
    }

    /// Seeks to `seconds` into the stream being played.
    pub async fn seek(&self, transport: &Transport, seconds: f64) -> Result<()> {
        let media_session_id = self.current_media_session()?;
        let request_id = transport.next_request_id();
        self.command(
            transport,
            &Media::Seek {
                media_session_id,
                request_id,
                current_time: Some(seconds),
            },
        )
        .await
    }

    pub async fn set_playback_rate(&self, transport: &Transport, rate: f64) -> Result<()> {
        let media_session_id = self.current_media_session()?;
        let request_id = transport.next_request_id();
        self.command(
            transport,
            &Media::SetPlaybackRate {
                media_session_id,
                request_id,
                playback_rate: rate,
            },
        )
        .await
    }

    /// Stops the media and forgets its session. Does not wait for an answer.
    pub async fn stop(&self, transport: &Transport) -> Result<()> {
        let session = self.session()?;
        let Some(media_session_id) = self.media_session_lock().take() else {
            return Ok(());
        };
        let request_id = transport.next_request_id();
        transport
            .send_and_await(
                &session.transport_id,
                &Media::Stop {
                    media_session_id,
                    request_id,
                },
                self.request_timeout,
            )
            .await?;
        Ok(())
    }

    /// Current status of the loaded media, or `None` if the receiver no
    /// longer has a media session.
    pub async fn get_status(&self, transport: &Transport) -> Result<Option<MediaStatus>> {
        let session = self.session()?;
        let media_session_id = self.media_session_id();
        let request_id = transport.next_request_id();
        let reply = transport
            .send_and_await(
                &session.transport_id,
                &Media::GetStatus {
                    media_session_id,
                    request_id,
                },
                self.request_timeout,
            )
            .await?;

        let statuses = expect_statuses(reply)?;
        let status = statuses
            .iter()
            .find(|status| Some(status.media_session_id) == media_session_id)
            .or_else(|| statuses.first())
            .map(MediaStatus::from);

        if status.is_none() {
            *self.media_session_lock() = None;
        }

        Ok(status)
    }

    async fn command(&self, transport: &Transport, message: &Media) -> Result<()> {
        let session = self.session()?;
        let reply = transport
            .send_and_await(&session.transport_id, message, self.request_timeout)
            .await?;
        expect_statuses(reply)?;
        Ok(())
    }

    fn session(&self) -> Result<ApplicationSession> {
        (self.resolve_session)().ok_or(CastError::NoApplicationSession)
    }

    fn current_media_session(&self) -> Result<u64> {
        self.media_session_id().ok_or(CastError::NoMediaSession)
    }

    fn media_session_lock(&self) -> MutexGuard<'_, Option<u64>> {
        self.media_session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn expect_statuses(reply: Option<ChannelMessage>) -> Result<Vec<protocol::MediaStatus>> {
    let reply = match reply {
        Some(ChannelMessage::Media(reply)) => reply,
        other => {
            return Err(CastError::protocol(format!(
                "unexpected reply to media request: {other:?}"
            )))
        }
    };

    match reply {
        Media::Status { status, .. } => Ok(status),
        Media::LoadFailed { .. } => Err(CastError::rejected("load failed")),
        Media::LoadCancelled { .. } => Err(CastError::rejected("load cancelled")),
        Media::InvalidPlayerState { .. } => Err(CastError::rejected("invalid player state")),
        Media::InvalidRequest { reason, .. } => {
            Err(CastError::rejected(format!("invalid request: {reason:?}")))
        }
        Media::Error {
            reason,
            detailed_error_code,
            ..
        } => Err(CastError::rejected(format!(
            "error {}: {}",
            detailed_error_code.unwrap_or_default(),
            reason.as_deref().unwrap_or("unknown")
        ))),
        other => Err(CastError::protocol(format!(
            "unexpected reply to media request: {other:?}"
        ))),
    }
}

impl Channel for MediaChannel {
    fn namespace(&self) -> &'static str {
        MEDIA_NAMESPACE
    }

    fn parse(&self, payload: &str) -> Result<ChannelMessage> {
        parse_payload(payload).map(ChannelMessage::Media)
    }

    fn on_incoming(&self, _source_id: &str, message: &ChannelMessage) -> ChannelAction {
        match message {
            ChannelMessage::Media(Media::Status {
                request_id: 0,
                status,
            }) => {
                if let Some(status) = status.first() {
                    *self.media_session_lock() = Some(status.media_session_id);
                }
            }
            ChannelMessage::Media(Media::Error {
                request_id: 0,
                reason,
                ..
            }) => warn!("Receiver reported a media error: {reason:?}"),
            _ => {}
        }
        ChannelAction::None
    }

    fn reset(&self) {
        *self.media_session_lock() = None;
    }
}
