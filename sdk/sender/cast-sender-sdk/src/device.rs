use chromecast_protocol as protocol;

/// A castable device, as announced by a discovery feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverInfo {
    pub id: String,
    pub friendly_name: String,
    /// Model name, e.g. `Chromecast Ultra`.
    pub r#type: String,
    pub host: String,
    pub port: u16,
}

impl ReceiverInfo {
    pub const DEFAULT_PORT: u16 = 8009;

    pub fn new(id: impl Into<String>, friendly_name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            friendly_name: friendly_name.into(),
            r#type: String::new(),
            host: host.into(),
            port: Self::DEFAULT_PORT,
        }
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[derive(Default, PartialEq, Eq, Debug, Clone, Copy)]
pub enum PlaybackState {
    #[default]
    Idle,
    Buffering,
    Playing,
    Paused,
}

impl From<protocol::PlayerState> for PlaybackState {
    fn from(state: protocol::PlayerState) -> Self {
        match state {
            protocol::PlayerState::Idle => PlaybackState::Idle,
            protocol::PlayerState::Buffering => PlaybackState::Buffering,
            protocol::PlayerState::Playing => PlaybackState::Playing,
            protocol::PlayerState::Paused => PlaybackState::Paused,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
}

pub(crate) fn meta_to_gcast_meta(meta: &Metadata) -> Option<protocol::Metadata> {
    if meta.title.is_none() && meta.thumbnail_url.is_none() {
        return None;
    }
    Some(protocol::Metadata::Generic {
        title: meta.title.clone(),
        subtitle: None,
        images: meta
            .thumbnail_url
            .clone()
            .map(|url| vec![protocol::Image { url }]),
        release_date: None,
    })
}

/// What to play.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    /// URL of the media, or an id a [`MediaResolver`](crate::resolver::MediaResolver) understands.
    pub content_id: String,
    /// MIME content type
    pub content_type: String,
    pub metadata: Metadata,
    /// Known duration in seconds, used when the receiver does not report one.
    pub duration: Option<f64>,
    pub is_live_stream: bool,
}

impl MediaInfo {
    pub fn new(content_id: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            content_type: content_type.into(),
            metadata: Metadata::default(),
            duration: None,
            is_live_stream: false,
        }
    }

    pub(crate) fn to_gcast(&self) -> protocol::MediaInformation {
        protocol::MediaInformation {
            content_id: self.content_id.clone(),
            stream_type: if self.is_live_stream {
                protocol::StreamType::Live
            } else {
                protocol::StreamType::Buffered
            },
            content_type: self.content_type.clone(),
            metadata: meta_to_gcast_meta(&self.metadata),
            duration: self.duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub media: MediaInfo,
    pub autoplay: bool,
    /// Position, in seconds, at which the served stream begins. Times reported
    /// by the receiver are relative to it.
    pub seek_seconds: f64,
    /// Quality hint forwarded to the media resolver, e.g. `1080p`.
    pub quality: Option<String>,
    pub active_track_ids: Vec<u64>,
}

impl LoadRequest {
    pub fn new(media: MediaInfo) -> Self {
        Self {
            media,
            autoplay: true,
            seek_seconds: 0.0,
            quality: None,
            active_track_ids: Vec::new(),
        }
    }
}
