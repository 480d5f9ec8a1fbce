use serde::{de, ser, Deserialize, Serialize};
use serde_json::{json, Value};

pub use prost;

pub mod codec;
pub mod protos;

pub use codec::{FrameError, MAX_FRAME_LENGTH};

pub const CONNECTION_NAMESPACE: &str = "urn:x-cast:com.google.cast.tp.connection";
pub const HEARTBEAT_NAMESPACE: &str = "urn:x-cast:com.google.cast.tp.heartbeat";
pub const RECEIVER_NAMESPACE: &str = "urn:x-cast:com.google.cast.receiver";
pub const MEDIA_NAMESPACE: &str = "urn:x-cast:com.google.cast.media";

/// Destination id of the receiver platform itself.
pub const PLATFORM_DESTINATION_ID: &str = "receiver-0";

/// The `type` discriminator and correlation id every payload starts with.
#[derive(Deserialize, Debug, PartialEq, Eq)]
pub struct PayloadHeader {
    #[serde(rename = "type")]
    pub type_: String,
    /// `0` or absent for unsolicited messages.
    #[serde(rename = "requestId")]
    pub request_id: Option<u64>,
}

impl PayloadHeader {
    pub fn peek(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    /// The id to correlate on, if this message answers a request.
    pub fn correlation_id(&self) -> Option<u64> {
        self.request_id.filter(|id| *id != 0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Volume {
    /// Current stream volume level as a value between 0.0 and 1.0 where 1.0 is the maximum volume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    /// Whether the Cast device is muted, independent of the volume level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "BUFFERED")]
    Buffered,
    #[serde(rename = "LIVE")]
    Live,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Image {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Metadata {
    Generic {
        title: Option<String>,
        subtitle: Option<String>,
        images: Option<Vec<Image>>,
        release_date: Option<String>,
    },
}

impl Serialize for Metadata {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Metadata::Generic {
                title,
                subtitle,
                images,
                release_date,
            } => {
                let mut map = serde_json::Map::new();
                map.insert("metadataType".to_owned(), json!(0u64));
                map.insert("title".to_owned(), json!(title));
                map.insert("subtitle".to_owned(), json!(subtitle));
                map.insert(
                    "images".to_owned(),
                    match images {
                        Some(i) => serde_json::to_value(i)
                            .map_err(|_| ser::Error::custom("failed to serialize `images`"))?,
                        None => Value::Null,
                    },
                );
                map.insert("releaseDate".to_owned(), json!(release_date));
                map.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let mut map = serde_json::Map::deserialize(deserializer)?;

        let type_ = map
            .remove("metadataType")
            .ok_or(de::Error::missing_field("metadataType"))?
            .as_u64()
            .ok_or(de::Error::custom("`metadataType` is not an integer"))?;

        let string_field = |name: &str| map.get(name).and_then(Value::as_str).map(str::to_owned);

        // Movie (1), TV show (2), music (3) and photo (4) metadata all share the
        // generic fields this crate cares about.
        match type_ {
            0..=4 => {
                let images = match map.get("images").and_then(Value::as_array) {
                    Some(images) => Some(
                        images
                            .iter()
                            .map(|image| serde_json::from_value::<Image>(image.clone()))
                            .collect::<Result<Vec<Image>, serde_json::Error>>()
                            .map_err(|_| de::Error::custom("`images` is not an array of images"))?,
                    ),
                    None => None,
                };

                Ok(Self::Generic {
                    title: string_field("title"),
                    subtitle: string_field("subtitle"),
                    images,
                    release_date: string_field("releaseDate"),
                })
            }
            _ => Err(de::Error::custom(format!("Unknown metadata type {type_}"))),
        }
    }
}

/// <https://developers.google.com/cast/docs/media/messages#MediaInformation>
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MediaInformation {
    /// Service-specific identifier of the content currently loaded by the media player. This is a
    /// free form string and is specific to the application. In most cases, this will be the URL to
    /// the media, but the sender can choose to pass a string that the receiver can interpret
    /// properly. Max length: 1k
    #[serde(rename = "contentId")]
    pub content_id: String,
    #[serde(rename = "streamType")]
    pub stream_type: StreamType,
    /// MIME content type of the media being played
    #[serde(rename = "contentType")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    /// Duration of the currently playing stream in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    /// A sender requested to stop playback using the STOP command
    #[serde(rename = "CANCELLED")]
    Cancelled,
    /// A sender requested playing a different media using the LOAD command
    #[serde(rename = "INTERRUPTED")]
    Interrupted,
    /// The media playback completed
    #[serde(rename = "FINISHED")]
    Finished,
    /// The media was interrupted due to an error; for example, if the player could not download the
    /// media due to network issues
    #[serde(rename = "ERROR")]
    Error,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Player has not been loaded yet
    #[serde(rename = "IDLE")]
    Idle,
    /// Player is actively playing content
    #[serde(rename = "PLAYING")]
    Playing,
    /// Player is in PLAY mode but not actively playing content (currentTime is not changing)
    #[serde(rename = "BUFFERING")]
    Buffering,
    /// Player is paused
    #[serde(rename = "PAUSED")]
    Paused,
}

fn default_playback_rate() -> f64 {
    1.0
}

/// Describes the current status of the media artifact with respect to the session.
///
/// <https://developers.google.com/cast/docs/media/messages#MediaStatus>
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MediaStatus {
    /// Unique ID for the playback of this specific session. This ID is set by the receiver at LOAD
    /// and can be used to identify a specific instance of a playback. For example, two playbacks
    /// of "Wish you were here" within the same session would each have a unique mediaSessionId.
    #[serde(rename = "mediaSessionId")]
    pub media_session_id: u64,
    /// optional (for status messages) Full description of the content that is being played back.
    /// Only be returned in a status messages if the MediaInformation has changed.
    #[serde(default)]
    pub media: Option<MediaInformation>,
    /// Indicates whether the media time is progressing, and at what rate. This is independent of the
    /// player state since the media time can stop in any state.
    /// 1.0 is regular time, 0.5 is slow motion
    #[serde(rename = "playbackRate", default = "default_playback_rate")]
    pub playback_rate: f64,
    #[serde(rename = "playerState")]
    pub player_state: PlayerState,
    /// optional If the playerState is IDLE and the reason it became IDLE is known, this property is
    /// provided. If the player is IDLE because it just started, this property will not be provided;
    /// if the player is in any other state this property should not be provided.
    #[serde(rename = "idleReason", default)]
    pub idle_reason: Option<IdleReason>,
    /// The current position of the media player since the beginning of the content, in seconds.
    /// If this a live stream content, then this field represents the time in seconds from the
    /// beginning of the event that should be known to the player.
    #[serde(rename = "currentTime", default)]
    pub current_time: f64,
    /// Flags describing which media commands the media player supports:
    ///
    /// * 1  Pause
    /// * 2  Seek
    /// * 4  Stream volume
    /// * 8  Stream mute
    /// * 16  Skip forward
    /// * 32  Skip backward
    ///
    /// Combinations are described as summations; for example, Pause+Seek+StreamVolume+Mute == 15.
    #[serde(rename = "supportedMediaCommands", default)]
    pub supported_media_commands: u64,
    /// Stream volume
    #[serde(default)]
    pub volume: Option<Volume>,
    /// Tracks (subtitles, audio) currently enabled.
    #[serde(rename = "activeTrackIds", default)]
    pub active_track_ids: Option<Vec<u64>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NamespaceMap {
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Application {
    #[serde(rename = "appId")]
    pub app_id: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "isIdleScreen", default)]
    pub is_idle_screen: bool,
    #[serde(default)]
    pub namespaces: Vec<NamespaceMap>,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "statusText", default)]
    pub status_text: String,
    /// Destination id to use for messages addressed to the application.
    #[serde(rename = "transportId")]
    pub transport_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VolumeStatus {
    #[serde(rename = "controlType", default)]
    pub control_type: Option<String>,
    pub level: f64,
    pub muted: bool,
    #[serde(rename = "stepInterval", default)]
    pub step_interval: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Status {
    #[serde(default)]
    pub applications: Option<Vec<Application>>,
    pub volume: VolumeStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum InvalidRequestReason {
    #[serde(rename = "INVALID_COMMAND")]
    InvalidCommand,
    #[serde(rename = "DUPLICATE_REQUESTID")]
    DuplicateRequestId,
    #[serde(rename = "INVALID_MEDIA_SESSION_ID")]
    InvalidMediaSessionId,
    #[serde(other)]
    Other,
}

pub mod namespaces {
    use super::*;

    pub trait Namespace {
        fn name(&self) -> &'static str;

        /// Correlation id carried by this message, if it is a request.
        fn request_id(&self) -> Option<u64> {
            None
        }

        /// Stop messages are best-effort: the receiver tears the channel down
        /// instead of answering reliably.
        fn is_stop(&self) -> bool {
            false
        }
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    #[serde(tag = "type")]
    pub enum Connection {
        #[serde(rename = "CONNECT")]
        Connect {
            #[serde(rename = "connType", default)]
            conn_type: u64,
        },
        #[serde(rename = "CLOSE")]
        Close,
    }

    impl Namespace for Connection {
        fn name(&self) -> &'static str {
            CONNECTION_NAMESPACE
        }
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    #[serde(tag = "type")]
    pub enum Heartbeat {
        #[serde(rename = "PING")]
        Ping,
        #[serde(rename = "PONG")]
        Pong,
    }

    impl Namespace for Heartbeat {
        fn name(&self) -> &'static str {
            HEARTBEAT_NAMESPACE
        }
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    #[serde(tag = "type")]
    pub enum Receiver {
        #[serde(rename = "SET_VOLUME")]
        SetVolume {
            volume: Volume,
            #[serde(rename = "requestId")]
            request_id: u64,
        },
        #[serde(rename = "STOP")]
        StopSession {
            #[serde(rename = "requestId")]
            request_id: u64,
            #[serde(rename = "sessionId")]
            session_id: String,
        },
        #[serde(rename = "LAUNCH")]
        Launch {
            #[serde(rename = "appId")]
            app_id: String,
            #[serde(rename = "requestId")]
            request_id: u64,
        },
        #[serde(rename = "GET_STATUS")]
        GetStatus {
            #[serde(rename = "requestId")]
            request_id: u64,
        },
        #[serde(rename = "RECEIVER_STATUS")]
        Status {
            #[serde(rename = "requestId", default)]
            request_id: u64,
            status: Status,
        },
        #[serde(rename = "LAUNCH_STATUS")]
        LaunchStatus {
            #[serde(rename = "launchRequestId")]
            request_id: u64,
            status: String,
        },
        #[serde(rename = "LAUNCH_ERROR")]
        LaunchError {
            #[serde(rename = "requestId", default)]
            request_id: u64,
            reason: Option<String>,
        },
        #[serde(rename = "INVALID_REQUEST")]
        InvalidRequest {
            #[serde(rename = "requestId", default)]
            request_id: u64,
            reason: Option<InvalidRequestReason>,
        },
    }

    impl Namespace for Receiver {
        fn name(&self) -> &'static str {
            RECEIVER_NAMESPACE
        }

        fn request_id(&self) -> Option<u64> {
            match self {
                Receiver::SetVolume { request_id, .. }
                | Receiver::StopSession { request_id, .. }
                | Receiver::Launch { request_id, .. }
                | Receiver::GetStatus { request_id }
                | Receiver::Status { request_id, .. }
                | Receiver::LaunchError { request_id, .. }
                | Receiver::InvalidRequest { request_id, .. } => Some(*request_id),
                Receiver::LaunchStatus { .. } => None,
            }
        }

        fn is_stop(&self) -> bool {
            matches!(self, Receiver::StopSession { .. })
        }
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    #[serde(tag = "type")]
    pub enum Media {
        /// Loads new content into the media player.
        ///
        /// <https://developers.google.com/cast/docs/media/messages#Load>
        #[serde(rename = "LOAD")]
        Load {
            /// ID of the request, to correlate request and response
            #[serde(rename = "requestId")]
            request_id: u64,
            /// Metadata (including contentId) of the media to load
            media: MediaInformation,
            /// If the autoplay parameter is specified, the media player will begin playing the
            /// content when it is loaded. Even if autoplay is not specified, media player
            /// implementation may choose to begin playback immediately. If playback is started,
            /// the player state in the response should be set to BUFFERING, otherwise it should
            /// be set to PAUSED. default is true
            #[serde(rename = "autoplay", skip_serializing_if = "Option::is_none")]
            autoplay: Option<bool>,
            /// Seconds since beginning of content. If the content is live content, and position is
            /// not specified, the stream will start at the live position
            #[serde(rename = "currentTime", skip_serializing_if = "Option::is_none")]
            current_time: Option<f64>,
            /// The media playback rate.
            #[serde(rename = "playbackRate", skip_serializing_if = "Option::is_none")]
            playback_rate: Option<f64>,
            /// Track ids to enable once the media is loaded.
            #[serde(rename = "activeTrackIds", skip_serializing_if = "Option::is_none")]
            active_track_ids: Option<Vec<u64>>,
        },
        /// Sets the current position in the stream. Triggers a STATUS event notification to all
        /// sender applications. If the position provided is outside the range of valid positions
        /// for the current content, then the player should pick a valid position as close to the
        /// requested position as possible.
        ///
        /// <https://developers.google.com/cast/docs/media/messages#Seek>
        #[serde(rename = "SEEK")]
        Seek {
            /// ID of the media session where the position of the stream is set
            #[serde(rename = "mediaSessionId")]
            media_session_id: u64,
            /// ID of the request, to correlate request and response
            #[serde(rename = "requestId")]
            request_id: u64,
            #[serde(rename = "currentTime")]
            current_time: Option<f64>,
        },
        /// Begins playback of the content that was loaded with the load call, playback is continued
        /// from the current time position.
        ///
        /// <https://developers.google.com/cast/docs/media/messages#Play>
        #[serde(rename = "PLAY")]
        Resume {
            #[serde(rename = "mediaSessionId")]
            media_session_id: u64,
            #[serde(rename = "requestId")]
            request_id: u64,
        },
        /// Pauses playback of the current content. Triggers a STATUS event notification to all sender
        /// applications.
        ///
        /// <https://developers.google.com/cast/docs/media/messages#Pause>
        #[serde(rename = "PAUSE")]
        Pause {
            /// ID of the media session to be paused
            #[serde(rename = "mediaSessionId")]
            media_session_id: u64,
            /// ID of the request, to use to correlate request/response
            #[serde(rename = "requestId")]
            request_id: u64,
        },
        /// Stops playback of the current content. Triggers a STATUS event notification to all sender
        /// applications. After this command the content will no longer be loaded and the
        /// mediaSessionId is invalidated.
        ///
        /// <https://developers.google.com/cast/docs/media/messages#Stop>
        #[serde(rename = "STOP")]
        Stop {
            /// ID of the media session for the content to be stopped
            #[serde(rename = "mediaSessionId")]
            media_session_id: u64,
            /// ID of the request, to correlate request and response
            #[serde(rename = "requestId")]
            request_id: u64,
        },
        /// Retrieves the media status.
        ///
        /// <https://developers.google.com/cast/docs/media/messages#GetStatus>
        #[serde(rename = "GET_STATUS")]
        GetStatus {
            /// Media session ID of the media for which the media status should be returned. If none
            /// is provided, then the status for all media session IDs will be provided.
            #[serde(rename = "mediaSessionId", skip_serializing_if = "Option::is_none")]
            media_session_id: Option<u64>,
            /// ID of the request, to correlate request and response
            #[serde(rename = "requestId")]
            request_id: u64,
        },
        /// Sent after a state change or after a media status request. Only the MediaStatus objects
        /// that changed or were requested will be sent.
        ///
        /// <https://developers.google.com/cast/docs/media/messages#MediaStatusMess>
        #[serde(rename = "MEDIA_STATUS")]
        Status {
            /// ID used to correlate this status response with the request that originated it or 0
            /// if the status message is spontaneous (not triggered by a sender request).
            #[serde(rename = "requestId", default)]
            request_id: u64,
            /// Array of Media Status objects. NOTE: the media element in MediaStatus will only be
            /// returned if it has changed.
            #[serde(default)]
            status: Vec<MediaStatus>,
        },
        #[serde(rename = "SET_PLAYBACK_RATE")]
        SetPlaybackRate {
            #[serde(rename = "mediaSessionId")]
            media_session_id: u64,
            #[serde(rename = "requestId")]
            request_id: u64,
            #[serde(rename = "playbackRate")]
            playback_rate: f64,
        },
        /// <https://developers.google.com/cast/docs/media/messages#InvalidPlayerState>
        #[serde(rename = "INVALID_PLAYER_STATE")]
        InvalidPlayerState {
            #[serde(rename = "requestId", default)]
            request_id: u64,
        },
        /// Sent when the load request failed. The player state will be IDLE.
        ///
        /// <https://developers.google.com/cast/docs/media/messages#LoadFailed>
        #[serde(rename = "LOAD_FAILED")]
        LoadFailed {
            #[serde(rename = "requestId", default)]
            request_id: u64,
        },
        #[serde(rename = "ERROR")]
        Error {
            #[serde(rename = "requestId", default)]
            request_id: u64,
            #[serde(rename = "detailedErrorCode", default)]
            detailed_error_code: Option<u64>,
            #[serde(default)]
            reason: Option<String>,
            #[serde(rename = "itemId", default)]
            item_id: Option<u64>,
        },
        /// Sent when the load request was cancelled (a second load request was received).
        ///
        /// <https://developers.google.com/cast/docs/media/messages#LoadCancelled>
        #[serde(rename = "LOAD_CANCELLED")]
        LoadCancelled {
            #[serde(rename = "requestId", default)]
            request_id: u64,
        },
        /// Sent when the request is invalid (an unknown request type, for example).
        ///
        /// <https://developers.google.com/cast/docs/media/messages#InvalidRequest>
        #[serde(rename = "INVALID_REQUEST")]
        InvalidRequest {
            #[serde(rename = "requestId", default)]
            request_id: u64,
            reason: Option<InvalidRequestReason>,
        },
    }

    impl Namespace for Media {
        fn name(&self) -> &'static str {
            MEDIA_NAMESPACE
        }

        fn request_id(&self) -> Option<u64> {
            match self {
                Media::Load { request_id, .. }
                | Media::Seek { request_id, .. }
                | Media::Resume { request_id, .. }
                | Media::Pause { request_id, .. }
                | Media::Stop { request_id, .. }
                | Media::GetStatus { request_id, .. }
                | Media::Status { request_id, .. }
                | Media::SetPlaybackRate { request_id, .. }
                | Media::InvalidPlayerState { request_id }
                | Media::LoadFailed { request_id }
                | Media::Error { request_id, .. }
                | Media::LoadCancelled { request_id }
                | Media::InvalidRequest { request_id, .. } => Some(*request_id),
            }
        }

        fn is_stop(&self) -> bool {
            matches!(self, Media::Stop { .. })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::namespaces::{self, Namespace};
    use super::*;

    #[test]
    fn serde_generic_metadata() {
        let meta = Metadata::Generic {
            title: None,
            subtitle: None,
            images: None,
            release_date: None,
        };
        assert_eq!(
            serde_json::from_str::<Metadata>(&serde_json::to_string(&meta).unwrap()).unwrap(),
            meta,
        );
        let meta = Metadata::Generic {
            title: Some("title".to_owned()),
            subtitle: Some("subtitle".to_owned()),
            images: Some(vec![Image {
                url: "url".to_owned(),
            }]),
            release_date: None,
        };
        assert_eq!(
            serde_json::from_str::<Metadata>(&serde_json::to_string(&meta).unwrap()).unwrap(),
            meta,
        );
    }

    #[test]
    fn header_peek() {
        let header =
            PayloadHeader::peek(r#"{"type":"MEDIA_STATUS","requestId":7,"status":[]}"#).unwrap();
        assert_eq!(header.type_, "MEDIA_STATUS");
        assert_eq!(header.correlation_id(), Some(7));

        let header = PayloadHeader::peek(r#"{"type":"PING"}"#).unwrap();
        assert_eq!(header.correlation_id(), None);

        let header = PayloadHeader::peek(r#"{"type":"MEDIA_STATUS","requestId":0}"#).unwrap();
        assert_eq!(header.correlation_id(), None);

        assert!(PayloadHeader::peek(r#"{"requestId":1}"#).is_err());
    }

    #[test]
    fn media_commands_use_integer_session_ids() {
        let json = serde_json::to_value(namespaces::Media::Pause {
            media_session_id: 12,
            request_id: 3,
        })
        .unwrap();
        assert_eq!(
            json,
            json!({"type": "PAUSE", "mediaSessionId": 12, "requestId": 3})
        );
    }

    #[test]
    fn load_omits_unset_options() {
        let load = namespaces::Media::Load {
            request_id: 1,
            media: MediaInformation {
                content_id: "http://host/video.mp4".to_owned(),
                stream_type: StreamType::Buffered,
                content_type: "video/mp4".to_owned(),
                metadata: None,
                duration: None,
            },
            autoplay: Some(true),
            current_time: None,
            playback_rate: None,
            active_track_ids: None,
        };
        let json = serde_json::to_value(&load).unwrap();
        assert_eq!(json["type"], "LOAD");
        assert_eq!(json["autoplay"], true);
        assert!(json.get("currentTime").is_none());
        assert!(json.get("activeTrackIds").is_none());
        assert_eq!(load.request_id(), Some(1));
        assert!(!load.is_stop());
    }

    #[test]
    fn stop_messages_are_flagged() {
        assert!(namespaces::Media::Stop {
            media_session_id: 1,
            request_id: 2
        }
        .is_stop());
        assert!(namespaces::Receiver::StopSession {
            request_id: 2,
            session_id: "abc".to_owned()
        }
        .is_stop());
        assert!(!namespaces::Receiver::GetStatus { request_id: 2 }.is_stop());
    }

    #[test]
    fn parse_sparse_media_status() {
        let msg: namespaces::Media = serde_json::from_str(
            r#"{"type":"MEDIA_STATUS","requestId":4,"status":[{"mediaSessionId":1,"playerState":"PLAYING","currentTime":12.5}]}"#,
        )
        .unwrap();
        let namespaces::Media::Status { request_id, status } = msg else {
            panic!("expected MEDIA_STATUS");
        };
        assert_eq!(request_id, 4);
        assert_eq!(status[0].player_state, PlayerState::Playing);
        assert_eq!(status[0].current_time, 12.5);
        assert_eq!(status[0].playback_rate, 1.0);
        assert!(status[0].media.is_none());
    }

    #[test]
    fn parse_receiver_status() {
        let msg: namespaces::Receiver = serde_json::from_str(
            r#"{"type":"RECEIVER_STATUS","requestId":2,"status":{"applications":[{"appId":"CC1AD845","displayName":"Default Media Receiver","sessionId":"S1","transportId":"web-1","namespaces":[{"name":"urn:x-cast:com.google.cast.media"}]}],"volume":{"level":0.5,"muted":false}}}"#,
        )
        .unwrap();
        let namespaces::Receiver::Status { status, .. } = msg else {
            panic!("expected RECEIVER_STATUS");
        };
        let apps = status.applications.unwrap();
        assert_eq!(apps[0].session_id, "S1");
        assert_eq!(apps[0].transport_id, "web-1");
        assert_eq!(status.volume.level, 0.5);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<namespaces::Media>(r#"{"type":"BOGUS","requestId":1}"#)
            .is_err());
    }
}
