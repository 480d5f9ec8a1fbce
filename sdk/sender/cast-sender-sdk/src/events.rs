use crate::device::ReceiverInfo;

/// Notifications raised by a [`Player`](crate::player::Player).
///
/// The player is the only writer. Subscribers see the events raised after
/// they subscribed, in order, as long as they keep up: a subscriber more than
/// `event_capacity` events behind loses the oldest ones and its next `recv`
/// returns `RecvError::Lagged` with the number skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    DeviceFound(ReceiverInfo),
    Connected(ReceiverInfo),
    FileLoading { content_id: String },
    FileLoaded { content_id: String, duration: f64 },
    /// Elapsed content time in seconds.
    TimeChanged(f64),
    /// Elapsed content time as a percentage of the duration.
    PositionChanged(f64),
    Paused,
    Resumed,
    Stopped,
    EndReached,
    VolumeChanged(f64),
    MutedChanged(bool),
    PlaybackError(String),
    LoadFailed { content_id: String, reason: String },
    Disconnected,
}
