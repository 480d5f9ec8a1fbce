use std::time::Duration;

use serde::Deserialize;

/// App id of the Default Media Receiver.
pub const DEFAULT_MEDIA_RECEIVER_APP_ID: &str = "CC1AD845";
pub const DEFAULT_SENDER_ID: &str = "sender-0";

/// Tunables of a [`Player`](crate::player::Player) and its transport.
///
/// The polling interval and end-of-media tolerance are empirical values; some
/// receiver firmware may need different ones.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Cast application launched on connect.
    pub app_id: String,
    /// Source id stamped on every outgoing message.
    pub sender_id: String,
    pub connect_timeout_millis: u64,
    pub request_timeout_millis: u64,
    /// LAUNCH can take several seconds while the receiver starts the app.
    pub launch_timeout_millis: u64,
    /// Times GET_STATUS is retried while a launched app has not shown up yet.
    pub launch_status_retries: u8,
    pub launch_retry_delay_millis: u64,
    /// The receiver answers LOAD once it starts buffering.
    pub load_timeout_millis: u64,
    pub poll_interval_millis: u64,
    /// Elapsed time and duration are compared after rounding to this many
    /// decimal places.
    pub end_tolerance_decimals: u32,
    /// Consecutive poll timeouts tolerated before the player disconnects.
    pub max_poll_timeouts: u32,
    pub event_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_MEDIA_RECEIVER_APP_ID.to_owned(),
            sender_id: DEFAULT_SENDER_ID.to_owned(),
            connect_timeout_millis: 5000,
            request_timeout_millis: 5000,
            launch_timeout_millis: 20000,
            launch_status_retries: 15,
            launch_retry_delay_millis: 1000,
            load_timeout_millis: 20000,
            poll_interval_millis: 150,
            end_tolerance_decimals: 1,
            max_poll_timeouts: 3,
            event_capacity: 64,
        }
    }
}

impl PlayerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_millis)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_millis)
    }

    pub fn launch_retry_delay(&self) -> Duration {
        Duration::from_millis(self.launch_retry_delay_millis)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_millis)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    /// Whether `elapsed` has reached `duration` within the configured rounding.
    pub fn reached_end(&self, elapsed: f64, duration: f64) -> bool {
        if duration <= 0.0 {
            return false;
        }
        let scale = 10f64.powi(self.end_tolerance_decimals as i32);
        (elapsed * scale).round() >= (duration * scale).round()
    }
}
