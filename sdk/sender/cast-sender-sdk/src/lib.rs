//! # Cast Sender SDK
//!
//! Casts media to [Google Cast] receivers over the Cast v2 control protocol:
//! a TLS connection carrying length-prefixed protobuf envelopes with JSON
//! payloads, multiplexed over namespaced channels.
//!
//! A [`Player`](player::Player) connects to a receiver, launches the Default
//! Media Receiver, loads media and polls the receiver for progress, raising
//! [`PlayerEvent`](events::PlayerEvent)s to any number of subscribers.
//!
//! ## Example usage
//!
//! ```no_run
//! use cast_sender_sdk::config::PlayerConfig;
//! use cast_sender_sdk::context::CastContext;
//! use cast_sender_sdk::device::{LoadRequest, MediaInfo, ReceiverInfo};
//!
//! let ctx = CastContext::new().unwrap();
//! let player = ctx.create_player(PlayerConfig::default(), None);
//! let mut events = player.subscribe();
//!
//! ctx.handle().block_on(async {
//!     player
//!         .connect(&ReceiverInfo::new("living-room", "Living room", "192.168.1.20"))
//!         .await
//!         .unwrap();
//!     player
//!         .load(LoadRequest::new(MediaInfo::new(
//!             "http://commondatastorage.googleapis.com/gtv-videos-bucket/sample/BigBuckBunny.mp4",
//!             "video/mp4",
//!         )))
//!         .await
//!         .unwrap();
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//! });
//! ```
//!
//! [Google Cast]: https://www.android.com/better-together/#cast

pub mod channels;
pub mod config;
pub mod context;
pub mod device;
#[cfg(feature = "discovery")]
pub mod discovery;
pub mod error;
pub mod events;
pub mod player;
pub mod resolver;
pub mod transport;
pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use chromecast_protocol::IdleReason;
pub use config::PlayerConfig;
pub use device::{LoadRequest, MediaInfo, Metadata, PlaybackState, ReceiverInfo};
pub use error::{CastError, ResolverError};
pub use events::PlayerEvent;
pub use player::{Player, PlayerState, SessionState};
pub use resolver::{MediaResolver, ResolvedMedia};

use tokio::runtime;

#[derive(thiserror::Error, Debug)]
pub enum AsyncRuntimeError {
    #[error("failed to build")]
    FailedToBuild(#[from] std::io::Error),
}

pub(crate) enum AsyncRuntime {
    Handle(runtime::Handle),
    Runtime(runtime::Runtime),
}

impl AsyncRuntime {
    pub fn new(threads: Option<usize>, name: &str) -> Result<Self, AsyncRuntimeError> {
        Ok(match runtime::Handle::try_current() {
            Ok(handle) => Self::Handle(handle),
            Err(_) => Self::Runtime({
                let mut builder = runtime::Builder::new_multi_thread();
                if let Some(threads) = threads {
                    builder.worker_threads(threads);
                }
                builder.enable_all().thread_name(name).build()?
            }),
        })
    }

    pub fn handle(&self) -> runtime::Handle {
        match self {
            AsyncRuntime::Handle(handle) => handle.clone(),
            AsyncRuntime::Runtime(runtime) => runtime.handle().clone(),
        }
    }
}
