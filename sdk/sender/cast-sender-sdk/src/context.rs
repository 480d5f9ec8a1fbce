use std::sync::Arc;

use tokio::runtime;

use crate::config::PlayerConfig;
use crate::player::Player;
use crate::resolver::MediaResolver;
use crate::{AsyncRuntime, AsyncRuntimeError};

/// Entry point for applications that do not manage a tokio runtime
/// themselves.
pub struct CastContext {
    runtime: AsyncRuntime,
}

impl CastContext {
    /// Reuses the current runtime if called from within one.
    pub fn new() -> Result<Self, AsyncRuntimeError> {
        Ok(Self {
            runtime: AsyncRuntime::new(Some(1), "cast-context-async-runtime")?,
        })
    }

    pub fn handle(&self) -> runtime::Handle {
        self.runtime.handle()
    }

    pub fn create_player(
        &self,
        config: PlayerConfig,
        resolver: Option<Arc<dyn MediaResolver>>,
    ) -> Player {
        Player::with_handle(self.runtime.handle(), config, resolver)
    }
}

#[cfg(feature = "discovery")]
impl CastContext {
    /// Feeds receivers found on the local network into `player`.
    pub fn start_discovery(&self, player: &Player) -> anyhow::Result<tokio::task::JoinHandle<()>> {
        let receivers = crate::discovery::discover_receivers()?;
        Ok(player.watch_receivers(receivers))
    }
}
