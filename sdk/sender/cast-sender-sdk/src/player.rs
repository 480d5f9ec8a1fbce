//! Sequences the channels into a playback API and keeps a polled view of what
//! the receiver is doing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chromecast_protocol::{IdleReason, PLATFORM_DESTINATION_ID};
use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channels::{
    ChannelRouter, ConnectionChannel, HeartbeatChannel, MediaChannel, MediaStatus, ReceiverChannel,
    ReceiverStatus,
};
use crate::config::PlayerConfig;
use crate::device::{LoadRequest, PlaybackState, ReceiverInfo};
use crate::error::{CastError, Result};
use crate::events::PlayerEvent;
use crate::resolver::MediaResolver;
use crate::transport::Transport;

const MIN_PLAYBACK_RATE: f64 = 0.5;
const MAX_PLAYBACK_RATE: f64 = 2.0;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    /// Connected with no media loaded.
    Idle,
    Loading,
    Playing,
    Paused,
}

/// Snapshot of what the player believes the receiver is doing.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub session: SessionState,
    pub receiver: Option<ReceiverInfo>,
    pub is_playing: bool,
    pub content_id: Option<String>,
    /// Seconds; 0 when unknown.
    pub duration: f64,
    /// Seconds into the content, including `seek_offset`.
    pub elapsed: f64,
    /// Where in the content the served stream begins.
    pub seek_offset: f64,
    pub volume: f64,
    pub muted: bool,
    pub playback_rate: f64,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            session: SessionState::Disconnected,
            receiver: None,
            is_playing: false,
            content_id: None,
            duration: 0.0,
            elapsed: 0.0,
            seek_offset: 0.0,
            volume: 0.0,
            muted: false,
            playback_rate: 1.0,
        }
    }
}

impl PlayerState {
    fn clear_media(&mut self) {
        self.is_playing = false;
        self.content_id = None;
        self.duration = 0.0;
        self.elapsed = 0.0;
        self.seek_offset = 0.0;
        self.playback_rate = 1.0;
    }
}

#[derive(Default)]
struct Shared {
    state: PlayerState,
    /// Playback state of the last poll, used to detect pause and resume.
    reported: Option<PlaybackState>,
}

struct PollHandle {
    generation: u64,
    token: CancellationToken,
}

#[derive(Debug, PartialEq, Eq)]
enum PollStep {
    Continue,
    Stop,
}

struct Inner {
    config: PlayerConfig,
    runtime: Handle,
    router: Arc<ChannelRouter>,
    connection: Arc<ConnectionChannel>,
    receiver: Arc<ReceiverChannel>,
    media: Arc<MediaChannel>,
    resolver: Option<Arc<dyn MediaResolver>>,
    transport: Mutex<Option<Arc<Transport>>>,
    shared: Mutex<Shared>,
    connect_lock: tokio::sync::Mutex<()>,
    poll: Mutex<PollHandle>,
    events: broadcast::Sender<PlayerEvent>,
    receivers: Mutex<HashMap<String, ReceiverInfo>>,
}

/// A media player driving one receiver at a time.
///
/// Cheap to clone; clones share the same connection and state.
#[derive(Clone)]
pub struct Player {
    inner: Arc<Inner>,
}

impl Player {
    /// Must be called from within a tokio runtime.
    pub fn new(config: PlayerConfig, resolver: Option<Arc<dyn MediaResolver>>) -> Self {
        Self::with_handle(Handle::current(), config, resolver)
    }

    pub fn with_handle(
        runtime: Handle,
        config: PlayerConfig,
        resolver: Option<Arc<dyn MediaResolver>>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let connection = Arc::new(ConnectionChannel::new());
            let receiver = {
                let weak = weak.clone();
                Arc::new(
                    ReceiverChannel::new(&config).with_status_listener(Arc::new(
                        move |status: &ReceiverStatus| {
                            if let Some(inner) = weak.upgrade() {
                                Player { inner }.on_receiver_status(status);
                            }
                        },
                    )),
                )
            };
            let media = {
                let receiver = Arc::clone(&receiver);
                Arc::new(MediaChannel::new(
                    &config,
                    Arc::new(move || receiver.session()),
                ))
            };

            let mut router = ChannelRouter::new();
            router.register(connection.clone());
            router.register(Arc::new(HeartbeatChannel::new()));
            router.register(receiver.clone());
            router.register(media.clone());

            let (events, _) = broadcast::channel(config.event_capacity.max(1));

            Inner {
                config,
                runtime,
                router: Arc::new(router),
                connection,
                receiver,
                media,
                resolver,
                transport: Mutex::new(None),
                shared: Mutex::new(Shared::default()),
                connect_lock: tokio::sync::Mutex::new(()),
                poll: Mutex::new(PollHandle {
                    generation: 0,
                    token: CancellationToken::new(),
                }),
                events,
                receivers: Mutex::new(HashMap::new()),
            }
        });

        Self { inner }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> PlayerState {
        self.shared().state.clone()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.inner.config
    }

    /// Receivers reported by [`watch_receivers`](Self::watch_receivers).
    pub fn receivers(&self) -> Vec<ReceiverInfo> {
        let mut receivers: Vec<_> = lock(&self.inner.receivers).values().cloned().collect();
        receivers.sort_by(|a, b| a.friendly_name.cmp(&b.friendly_name));
        receivers
    }

    /// Consumes a discovery feed, raising [`PlayerEvent::DeviceFound`] the
    /// first time each receiver id shows up.
    pub fn watch_receivers<S>(&self, receivers: S) -> JoinHandle<()>
    where
        S: Stream<Item = ReceiverInfo> + Send + 'static,
    {
        let player = self.clone();
        self.inner.runtime.spawn(async move {
            let mut receivers = Box::pin(receivers);
            while let Some(receiver) = receivers.next().await {
                player.add_receiver(receiver);
            }
            debug!("Discovery feed ended");
        })
    }

    /// Returns `false` if a receiver with the same id was already known.
    pub fn add_receiver(&self, receiver: ReceiverInfo) -> bool {
        {
            let mut receivers = lock(&self.inner.receivers);
            if receivers.contains_key(&receiver.id) {
                return false;
            }
            receivers.insert(receiver.id.clone(), receiver.clone());
        }
        info!("Found receiver {} ({})", receiver.friendly_name, receiver.host);
        self.emit(PlayerEvent::DeviceFound(receiver));
        true
    }

    /// Connects to `receiver` and launches the configured application.
    ///
    /// An existing connection is closed first. Fails with
    /// [`CastError::ConnectInProgress`] while another connect is running.
    pub async fn connect(&self, receiver: &ReceiverInfo) -> Result<()> {
        let _connecting = self.begin_connect().await?;
        let transport = match Transport::connect(
            receiver,
            Arc::clone(&self.inner.router),
            &self.inner.config,
        )
        .await
        {
            Ok(transport) => transport,
            Err(err) => {
                self.update_state(|state| state.session = SessionState::Disconnected);
                return Err(err);
            }
        };
        self.establish(transport, receiver).await
    }

    /// Like [`connect`](Self::connect), over a stream that is already
    /// connected to `receiver`.
    pub async fn connect_with_stream<S>(&self, receiver: &ReceiverInfo, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let _connecting = self.begin_connect().await?;
        let transport = Transport::start(stream, Arc::clone(&self.inner.router), &self.inner.config);
        self.establish(transport, receiver).await
    }

    pub async fn load(&self, request: LoadRequest) -> Result<()> {
        let transport = self.transport()?;
        let (generation, token) = self.restart_poll();
        let content_id = request.media.content_id.clone();

        self.emit(PlayerEvent::FileLoading {
            content_id: content_id.clone(),
        });
        self.update_state(|state| {
            state.clear_media();
            state.session = SessionState::Loading;
        });

        let mut media = request.media.clone();
        if let Some(resolver) = self
            .inner
            .resolver
            .as_ref()
            .filter(|resolver| resolver.accepts(&content_id))
        {
            debug!("Resolving {content_id}");
            match resolver
                .resolve(&content_id, request.quality.as_deref())
                .await
            {
                Ok(resolved) => {
                    media.content_id = resolved.url;
                    media.is_live_stream = resolved.is_live_stream;
                    if resolved.title.is_some() {
                        media.metadata.title = resolved.title;
                    }
                    if resolved.thumbnail_url.is_some() {
                        media.metadata.thumbnail_url = resolved.thumbnail_url;
                    }
                }
                Err(err) => {
                    let err = CastError::from(err);
                    self.fail_load(generation, &content_id, &err);
                    return Err(err);
                }
            }
        }

        let status = match self
            .inner
            .media
            .load(&transport, &media, request.autoplay, &request.active_track_ids)
            .await
        {
            Ok(status) => status,
            Err(err) => {
                self.fail_load(generation, &content_id, &err);
                return Err(err);
            }
        };

        let duration = status
            .duration
            .filter(|duration| *duration > 0.0)
            .or(media.duration)
            .unwrap_or(0.0);

        {
            let poll = lock(&self.inner.poll);
            if poll.generation != generation {
                debug!("Load of {content_id} was superseded");
                return Ok(());
            }
            let mut shared = self.shared();
            shared.reported = None;
            let state = &mut shared.state;
            state.content_id = Some(content_id.clone());
            state.duration = duration;
            state.elapsed = 0.0;
            state.seek_offset = request.seek_seconds;
            state.playback_rate = status.playback_rate;
            state.is_playing = request.autoplay;
            state.session = if request.autoplay {
                SessionState::Playing
            } else {
                SessionState::Paused
            };
        }

        info!("Loaded {content_id} ({duration}s)");
        self.emit(PlayerEvent::FileLoaded {
            content_id,
            duration,
        });

        self.inner
            .runtime
            .spawn(self.clone().poll_loop(generation, token));

        Ok(())
    }

    pub async fn play(&self) -> Result<()> {
        let transport = self.transport()?;
        self.update_state(|state| {
            state.is_playing = true;
            if state.session == SessionState::Paused {
                state.session = SessionState::Playing;
            }
        });
        self.inner.media.play(&transport).await
    }

    pub async fn pause(&self) -> Result<()> {
        let transport = self.transport()?;
        self.update_state(|state| {
            state.is_playing = false;
            if state.session == SessionState::Playing {
                state.session = SessionState::Paused;
            }
        });
        self.inner.media.pause(&transport).await
    }

    /// Seeks to `seconds` into the content.
    pub async fn seek(&self, seconds: f64) -> Result<()> {
        let transport = self.transport()?;
        let seek_offset = self.shared().state.seek_offset;
        self.inner
            .media
            .seek(&transport, (seconds - seek_offset).max(0.0))
            .await
    }

    pub async fn stop(&self) -> Result<()> {
        let transport = self.transport()?;
        self.cancel_poll();
        self.update_state(|state| {
            state.clear_media();
            state.session = SessionState::Idle;
        });
        self.inner.media.stop(&transport).await?;
        self.emit(PlayerEvent::Stopped);
        Ok(())
    }

    pub async fn set_volume(&self, level: f64) -> Result<()> {
        let transport = self.transport()?;
        let status = self.inner.receiver.set_volume(&transport, level).await?;
        self.update_state(|state| state.volume = status.volume_level);
        self.emit(PlayerEvent::VolumeChanged(status.volume_level));
        Ok(())
    }

    pub async fn set_muted(&self, muted: bool) -> Result<()> {
        let transport = self.transport()?;
        let status = self.inner.receiver.set_muted(&transport, muted).await?;
        self.update_state(|state| state.muted = status.muted);
        self.emit(PlayerEvent::MutedChanged(status.muted));
        Ok(())
    }

    /// `rate` is clamped to 0.5..=2.0.
    pub async fn set_playback_rate(&self, rate: f64) -> Result<()> {
        let transport = self.transport()?;
        let rate = rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
        self.inner.media.set_playback_rate(&transport, rate).await?;
        self.update_state(|state| state.playback_rate = rate);
        Ok(())
    }

    /// Stops the application and closes the connection. Does nothing if not
    /// connected.
    pub async fn disconnect(&self) {
        let transport = lock(&self.inner.transport).take();
        let Some(transport) = transport else {
            return;
        };

        info!("Disconnecting");

        self.cancel_poll();

        let app_transport_id = self
            .inner
            .receiver
            .session()
            .map(|session| session.transport_id);
        if let Err(err) = self.inner.receiver.stop_application(&transport).await {
            debug!("Failed to stop application: {err}");
        }
        if let Some(app_transport_id) = app_transport_id {
            if let Err(err) = self.inner.connection.close(&transport, &app_transport_id).await {
                debug!("Failed to close application connection: {err}");
            }
        }

        transport.disconnect().await;
        self.inner.router.reset();
        self.mark_disconnected();
    }

    async fn begin_connect(&self) -> Result<tokio::sync::MutexGuard<'_, ()>> {
        let guard = self
            .inner
            .connect_lock
            .try_lock()
            .map_err(|_| CastError::ConnectInProgress)?;
        if self.current_transport().is_some() {
            debug!("Already connected, disconnecting first");
            self.disconnect().await;
        }
        self.update_state(|state| state.session = SessionState::Connecting);
        Ok(guard)
    }

    async fn establish(&self, transport: Arc<Transport>, receiver: &ReceiverInfo) -> Result<()> {
        let inner = &self.inner;
        let handshake = async {
            inner
                .connection
                .connect(&transport, PLATFORM_DESTINATION_ID)
                .await?;
            let session = inner.receiver.launch(&transport, &inner.config.app_id).await?;
            inner
                .connection
                .connect(&transport, &session.transport_id)
                .await?;
            Ok::<_, CastError>(session)
        };

        let session = match handshake.await {
            Ok(session) => session,
            Err(err) => {
                warn!("Failed to set up a session with {}: {err}", receiver.friendly_name);
                transport.disconnect().await;
                inner.router.reset();
                self.update_state(|state| state.session = SessionState::Disconnected);
                return Err(err);
            }
        };

        *lock(&inner.transport) = Some(Arc::clone(&transport));

        let receiver_status = inner.receiver.status();
        self.update_state(|state| {
            *state = PlayerState {
                session: SessionState::Idle,
                receiver: Some(receiver.clone()),
                ..Default::default()
            };
            if let Some(status) = &receiver_status {
                state.volume = status.volume_level;
                state.muted = status.muted;
            }
        });

        info!(
            "Connected to {} with session {}",
            receiver.friendly_name, session.session_id
        );
        self.emit(PlayerEvent::Connected(receiver.clone()));

        let player = self.clone();
        inner.runtime.spawn(async move {
            transport.closed().await;
            player.on_transport_closed(&transport);
        });

        Ok(())
    }

    /// Mirrors volume changes made outside this player, e.g. with a remote.
    fn on_receiver_status(&self, status: &ReceiverStatus) {
        if self.current_transport().is_none() {
            // Still connecting; `establish` picks the status up.
            return;
        }

        let mut events = Vec::new();
        {
            let mut shared = self.shared();
            let state = &mut shared.state;
            if state.volume != status.volume_level {
                state.volume = status.volume_level;
                events.push(PlayerEvent::VolumeChanged(status.volume_level));
            }
            if state.muted != status.muted {
                state.muted = status.muted;
                events.push(PlayerEvent::MutedChanged(status.muted));
            }
        }

        for event in events {
            self.emit(event);
        }
    }

    fn on_transport_closed(&self, transport: &Arc<Transport>) {
        {
            let mut current = lock(&self.inner.transport);
            match current.as_ref() {
                Some(current_transport) if Arc::ptr_eq(current_transport, transport) => {
                    *current = None;
                }
                _ => return,
            }
        }

        info!("Connection to the receiver was lost");
        self.cancel_poll();
        self.inner.router.reset();
        self.mark_disconnected();
    }

    fn mark_disconnected(&self) {
        {
            let mut shared = self.shared();
            shared.state = PlayerState::default();
            shared.reported = None;
        }
        self.emit(PlayerEvent::Disconnected);
    }

    fn fail_load(&self, generation: u64, content_id: &str, err: &CastError) {
        warn!("Failed to load {content_id}: {err}");
        {
            let poll = lock(&self.inner.poll);
            if poll.generation == generation {
                self.update_state(|state| {
                    state.clear_media();
                    state.session = SessionState::Idle;
                });
            }
        }
        self.emit(PlayerEvent::LoadFailed {
            content_id: content_id.to_owned(),
            reason: err.to_string(),
        });
    }

    async fn poll_loop(self, generation: u64, token: CancellationToken) {
        debug!("Starting poll loop {generation}");

        let mut timeouts = 0;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.inner.config.poll_interval()) => {}
            }

            let Some(transport) = self.current_transport() else {
                break;
            };

            let result = tokio::select! {
                _ = token.cancelled() => break,
                result = self.inner.media.get_status(&transport) => result,
            };

            let step = match result {
                Ok(status) => {
                    timeouts = 0;
                    self.apply_media_status(generation, status)
                }
                Err(CastError::RequestTimeout { request_id, .. }) => {
                    timeouts += 1;
                    warn!("Media status request {request_id} timed out ({timeouts})");
                    if timeouts >= self.inner.config.max_poll_timeouts {
                        if self.is_current(generation) {
                            warn!("Receiver stopped answering, disconnecting");
                            self.disconnect().await;
                        }
                        PollStep::Stop
                    } else {
                        PollStep::Continue
                    }
                }
                Err(CastError::Disconnected | CastError::NotConnected) => PollStep::Stop,
                Err(CastError::NoApplicationSession) => self.apply_media_status(generation, None),
                Err(err) => {
                    warn!("Failed to get media status: {err}");
                    PollStep::Continue
                }
            };

            if step == PollStep::Stop {
                break;
            }
        }

        debug!("Poll loop {generation} finished");
    }

    /// Folds one poll result into the state and raises the events it implies.
    ///
    /// Holds the poll lock throughout, so a loop whose generation was
    /// superseded can never emit.
    fn apply_media_status(&self, generation: u64, status: Option<MediaStatus>) -> PollStep {
        let poll = lock(&self.inner.poll);
        if poll.generation != generation {
            return PollStep::Stop;
        }

        let mut events = Vec::new();
        let step = {
            let mut shared = self.shared();
            match status {
                None => {
                    debug!("Receiver has no media session");
                    if shared.state.content_id.is_some() {
                        events.push(PlayerEvent::EndReached);
                    }
                    shared.state.clear_media();
                    shared.state.session = SessionState::Idle;
                    PollStep::Stop
                }
                Some(status) => self.fold_status(&mut shared, status, &mut events),
            }
        };

        for event in events {
            self.emit(event);
        }
        drop(poll);

        step
    }

    fn fold_status(
        &self,
        shared: &mut Shared,
        status: MediaStatus,
        events: &mut Vec<PlayerEvent>,
    ) -> PollStep {
        let state = &mut shared.state;

        if state.duration <= 0.0 {
            if let Some(duration) = status.duration.filter(|duration| *duration > 0.0) {
                state.duration = duration;
            }
        }
        state.playback_rate = status.playback_rate;

        let elapsed = status.current_time + state.seek_offset;
        if elapsed != state.elapsed {
            state.elapsed = elapsed;
            events.push(PlayerEvent::TimeChanged(elapsed));
            if state.duration > 0.0 {
                events.push(PlayerEvent::PositionChanged(elapsed / state.duration * 100.0));
            }
        }

        let reported = match status.state {
            PlaybackState::Buffering => PlaybackState::Playing,
            other => other,
        };

        match reported {
            PlaybackState::Playing => {
                if shared.reported == Some(PlaybackState::Paused) {
                    events.push(PlayerEvent::Resumed);
                }
                state.is_playing = true;
                state.session = SessionState::Playing;
            }
            PlaybackState::Paused => {
                if shared.reported != Some(PlaybackState::Paused) {
                    events.push(PlayerEvent::Paused);
                }
                state.is_playing = false;
                state.session = SessionState::Paused;
            }
            PlaybackState::Idle => match status.idle_reason {
                Some(IdleReason::Finished) => {
                    events.push(PlayerEvent::EndReached);
                    state.clear_media();
                    state.session = SessionState::Idle;
                    return PollStep::Stop;
                }
                Some(IdleReason::Error) => {
                    events.push(PlayerEvent::PlaybackError(
                        "the receiver failed to play the media".to_owned(),
                    ));
                    state.clear_media();
                    state.session = SessionState::Idle;
                    return PollStep::Stop;
                }
                Some(IdleReason::Cancelled | IdleReason::Interrupted) => {
                    debug!("Media was stopped on the receiver");
                    state.clear_media();
                    state.session = SessionState::Idle;
                    return PollStep::Stop;
                }
                None => state.is_playing = false,
            },
            PlaybackState::Buffering => {}
        }
        shared.reported = Some(reported);

        if self.inner.config.reached_end(state.elapsed, state.duration) {
            events.push(PlayerEvent::EndReached);
            state.clear_media();
            state.session = SessionState::Idle;
            return PollStep::Stop;
        }

        PollStep::Continue
    }

    fn restart_poll(&self) -> (u64, CancellationToken) {
        let mut poll = lock(&self.inner.poll);
        poll.token.cancel();
        poll.generation += 1;
        poll.token = CancellationToken::new();
        (poll.generation, poll.token.clone())
    }

    fn cancel_poll(&self) {
        let mut poll = lock(&self.inner.poll);
        poll.token.cancel();
        poll.generation += 1;
    }

    fn is_current(&self, generation: u64) -> bool {
        lock(&self.inner.poll).generation == generation
    }

    fn current_transport(&self) -> Option<Arc<Transport>> {
        lock(&self.inner.transport).clone()
    }

    fn transport(&self) -> Result<Arc<Transport>> {
        self.current_transport().ok_or(CastError::NotConnected)
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        lock(&self.inner.shared)
    }

    fn update_state(&self, f: impl FnOnce(&mut PlayerState)) {
        f(&mut self.shared().state);
    }

    fn emit(&self, event: PlayerEvent) {
        debug!("Event: {event:?}");
        // No subscribers is not an error
        let _ = self.inner.events.send(event);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
