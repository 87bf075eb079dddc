//! Shared fakes for the orchestrator integration tests.
//!
//! The fake transport never streams anything: tests drive track completion by
//! hand through the [`TrackEvents`] sink the session handed over on connect.
//! Like songbird it keeps one call per guild, owned by the latest connection.

#![allow(dead_code)]

use async_trait::async_trait;
use mockall::mock;
use music_maniac::{
    audio::{
        session::SessionStatus,
        transport::{
            ChannelOccupancy, PlayOutcome, PlayRequest, TrackEvents, VoiceConnection,
            VoiceTransport,
        },
        MusicPlayer, PlayerConfig,
    },
    error::{ResolutionError, TransportError},
    sources::{TrackDescriptor, TrackResolver},
    storage::{GuildSettings, SettingsPatch, SettingsStore},
};
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Notify;

// ===== Resolver =====

/// Resolves any query to a descriptor titled after it. Queries starting
/// with `missing` are not found, `offline` fails with a network error and
/// `slow` waits until [`FakeResolver::release_slow`].
#[derive(Default)]
pub struct FakeResolver {
    pub calls: Mutex<Vec<String>>,
    slow: Notify,
}

impl FakeResolver {
    pub fn release_slow(&self) {
        self.slow.notify_waiters();
    }
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(&self, query: &str) -> Result<TrackDescriptor, ResolutionError> {
        self.calls.lock().push(query.to_string());

        if query.starts_with("missing") {
            return Err(ResolutionError::NotFound(query.to_string()));
        }
        if query.starts_with("offline") {
            return Err(ResolutionError::NetworkFailure("sin conexión".to_string()));
        }
        if query.starts_with("slow") {
            self.slow.notified().await;
        }
        Ok(track(query))
    }
}

pub fn track(query: &str) -> TrackDescriptor {
    TrackDescriptor::new(query, format!("https://stream.test/{}", query))
}

// ===== Transport =====

#[derive(Default)]
pub struct TransportState {
    /// Connection currently owning each guild's call
    pub calls: HashMap<GuildId, usize>,
    pub abandoned: usize,
    pub connects: usize,
    pub live: usize,
    pub max_live: usize,
    pub disconnects: usize,
    pub plays: Vec<(GuildId, PlayRequest)>,
    pub stops: usize,
    pub paused: bool,
    pub volumes: Vec<u8>,
    pub events: HashMap<GuildId, TrackEvents>,
    pub self_only: bool,
}

#[derive(Clone, Default)]
pub struct FakeTransport {
    pub state: Arc<Mutex<TransportState>>,
    /// When set, every connect waits for a permit before completing.
    pub gate: Option<Arc<Notify>>,
    pub fail_with: Arc<Mutex<Option<TransportError>>>,
}

impl FakeTransport {
    pub fn gated() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let transport = Self { gate: Some(gate.clone()), ..Self::default() };
        (transport, gate)
    }

    pub fn fail_connects_with(&self, error: TransportError) {
        *self.fail_with.lock() = Some(error);
    }

    pub fn set_self_only(&self, self_only: bool) {
        self.state.lock().self_only = self_only;
    }

    pub fn live(&self) -> usize {
        self.state.lock().live
    }

    pub fn call_owner(&self, guild_id: GuildId) -> Option<usize> {
        self.state.lock().calls.get(&guild_id).copied()
    }

    pub fn plays_for(&self, guild_id: GuildId) -> Vec<PlayRequest> {
        self.state
            .lock()
            .plays
            .iter()
            .filter(|(guild, _)| *guild == guild_id)
            .map(|(_, request)| request.clone())
            .collect()
    }

    pub fn last_play(&self, guild_id: GuildId) -> Option<PlayRequest> {
        self.plays_for(guild_id).pop()
    }

    /// Reports the end of the most recent `play` for `guild_id`.
    pub fn finish_current(&self, guild_id: GuildId, outcome: PlayOutcome) {
        let request = self.last_play(guild_id).expect("no play to finish");
        self.finish(guild_id, request.token, outcome);
    }

    pub fn finish(&self, guild_id: GuildId, token: u64, outcome: PlayOutcome) {
        let events = self.events_for(guild_id);
        events.track_finished(token, outcome);
    }

    pub fn drop_connection(&self, guild_id: GuildId) {
        self.events_for(guild_id).connection_lost();
    }

    fn events_for(&self, guild_id: GuildId) -> TrackEvents {
        self.state
            .lock()
            .events
            .get(&guild_id)
            .cloned()
            .expect("guild never connected")
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        _channel_id: ChannelId,
        events: TrackEvents,
    ) -> Result<Box<dyn VoiceConnection>, TransportError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(error) = self.fail_with.lock().clone() {
            return Err(error);
        }

        let mut state = self.state.lock();
        if events.is_retired() {
            state.abandoned += 1;
            return Err(TransportError::Abandoned);
        }

        state.connects += 1;
        state.live += 1;
        state.max_live = state.max_live.max(state.live);
        let id = state.connects;
        state.calls.insert(guild_id, id);
        state.events.insert(guild_id, events);

        Ok(Box::new(FakeConnection {
            id,
            guild_id,
            state: self.state.clone(),
            closed: Mutex::new(false),
        }))
    }
}

struct FakeConnection {
    id: usize,
    guild_id: GuildId,
    state: Arc<Mutex<TransportState>>,
    closed: Mutex<bool>,
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    async fn play(&self, request: PlayRequest) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.paused = false;
        state.plays.push((self.guild_id, request));
        Ok(())
    }

    async fn pause(&self) {
        self.state.lock().paused = true;
    }

    async fn resume(&self) {
        self.state.lock().paused = false;
    }

    async fn stop(&self) {
        self.state.lock().stops += 1;
    }

    async fn set_volume(&self, volume: u8) {
        self.state.lock().volumes.push(volume);
    }

    async fn channel_occupancy(&self) -> ChannelOccupancy {
        ChannelOccupancy { self_only: self.state.lock().self_only }
    }

    async fn disconnect(&self) {
        let mut closed = self.closed.lock();
        if *closed {
            return;
        }
        *closed = true;

        let mut state = self.state.lock();
        state.live -= 1;
        state.disconnects += 1;
        // Una conexión reemplazada no toca la llamada nueva
        if state.calls.get(&self.guild_id) == Some(&self.id) {
            state.calls.remove(&self.guild_id);
            state.events.remove(&self.guild_id);
        }
    }
}

// ===== Settings =====

#[derive(Default)]
pub struct MemorySettings {
    pub stored: Mutex<HashMap<GuildId, GuildSettings>>,
}

impl MemorySettings {
    pub fn with(guild_id: GuildId, settings: GuildSettings) -> Self {
        let store = Self::default();
        store.stored.lock().insert(guild_id, settings);
        store
    }

    pub fn snapshot(&self, guild_id: GuildId) -> GuildSettings {
        self.stored.lock().get(&guild_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get(&self, guild_id: GuildId) -> anyhow::Result<GuildSettings> {
        Ok(self.snapshot(guild_id))
    }

    async fn set(&self, guild_id: GuildId, patch: SettingsPatch) -> anyhow::Result<()> {
        let mut stored = self.stored.lock();
        patch.apply(stored.entry(guild_id).or_default());
        Ok(())
    }
}

mock! {
    pub Settings {}

    #[async_trait]
    impl SettingsStore for Settings {
        async fn get(&self, guild_id: GuildId) -> anyhow::Result<GuildSettings>;
        async fn set(&self, guild_id: GuildId, patch: SettingsPatch) -> anyhow::Result<()>;
    }
}

/// A store whose every call fails.
pub fn broken_settings() -> MockSettings {
    let mut settings = MockSettings::new();
    settings
        .expect_get()
        .returning(|_| Err(anyhow::anyhow!("disco lleno")));
    settings
        .expect_set()
        .returning(|_, _| Err(anyhow::anyhow!("disco lleno")));
    settings
}

// ===== Harness =====

pub const GUILD: GuildId = GuildId::new(1);
pub const OTHER_GUILD: GuildId = GuildId::new(2);
pub const CHANNEL: ChannelId = ChannelId::new(10);

pub struct Harness {
    pub player: MusicPlayer,
    pub transport: FakeTransport,
    pub resolver: Arc<FakeResolver>,
    pub settings: Arc<MemorySettings>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(FakeTransport::default(), MemorySettings::default(), PlayerConfig::default())
    }

    pub fn with_transport(transport: FakeTransport) -> Self {
        Self::build(transport, MemorySettings::default(), PlayerConfig::default())
    }

    pub fn build(transport: FakeTransport, settings: MemorySettings, config: PlayerConfig) -> Self {
        let resolver = Arc::new(FakeResolver::default());
        let settings = Arc::new(settings);
        let player = MusicPlayer::new(
            resolver.clone(),
            Arc::new(transport.clone()),
            settings.clone(),
            config,
        );
        Self { player, transport, resolver, settings }
    }

    /// Status once the session is no longer loading a track.
    pub async fn settled(&self, guild_id: GuildId) -> SessionStatus {
        for _ in 0..1000 {
            let status = self.player.status(guild_id).await;
            if status.loading.is_none() {
                return status;
            }
            tokio::task::yield_now().await;
        }
        panic!("guild {} never finished loading a track", guild_id);
    }
}

/// Yields until `condition` holds, giving spawned tasks a chance to run.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..1000 {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    condition()
}
