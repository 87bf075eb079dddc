//! Songbird implementation of the voice transport.
//!
//! Without a filter the stream URL is handed to songbird as an HTTP input.
//! With a filter, ffmpeg fetches the stream, applies the filter graph and
//! pipes WAV into songbird.
//!
//! Songbird keeps a single `Call` per guild. Joins and leaves for one guild
//! run one at a time under that guild's [`CallSlot`], which also records the
//! connection currently owning the call: a connection that was replaced by a
//! newer one leaves the call untouched when it is released.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::{
    cache::Cache,
    model::id::{ChannelId, GuildId},
};
use songbird::{
    error::JoinError,
    events::CoreEvent,
    input::{ChildContainer, HttpRequest, Input},
    tracks::{Track, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    process::{Command, Stdio},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, OnceLock,
    },
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use super::{
    effects::{AudioFilter, FilterSettings},
    transport::{
        ChannelOccupancy, PlayOutcome, PlayRequest, TrackEvents, VoiceConnection, VoiceTransport,
    },
};
use crate::error::TransportError;

/// Dueño de la llamada de un guild
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct CallSlot {
    owner: Option<u64>,
}

impl CallSlot {
    /// Makes `connection` the owner; returns the connection it replaced.
    fn claim(&mut self, connection: u64) -> Option<u64> {
        self.owner.replace(connection)
    }

    fn owned_by(&self, connection: u64) -> bool {
        self.owner == Some(connection)
    }

    /// Gives the call up if `connection` still owns it.
    fn release(&mut self, connection: u64) -> bool {
        if !self.owned_by(connection) {
            return false;
        }
        self.owner = None;
        true
    }
}

#[derive(Clone, Default)]
pub(crate) struct CallOwners {
    slots: Arc<DashMap<GuildId, Arc<AsyncMutex<CallSlot>>>>,
    next_connection: Arc<AtomicU64>,
}

impl CallOwners {
    fn next_connection(&self) -> u64 {
        self.next_connection.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Waits for the guild's turn. Held across a whole join or leave.
    async fn lock(&self, guild_id: GuildId) -> OwnedMutexGuard<CallSlot> {
        let slot = self.slots.entry(guild_id).or_default().clone();
        slot.lock_owned().await
    }
}

pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    cache: Arc<OnceLock<Arc<Cache>>>,
    http: reqwest::Client,
    owners: CallOwners,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            cache: Arc::new(OnceLock::new()),
            http: reqwest::Client::builder()
                .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
                .build()
                .unwrap_or_default(),
            owners: CallOwners::default(),
        }
    }

    /// Gives the transport access to serenity's cache so it can see who else
    /// is in the voice channel. Called once the gateway is ready.
    pub fn attach_cache(&self, cache: Arc<Cache>) {
        if self.cache.set(cache).is_err() {
            debug!("Caché de serenity ya adjuntada");
        }
    }

    fn map_join_error(error: JoinError) -> TransportError {
        match error {
            JoinError::TimedOut | JoinError::Dropped => {
                TransportError::NetworkFailure(error.to_string())
            }
            other => TransportError::JoinDenied(other.to_string()),
        }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: TrackEvents,
    ) -> Result<Box<dyn VoiceConnection>, TransportError> {
        let mut slot = self.owners.lock(guild_id).await;
        if events.is_retired() {
            debug!("Conexión abandonada para guild {}, no se une", guild_id);
            return Err(TransportError::Abandoned);
        }

        // Una llamada viva sin dueño registrado no es nuestra
        if slot.owner.is_none() {
            if let Some(existing) = self.manager.get(guild_id) {
                if existing.lock().await.current_connection().is_some() {
                    return Err(TransportError::AlreadyConnected);
                }
            }
        }

        let call = match self.manager.join(guild_id, channel_id).await {
            Ok(call) => call,
            Err(e) => {
                error!("Error al unirse al canal {} en guild {}: {:?}", channel_id, guild_id, e);
                // songbird deja la llamada registrada aunque falle el join
                slot.owner = None;
                let _ = self.manager.remove(guild_id).await;
                return Err(Self::map_join_error(e));
            }
        };

        let connection_id = self.owners.next_connection();
        if let Some(previous) = slot.claim(connection_id) {
            debug!("Conexión {} reemplaza a {} en guild {}", connection_id, previous, guild_id);
        }

        {
            let mut call_lock = call.lock().await;
            call_lock.remove_all_global_events();
            call_lock.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DriverDisconnectHandler { events: events.clone() },
            );
        }
        drop(slot);

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(Box::new(SongbirdConnection {
            id: connection_id,
            guild_id,
            channel_id,
            call,
            manager: self.manager.clone(),
            owners: self.owners.clone(),
            cache: self.cache.clone(),
            http: self.http.clone(),
            events,
            current: Mutex::new(None),
        }))
    }
}

struct SongbirdConnection {
    id: u64,
    guild_id: GuildId,
    channel_id: ChannelId,
    call: Arc<AsyncMutex<Call>>,
    manager: Arc<Songbird>,
    owners: CallOwners,
    cache: Arc<OnceLock<Arc<Cache>>>,
    http: reqwest::Client,
    events: TrackEvents,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdConnection {
    fn build_input(&self, request: &PlayRequest) -> Result<Input, TransportError> {
        let Some(graph) = request.filter.ffmpeg_graph() else {
            return Ok(HttpRequest::new(self.http.clone(), request.stream_url.clone()).into());
        };

        debug!("🎛️ Aplicando filtro {} con ffmpeg", request.filter);
        let child = Command::new("ffmpeg")
            .args([
                "-reconnect",
                "1",
                "-reconnect_streamed",
                "1",
                "-reconnect_delay_max",
                "5",
                "-i",
                &request.stream_url,
                "-af",
                graph,
                "-ac",
                "2",
                "-ar",
                "48000",
                "-f",
                "wav",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                TransportError::NetworkFailure(format!("no se pudo iniciar ffmpeg: {}", e))
            })?;

        Ok(ChildContainer::from(child).into())
    }

    fn with_current(
        &self,
        action: impl FnOnce(&TrackHandle) -> songbird::tracks::TrackResult<()>,
    ) {
        if let Some(handle) = self.current.lock().as_ref() {
            if let Err(e) = action(handle) {
                debug!("Acción sobre track finalizado en guild {}: {:?}", self.guild_id, e);
            }
        }
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn play(&self, request: PlayRequest) -> Result<(), TransportError> {
        let input = self.build_input(&request)?;
        let gain = FilterSettings { filter: request.filter, volume: request.volume }.gain();

        let handle = {
            let mut call = self.call.lock().await;
            if call.current_connection().is_none() {
                return Err(TransportError::NetworkFailure("conexión de voz cerrada".to_string()));
            }
            call.play_only(Track::new(input).volume(gain))
        };

        let notifier = TrackFinishedNotifier {
            token: request.token,
            events: self.events.clone(),
            fired: Arc::new(AtomicBool::new(false)),
        };
        let finishes = [
            (TrackEvent::End, PlayOutcome::Natural),
            (TrackEvent::Error, PlayOutcome::Errored),
        ];
        for (event, outcome) in finishes {
            let handler = TrackFinishedHandler { notifier: notifier.clone(), outcome };
            if let Err(e) = handle.add_event(Event::Track(event), handler) {
                warn!("No se pudo registrar evento de track en guild {}: {:?}", self.guild_id, e);
            }
        }

        if let Some(previous) = self.current.lock().replace(handle) {
            let _ = previous.stop();
        }
        Ok(())
    }

    async fn pause(&self) {
        self.with_current(|handle| handle.pause());
    }

    async fn resume(&self) {
        self.with_current(|handle| handle.play());
    }

    async fn stop(&self) {
        if let Some(handle) = self.current.lock().take() {
            let _ = handle.stop();
        }
    }

    async fn set_volume(&self, volume: u8) {
        let gain = FilterSettings { filter: AudioFilter::None, volume }.gain();
        self.with_current(|handle| handle.set_volume(gain));
    }

    async fn channel_occupancy(&self) -> ChannelOccupancy {
        let Some(cache) = self.cache.get() else {
            return ChannelOccupancy { self_only: false };
        };

        let bot_id = cache.current_user().id;
        let Some(guild) = cache.guild(self.guild_id) else {
            return ChannelOccupancy { self_only: false };
        };

        let others = guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(self.channel_id) && state.user_id != bot_id)
            .count();

        ChannelOccupancy { self_only: others == 0 }
    }

    async fn disconnect(&self) {
        let mut slot = self.owners.lock(self.guild_id).await;
        if !slot.release(self.id) {
            debug!(
                "Conexión {} de guild {} ya reemplazada, la llamada sigue activa",
                self.id, self.guild_id
            );
            return;
        }

        self.call.lock().await.remove_all_global_events();
        if let Err(e) = self.manager.remove(self.guild_id).await {
            debug!("Llamada de guild {} ya cerrada: {:?}", self.guild_id, e);
        }
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
    }
}

/// Reports the end of one `play` exactly once, whichever event fires first.
#[derive(Clone)]
struct TrackFinishedNotifier {
    token: u64,
    events: TrackEvents,
    fired: Arc<AtomicBool>,
}

struct TrackFinishedHandler {
    notifier: TrackFinishedNotifier,
    outcome: PlayOutcome,
}

#[async_trait]
impl VoiceEventHandler for TrackFinishedHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if self.notifier.fired.swap(true, Ordering::AcqRel) {
            return None;
        }

        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                debug!(
                    "🎵 Track {} terminó en guild {}: {:?}",
                    self.notifier.token,
                    self.notifier.events.guild_id(),
                    state.playing
                );
            }
        }

        self.notifier.events.track_finished(self.notifier.token, self.outcome);
        None
    }
}

/// Handler para desconexiones del driver de voz
struct DriverDisconnectHandler {
    events: TrackEvents,
}

#[async_trait]
impl VoiceEventHandler for DriverDisconnectHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        warn!("🔌 Bot desconectado del canal de voz en guild {}", self.events.guild_id());
        self.events.connection_lost();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn replaced_connection_cannot_release_the_call() {
        let mut slot = CallSlot::default();
        assert_eq!(slot.claim(1), None);
        assert_eq!(slot.claim(2), Some(1));

        assert!(!slot.release(1));
        assert!(slot.owned_by(2));

        assert!(slot.release(2));
        assert_eq!(slot, CallSlot::default());
    }

    #[tokio::test]
    async fn guild_turns_are_serialized() {
        let owners = CallOwners::default();
        let guild = GuildId::new(7);

        let mut first = owners.lock(guild).await;
        first.claim(owners.next_connection());

        let waiting = {
            let owners = owners.clone();
            tokio::spawn(async move { owners.lock(guild).await.owner })
        };
        tokio::task::yield_now().await;
        assert!(!waiting.is_finished());

        // Otro guild no espera
        assert_eq!(owners.lock(GuildId::new(8)).await.owner, None);

        drop(first);
        assert_eq!(waiting.await.unwrap(), Some(1));
    }
}
