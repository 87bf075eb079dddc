use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    effects::{AudioFilter, DEFAULT_VOLUME},
    idle::IdlePolicy,
    queue::{LoopMode, DEFAULT_MAX_HISTORY},
    registry::SessionRegistry,
    session::{Command, CommandOutcome, CommandResult, Session, SessionStatus},
    transport::VoiceTransport,
    PlayerState,
};
use crate::{
    error::PlaybackError,
    sources::TrackResolver,
    storage::{SettingsStore, SettingsWriter},
};

/// A command that hits a retiring session is resubmitted this many times.
const MAX_SUBMIT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    /// Volumen inicial cuando el guild no tiene configuración guardada
    pub default_volume: u8,
    pub idle: IdlePolicy,
    pub max_history: usize,
    pub enable_filters: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_volume: DEFAULT_VOLUME,
            idle: IdlePolicy::default(),
            max_history: DEFAULT_MAX_HISTORY,
            enable_filters: true,
        }
    }
}

/// Dependencies shared by every session.
pub(crate) struct SessionDeps {
    pub(crate) resolver: Arc<dyn TrackResolver>,
    pub(crate) transport: Arc<dyn VoiceTransport>,
    pub(crate) settings: Arc<dyn SettingsStore>,
    pub(crate) writer: SettingsWriter,
    pub(crate) config: PlayerConfig,
    pub(crate) registry: SessionRegistry,
}

/// Orquestador de reproducción: un punto de entrada para todos los guilds
#[derive(Clone)]
pub struct MusicPlayer {
    deps: Arc<SessionDeps>,
}

impl MusicPlayer {
    /// Spawns the settings writer, so it has to be called inside a tokio runtime.
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        transport: Arc<dyn VoiceTransport>,
        settings: Arc<dyn SettingsStore>,
        config: PlayerConfig,
    ) -> Self {
        Self {
            deps: Arc::new(SessionDeps {
                resolver,
                transport,
                writer: SettingsWriter::spawn(settings.clone()),
                settings,
                config,
                registry: SessionRegistry::new(),
            }),
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.deps.config
    }

    /// Routes `command` to the guild's session. `play` creates the session
    /// when absent; every other command on an absent session is answered
    /// here as if the session were `Disconnected`.
    pub async fn submit(&self, guild_id: GuildId, command: Command) -> CommandResult {
        for attempt in 1..=MAX_SUBMIT_ATTEMPTS {
            let handle = match command {
                Command::Play { .. } => Some(self.deps.registry.get_or_create(guild_id, |instance| {
                    Session::spawn(guild_id, instance, self.deps.clone())
                })),
                _ => self.deps.registry.get(guild_id),
            };

            let Some(handle) = handle else {
                return Self::without_session(&command);
            };

            match handle.submit(command.clone()).await {
                Err(PlaybackError::SessionClosed) => {
                    debug!(
                        "Sesión {} de guild {} cerrada, reintentando `{}` ({}/{})",
                        handle.instance,
                        guild_id,
                        command.name(),
                        attempt,
                        MAX_SUBMIT_ATTEMPTS
                    );
                    self.deps.registry.remove_instance(guild_id, handle.instance);
                }
                result => return result,
            }
        }

        warn!("⚠️ No se pudo entregar `{}` a guild {}", command.name(), guild_id);
        Err(PlaybackError::SessionClosed)
    }

    fn without_session(command: &Command) -> CommandResult {
        match command {
            Command::Status => Ok(CommandOutcome::Status(SessionStatus::disconnected())),
            command => Err(PlaybackError::invalid_state(command.name(), PlayerState::Disconnected)),
        }
    }

    pub async fn play(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        query: impl Into<String>,
    ) -> CommandResult {
        let command = Command::Play { query: query.into(), channel_id };
        self.submit(guild_id, command).await
    }

    pub async fn skip(&self, guild_id: GuildId) -> CommandResult {
        self.submit(guild_id, Command::Skip).await
    }

    pub async fn pause(&self, guild_id: GuildId) -> CommandResult {
        self.submit(guild_id, Command::Pause).await
    }

    pub async fn resume(&self, guild_id: GuildId) -> CommandResult {
        self.submit(guild_id, Command::Resume).await
    }

    pub async fn stop(&self, guild_id: GuildId) -> CommandResult {
        self.submit(guild_id, Command::Stop).await
    }

    pub async fn shuffle(&self, guild_id: GuildId) -> CommandResult {
        self.submit(guild_id, Command::Shuffle).await
    }

    pub async fn clear_queue(&self, guild_id: GuildId) -> CommandResult {
        self.submit(guild_id, Command::ClearQueue).await
    }

    pub async fn set_filter(&self, guild_id: GuildId, filter: AudioFilter) -> CommandResult {
        self.submit(guild_id, Command::SetFilter(filter)).await
    }

    pub async fn set_volume(&self, guild_id: GuildId, volume: u16) -> CommandResult {
        self.submit(guild_id, Command::SetVolume(volume)).await
    }

    pub async fn set_loop_mode(&self, guild_id: GuildId, mode: LoopMode) -> CommandResult {
        self.submit(guild_id, Command::SetLoopMode(mode)).await
    }

    pub async fn status(&self, guild_id: GuildId) -> SessionStatus {
        match self.submit(guild_id, Command::Status).await {
            Ok(CommandOutcome::Status(status)) => status,
            _ => SessionStatus::disconnected(),
        }
    }

    /// Número de sesiones vivas
    pub fn active_sessions(&self) -> usize {
        self.deps.registry.len()
    }

    /// Stops every session. Used on Ctrl+C.
    pub async fn shutdown(&self) {
        let guilds = self.deps.registry.guilds();
        if guilds.is_empty() {
            return;
        }

        info!("🛑 Cerrando {} sesiones activas", guilds.len());
        let results = join_all(guilds.into_iter().map(|guild_id| self.stop(guild_id))).await;
        let failed = results.iter().filter(|result| result.is_err()).count();
        if failed > 0 {
            debug!("{} sesiones ya estaban cerradas", failed);
        }
    }
}
