//! Per-guild playback session.
//!
//! Every session is a single tokio task consuming its own mailbox. User
//! commands, track-finished notifications, connection loss and idle ticks are
//! all messages in that mailbox, so the fields below are only ever touched by
//! one task. The slow operations never run on that task:
//!
//! - a cold start (resolving the first track and joining the voice channel)
//!   runs in a separate task whose result re-enters the mailbox tagged with
//!   the session generation; `stop` bumps the generation so a late connection
//!   is torn down instead of adopted.
//! - resolving the next track while connected runs the same way, tagged with
//!   a load ticket. Meanwhile the session is `Idle` with `loading` set, and
//!   `stop` or new commands are handled right away.

use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    effects::{AudioFilter, FilterSettings},
    idle::{spawn_supervisor, IdleClock, IdleVerdict},
    player::SessionDeps,
    queue::{LoopMode, TrackQueue, TrackRef},
    transport::{PlayOutcome, PlayRequest, TrackEvents, VoiceConnection},
    PlayerState,
};
use crate::{
    error::{PersistenceWarning, PlaybackError, ResolutionError},
    sources::TrackDescriptor,
    storage::SettingsPatch,
};

pub type CommandResult = Result<CommandOutcome, PlaybackError>;

/// Comandos que acepta una sesión
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play { query: TrackRef, channel_id: ChannelId },
    Skip,
    Pause,
    Resume,
    Stop,
    Shuffle,
    ClearQueue,
    SetFilter(AudioFilter),
    SetVolume(u16),
    SetLoopMode(LoopMode),
    Status,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Play { .. } => "play",
            Command::Skip => "skip",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Stop => "stop",
            Command::Shuffle => "shuffle",
            Command::ClearQueue => "clearqueue",
            Command::SetFilter(_) => "filter",
            Command::SetVolume(_) => "volume",
            Command::SetLoopMode(_) => "loop",
            Command::Status => "status",
        }
    }
}

/// Result of a successful command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Started(TrackDescriptor),
    Queued { position: usize },
    Skipped { next: Option<TrackDescriptor> },
    Paused,
    Resumed,
    Stopped,
    Shuffled { count: usize },
    Cleared { removed: usize },
    FilterSet(AudioFilter),
    VolumeSet(u8),
    LoopModeSet(LoopMode),
    Status(SessionStatus),
}

/// Snapshot of a session for display and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: PlayerState,
    pub current: Option<TrackDescriptor>,
    pub queue: Vec<TrackRef>,
    pub filter: AudioFilter,
    pub volume: u8,
    pub loop_mode: LoopMode,
    /// Track being resolved before it starts
    pub loading: Option<TrackRef>,
}

impl SessionStatus {
    pub fn disconnected() -> Self {
        Self {
            state: PlayerState::Disconnected,
            current: None,
            queue: Vec::new(),
            filter: AudioFilter::None,
            volume: super::effects::DEFAULT_VOLUME,
            loop_mode: LoopMode::None,
            loading: None,
        }
    }
}

/// Track listo para conectar: resuelto y con conexión abierta.
pub(crate) struct PendingStart {
    reference: TrackRef,
    track: TrackDescriptor,
    connection: Box<dyn VoiceConnection>,
}

pub(crate) enum SessionMessage {
    Command {
        command: Command,
        reply: oneshot::Sender<CommandResult>,
    },
    ConnectFinished {
        generation: u64,
        attempt: Result<PendingStart, PlaybackError>,
        reply: oneshot::Sender<CommandResult>,
    },
    TrackLoaded {
        ticket: u64,
        reference: TrackRef,
        attempt: Result<TrackDescriptor, ResolutionError>,
        reply: LoadReply,
    },
    TrackFinished {
        token: u64,
        outcome: PlayOutcome,
    },
    ConnectionLost,
    IdleTick,
}

/// Who is waiting for a track being loaded.
pub(crate) enum LoadReply {
    Nobody,
    Play(oneshot::Sender<CommandResult>),
    Skip(oneshot::Sender<CommandResult>),
}

impl LoadReply {
    fn started(self, track: &TrackDescriptor) {
        let (reply, outcome) = match self {
            LoadReply::Nobody => return,
            LoadReply::Play(reply) => (reply, CommandOutcome::Started(track.clone())),
            LoadReply::Skip(reply) => {
                (reply, CommandOutcome::Skipped { next: Some(track.clone()) })
            }
        };
        let _ = reply.send(Ok(outcome));
    }

    /// The queue ran out before anything could start.
    fn exhausted(self) {
        match self {
            LoadReply::Nobody => {}
            LoadReply::Play(reply) => {
                let _ = reply.send(Err(PlaybackError::invalid_state("play", PlayerState::Idle)));
            }
            LoadReply::Skip(reply) => {
                let _ = reply.send(Ok(CommandOutcome::Skipped { next: None }));
            }
        }
    }

    fn fail(self, error: PlaybackError) {
        match self {
            LoadReply::Nobody => {}
            LoadReply::Play(reply) | LoadReply::Skip(reply) => {
                let _ = reply.send(Err(error));
            }
        }
    }
}

impl SessionMessage {
    /// Answers a message the session will never process.
    async fn reject(self) {
        match self {
            SessionMessage::Command { reply, .. } => {
                let _ = reply.send(Err(PlaybackError::SessionClosed));
            }
            SessionMessage::ConnectFinished { attempt, reply, .. } => {
                if let Ok(pending) = attempt {
                    pending.connection.disconnect().await;
                }
                let _ = reply.send(Err(PlaybackError::ConcurrencyStale));
            }
            SessionMessage::TrackLoaded { reply, .. } => {
                reply.fail(PlaybackError::ConcurrencyStale);
            }
            SessionMessage::TrackFinished { .. }
            | SessionMessage::ConnectionLost
            | SessionMessage::IdleTick => {}
        }
    }
}

/// Cheap, cloneable address of a running session.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    pub(crate) instance: u64,
    mailbox: mpsc::UnboundedSender<SessionMessage>,
}

impl SessionHandle {
    pub(crate) async fn submit(&self, command: Command) -> CommandResult {
        let (reply, response) = oneshot::channel();
        self.mailbox
            .send(SessionMessage::Command { command, reply })
            .map_err(|_| PlaybackError::SessionClosed)?;
        response.await.unwrap_or(Err(PlaybackError::SessionClosed))
    }

    /// Handle whose session never runs.
    #[cfg(test)]
    pub(crate) fn detached(instance: u64) -> Self {
        let (mailbox, _) = mpsc::unbounded_channel();
        Self { instance, mailbox }
    }
}

struct NowPlaying {
    reference: TrackRef,
    track: TrackDescriptor,
}

struct Loading {
    ticket: u64,
    reference: TrackRef,
}

pub(crate) struct Session {
    guild_id: GuildId,
    instance: u64,
    deps: Arc<SessionDeps>,
    mailbox: mpsc::UnboundedSender<SessionMessage>,

    state: PlayerState,
    queue: TrackQueue,
    current: Option<NowPlaying>,
    settings: FilterSettings,
    loop_mode: LoopMode,
    idle: IdleClock,

    /// Bumped on teardown; connect attempts from older generations are stale.
    generation: u64,
    /// Identifies the latest `play` on the connection.
    play_token: u64,
    /// Identifies the latest track load; older results are dropped.
    load_ticket: u64,
    loading: Option<Loading>,
    connection: Option<Box<dyn VoiceConnection>>,
    supervisor: Option<CancellationToken>,
    /// Cancelled on teardown, before the session leaves the registry.
    lifetime: CancellationToken,
    retired: bool,
}

impl Session {
    pub(crate) fn spawn(
        guild_id: GuildId,
        instance: u64,
        deps: Arc<SessionDeps>,
    ) -> SessionHandle {
        let (mailbox, inbox) = mpsc::unbounded_channel();
        let session = Session {
            guild_id,
            instance,
            queue: TrackQueue::new(deps.config.max_history),
            settings: FilterSettings {
                filter: AudioFilter::None,
                volume: deps.config.default_volume,
            },
            deps,
            mailbox: mailbox.clone(),
            state: PlayerState::Disconnected,
            current: None,
            loop_mode: LoopMode::None,
            idle: IdleClock::new(Instant::now()),
            generation: 0,
            play_token: 0,
            load_ticket: 0,
            loading: None,
            connection: None,
            supervisor: None,
            lifetime: CancellationToken::new(),
            retired: false,
        };

        tokio::spawn(session.run(inbox));
        SessionHandle { instance, mailbox }
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<SessionMessage>) {
        debug!("🧵 Sesión {} creada para guild {}", self.instance, self.guild_id);
        self.load_settings().await;

        while let Some(message) = inbox.recv().await {
            self.handle(message).await;
            if self.retired {
                break;
            }
        }

        // Lo que quedó en el buzón se rechaza; el orquestador reintenta
        inbox.close();
        while let Some(message) = inbox.recv().await {
            message.reject().await;
        }
        debug!("🧵 Sesión {} de guild {} finalizada", self.instance, self.guild_id);
    }

    async fn load_settings(&mut self) {
        match self.deps.settings.get(self.guild_id).await {
            Ok(stored) => {
                self.settings.volume = stored.volume.min(super::effects::MAX_VOLUME);
                if self.deps.config.enable_filters {
                    self.settings.filter = stored.filter;
                }
                self.loop_mode = stored.loop_mode;
            }
            Err(source) => {
                let warning = PersistenceWarning { guild_id: self.guild_id, source };
                warn!("⚠️ {}; usando valores por defecto", warning);
            }
        }
    }

    async fn handle(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Command { command, reply } => {
                // Consultar el estado no cuenta como actividad
                if command != Command::Status {
                    self.idle.touch(Instant::now());
                }
                self.handle_command(command, reply).await;
            }
            SessionMessage::ConnectFinished { generation, attempt, reply } => {
                self.on_connect_finished(generation, attempt, reply).await;
            }
            SessionMessage::TrackLoaded { ticket, reference, attempt, reply } => {
                self.on_track_loaded(ticket, reference, attempt, reply).await;
            }
            SessionMessage::TrackFinished { token, outcome } => {
                self.on_track_finished(token, outcome).await;
            }
            SessionMessage::ConnectionLost => {
                if self.connection.is_some() {
                    error!("🔌 Conexión de voz perdida en guild {}", self.guild_id);
                    self.teardown("conexión perdida").await;
                }
            }
            SessionMessage::IdleTick => self.on_idle_tick().await,
        }
    }

    async fn handle_command(&mut self, command: Command, reply: oneshot::Sender<CommandResult>) {
        match command {
            Command::Play { query, channel_id } if self.state == PlayerState::Disconnected => {
                self.begin_connect(query, channel_id, reply);
            }
            Command::Play { query, .. }
                if self.state == PlayerState::Idle && self.loading.is_none() =>
            {
                self.begin_load(query, LoadReply::Play(reply));
            }
            Command::Skip if self.state.has_track() => {
                if let Some(connection) = &self.connection {
                    connection.stop().await;
                }
                info!("⏭️ Saltando canción en guild {}", self.guild_id);
                self.advance(false, LoadReply::Skip(reply)).await;
            }
            command => {
                let result = self.apply(command).await;
                let _ = reply.send(result);
            }
        }
    }

    async fn apply(&mut self, command: Command) -> CommandResult {
        let name = command.name();
        match command {
            // Connecting, Playing, Paused, or Idle while a track loads
            Command::Play { query, .. } => {
                let position = self.queue.enqueue(query);
                debug!("📝 Track en cola (posición {}) en guild {}", position, self.guild_id);
                Ok(CommandOutcome::Queued { position })
            }
            Command::Skip => Err(PlaybackError::invalid_state(name, self.state)),
            Command::Pause => {
                if self.state != PlayerState::Playing {
                    return Err(PlaybackError::invalid_state(name, self.state));
                }
                if let Some(connection) = &self.connection {
                    connection.pause().await;
                }
                self.state = PlayerState::Paused;
                info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
                Ok(CommandOutcome::Paused)
            }
            Command::Resume => {
                if self.state != PlayerState::Paused {
                    return Err(PlaybackError::invalid_state(name, self.state));
                }
                if let Some(connection) = &self.connection {
                    connection.resume().await;
                }
                self.state = PlayerState::Playing;
                info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
                Ok(CommandOutcome::Resumed)
            }
            Command::Stop => {
                if self.state == PlayerState::Disconnected {
                    return Err(PlaybackError::invalid_state(name, self.state));
                }
                self.teardown("stop").await;
                Ok(CommandOutcome::Stopped)
            }
            Command::Shuffle => {
                self.require_session(name)?;
                let count = self.queue.shuffle();
                Ok(CommandOutcome::Shuffled { count })
            }
            Command::ClearQueue => {
                self.require_session(name)?;
                let removed = self.queue.reset();
                Ok(CommandOutcome::Cleared { removed })
            }
            Command::SetFilter(filter) => {
                self.require_session(name)?;
                if !self.deps.config.enable_filters {
                    return Err(PlaybackError::InvalidArgument(
                        "los filtros están deshabilitados".to_string(),
                    ));
                }
                // Aplica desde el siguiente track
                self.settings.filter = filter;
                self.persist(SettingsPatch { filter: Some(filter), ..Default::default() });
                info!("🎛️ Filtro {} aplicado en guild {}", filter, self.guild_id);
                Ok(CommandOutcome::FilterSet(filter))
            }
            Command::SetVolume(volume) => {
                self.require_session(name)?;
                let volume = FilterSettings::validate_volume(volume)
                    .map_err(PlaybackError::InvalidArgument)?;
                self.settings.volume = volume;
                if let Some(connection) = &self.connection {
                    connection.set_volume(volume).await;
                }
                self.persist(SettingsPatch { volume: Some(volume), ..Default::default() });
                info!("🔊 Volumen ajustado a {}% en guild {}", volume, self.guild_id);
                Ok(CommandOutcome::VolumeSet(volume))
            }
            Command::SetLoopMode(mode) => {
                self.require_session(name)?;
                self.loop_mode = mode;
                self.persist(SettingsPatch { loop_mode: Some(mode), ..Default::default() });
                info!("🔁 Modo de repetición {} en guild {}", mode, self.guild_id);
                Ok(CommandOutcome::LoopModeSet(mode))
            }
            Command::Status => Ok(CommandOutcome::Status(self.status())),
        }
    }

    fn require_session(&self, command: &'static str) -> Result<(), PlaybackError> {
        if self.state == PlayerState::Disconnected {
            return Err(PlaybackError::invalid_state(command, self.state));
        }
        Ok(())
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            current: self.current.as_ref().map(|now| now.track.clone()),
            queue: self.queue.snapshot(),
            filter: self.settings.filter,
            volume: self.settings.volume,
            loop_mode: self.loop_mode,
            loading: self.loading.as_ref().map(|loading| loading.reference.clone()),
        }
    }

    /// `Disconnected -> Connecting`. Resolution and join happen off the
    /// session task; the reply is sent once the result comes back.
    fn begin_connect(
        &mut self,
        query: TrackRef,
        channel_id: ChannelId,
        reply: oneshot::Sender<CommandResult>,
    ) {
        self.state = PlayerState::Connecting;
        let generation = self.generation;
        let guild_id = self.guild_id;
        let deps = self.deps.clone();
        let mailbox = self.mailbox.clone();
        let events = TrackEvents::new(guild_id, mailbox.clone(), self.lifetime.clone());

        info!("🔗 Conectando al canal {} en guild {}", channel_id, guild_id);

        tokio::spawn(async move {
            let attempt = async {
                let track = deps.resolver.resolve(&query).await?;
                let connection = deps.transport.connect(guild_id, channel_id, events).await?;
                Ok::<_, PlaybackError>(PendingStart { reference: query, track, connection })
            }
            .await;

            let message = SessionMessage::ConnectFinished { generation, attempt, reply };
            if let Err(mpsc::error::SendError(message)) = mailbox.send(message) {
                debug!("Conexión tardía para guild {}, descartando", guild_id);
                message.reject().await;
            }
        });
    }

    async fn on_connect_finished(
        &mut self,
        generation: u64,
        attempt: Result<PendingStart, PlaybackError>,
        reply: oneshot::Sender<CommandResult>,
    ) {
        if generation != self.generation || self.state != PlayerState::Connecting {
            debug!("Conexión obsoleta para guild {} (gen {})", self.guild_id, generation);
            if let Ok(pending) = attempt {
                pending.connection.disconnect().await;
            }
            let _ = reply.send(Err(PlaybackError::ConcurrencyStale));
            return;
        }

        let pending = match attempt {
            Ok(pending) => pending,
            Err(e) => {
                warn!("❌ No se pudo iniciar la reproducción en guild {}: {}", self.guild_id, e);
                self.teardown("fallo al conectar").await;
                let _ = reply.send(Err(e));
                return;
            }
        };

        info!("🔊 Conectado al canal de voz en guild {}", self.guild_id);
        self.connection = Some(pending.connection);
        self.start_supervisor();

        match self.start_track(pending.reference, pending.track.clone()).await {
            Ok(()) => {
                let _ = reply.send(Ok(CommandOutcome::Started(pending.track)));
            }
            Err(e) => {
                self.teardown("fallo al reproducir").await;
                let _ = reply.send(Err(e));
            }
        }
    }

    /// Resolves `reference` off the session task; the result comes back as
    /// [`SessionMessage::TrackLoaded`]. The connection is kept, so an `Idle`
    /// play never reconnects.
    fn begin_load(&mut self, reference: TrackRef, reply: LoadReply) {
        self.load_ticket += 1;
        let ticket = self.load_ticket;
        self.loading = Some(Loading { ticket, reference: reference.clone() });
        self.current = None;
        self.state = PlayerState::Idle;

        let resolver = self.deps.resolver.clone();
        let mailbox = self.mailbox.clone();
        let guild_id = self.guild_id;
        debug!("⏳ Cargando '{}' en guild {}", reference, guild_id);

        tokio::spawn(async move {
            let attempt = resolver.resolve(&reference).await;
            let message = SessionMessage::TrackLoaded { ticket, reference, attempt, reply };
            if let Err(mpsc::error::SendError(message)) = mailbox.send(message) {
                debug!("Track cargado tarde para guild {}, descartando", guild_id);
                message.reject().await;
            }
        });
    }

    async fn on_track_loaded(
        &mut self,
        ticket: u64,
        reference: TrackRef,
        attempt: Result<TrackDescriptor, ResolutionError>,
        reply: LoadReply,
    ) {
        if self.loading.as_ref().map(|loading| loading.ticket) != Some(ticket) {
            debug!("Carga obsoleta ignorada (ticket {}) en guild {}", ticket, self.guild_id);
            reply.fail(PlaybackError::ConcurrencyStale);
            return;
        }
        self.loading = None;

        let track = match attempt {
            Ok(track) => track,
            Err(e) => {
                warn!("⏭️ Saltando '{}' en guild {}: {}", reference, self.guild_id, e);
                // `play` responde con su propio error; la cola sigue sin nadie esperando
                let reply = match reply {
                    LoadReply::Play(reply) => {
                        let _ = reply.send(Err(e.into()));
                        LoadReply::Nobody
                    }
                    other => other,
                };
                self.load_next(reply);
                return;
            }
        };

        match self.start_track(reference, track.clone()).await {
            Ok(()) => reply.started(&track),
            Err(e) => {
                self.fail_active(e.clone()).await;
                reply.fail(e);
            }
        }
    }

    async fn start_track(
        &mut self,
        reference: TrackRef,
        track: TrackDescriptor,
    ) -> Result<(), PlaybackError> {
        let Some(connection) = &self.connection else {
            return Err(PlaybackError::invalid_state("play", self.state));
        };

        self.play_token += 1;
        let request = PlayRequest {
            token: self.play_token,
            stream_url: track.stream_url.clone(),
            filter: self.settings.filter,
            volume: self.settings.volume,
        };
        connection.play(request).await?;

        info!("🎵 Reproduciendo: {} en guild {}", track.title, self.guild_id);
        self.queue.record_played(reference.clone());
        self.current = Some(NowPlaying { reference, track });
        self.state = PlayerState::Playing;
        Ok(())
    }

    async fn replay_current(&mut self, now: NowPlaying) -> Result<(), PlaybackError> {
        let Some(connection) = &self.connection else {
            return Err(PlaybackError::invalid_state("play", self.state));
        };

        self.play_token += 1;
        let request = PlayRequest {
            token: self.play_token,
            stream_url: now.track.stream_url.clone(),
            filter: self.settings.filter,
            volume: self.settings.volume,
        };
        connection.play(request).await?;

        info!("🔂 Repitiendo track: {} ({})", now.track.title, now.reference);
        self.current = Some(now);
        self.state = PlayerState::Playing;
        Ok(())
    }

    /// Moves past the current track. `natural` is true when it ended by
    /// itself, which is the only case where `loop=song` repeats it.
    async fn advance(&mut self, natural: bool, reply: LoadReply) {
        let finished = self.current.take();

        if natural && self.loop_mode == LoopMode::Song {
            if let Some(now) = finished {
                let track = now.track.clone();
                match self.replay_current(now).await {
                    Ok(()) => reply.started(&track),
                    Err(e) => {
                        self.fail_active(e.clone()).await;
                        reply.fail(e);
                    }
                }
                return;
            }
        }

        self.load_next(reply);
    }

    /// Starts loading the next queued ref, rewinding the history first with
    /// `loop=queue`. Goes `Idle` when there is nothing left.
    fn load_next(&mut self, reply: LoadReply) {
        loop {
            match self.queue.dequeue_front() {
                Some(next) => return self.begin_load(next, reply),
                None if self.loop_mode == LoopMode::Queue && self.queue.rewind() > 0 => continue,
                None => break,
            }
        }

        info!("📭 Cola vacía en guild {}, esperando comandos", self.guild_id);
        self.current = None;
        self.state = PlayerState::Idle;
        reply.exhausted();
    }

    async fn fail_active(&mut self, error: PlaybackError) {
        error!("❌ Error de transporte en guild {}: {}", self.guild_id, error);
        self.teardown("error de transporte").await;
    }

    async fn on_track_finished(&mut self, token: u64, outcome: PlayOutcome) {
        if token != self.play_token || !self.state.has_track() {
            debug!("Fin de track obsoleto ignorado (token {}) en guild {}", token, self.guild_id);
            return;
        }

        if outcome == PlayOutcome::Errored {
            warn!("⚠️ El track terminó con error en guild {}", self.guild_id);
        }
        self.advance(true, LoadReply::Nobody).await;
    }

    async fn on_idle_tick(&mut self) {
        let Some(connection) = &self.connection else {
            return;
        };

        let occupancy = connection.channel_occupancy().await;
        // Cargar el siguiente track cuenta como reproducción
        let state = match self.loading {
            Some(_) => PlayerState::Playing,
            None => self.state,
        };
        let verdict =
            self.deps.config.idle.evaluate(&mut self.idle, Instant::now(), occupancy, state);

        match verdict {
            IdleVerdict::Stay => {}
            IdleVerdict::LeaveEmptyChannel => {
                info!("🚪 Auto Leave: canal vacío en guild {}", self.guild_id);
                self.teardown("canal vacío").await;
            }
            IdleVerdict::LeaveNoCommand => {
                info!("🚪 Auto Leave: sin comandos en guild {}", self.guild_id);
                self.teardown("sin comandos").await;
            }
        }
    }

    fn start_supervisor(&mut self) {
        let cancel = CancellationToken::new();
        spawn_supervisor(self.deps.config.idle.poll_interval, self.mailbox.clone(), cancel.clone());
        self.idle.empty_since = None;
        self.supervisor = Some(cancel);
    }

    fn persist(&self, patch: SettingsPatch) {
        self.deps.writer.submit(self.guild_id, patch);
    }

    /// Any state `-> Disconnected`: releases the connection, empties the
    /// queue and removes this session from the registry.
    async fn teardown(&mut self, reason: &str) {
        self.generation += 1;
        self.lifetime.cancel();
        self.loading = None;

        if let Some(cancel) = self.supervisor.take() {
            cancel.cancel();
        }
        if let Some(connection) = self.connection.take() {
            connection.stop().await;
            connection.disconnect().await;
        }

        let dropped = self.queue.reset();
        self.current = None;
        self.state = PlayerState::Disconnected;
        self.retired = true;

        // Después de desconectar: nunca dos conexiones vivas por guild
        self.deps.registry.remove_instance(self.guild_id, self.instance);

        info!(
            "👋 Sesión de guild {} cerrada ({}), {} tracks descartados",
            self.guild_id, reason, dropped
        );
    }
}
