//! Voice transport seam.
//!
//! The orchestrator never talks to songbird directly: it sees a
//! [`VoiceTransport`] that hands out one [`VoiceConnection`] per session.
//! Asynchronous notifications coming back from the transport (track finished,
//! connection dropped) go through [`TrackEvents`], which forwards them into
//! the owning session's mailbox instead of touching session state.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{effects::AudioFilter, session::SessionMessage};
use crate::error::TransportError;

/// How a `play` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Natural,
    Errored,
}

/// Track playback request. `token` identifies this play call in the
/// finish notification.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayRequest {
    pub token: u64,
    pub stream_url: String,
    pub filter: AudioFilter,
    pub volume: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOccupancy {
    /// Solo el bot está en el canal
    pub self_only: bool,
}

/// A live voice connection, exclusively owned by one session.
///
/// `pause`, `resume`, `stop` and `disconnect` are idempotent: calling them on
/// a connection with nothing playing is a no-op.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Starts streaming, replacing whatever was playing. Must eventually
    /// report exactly one [`TrackEvents::track_finished`] for `request.token`.
    async fn play(&self, request: PlayRequest) -> Result<(), TransportError>;

    async fn pause(&self);

    async fn resume(&self);

    async fn stop(&self);

    async fn set_volume(&self, volume: u8);

    async fn channel_occupancy(&self) -> ChannelOccupancy;

    async fn disconnect(&self);
}

#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Joins `channel_id` for the session behind `events`.
    ///
    /// Implementations serialize joins and leaves per guild. A connect whose
    /// `events` is already [retired](TrackEvents::is_retired) when its turn
    /// comes must fail with [`TransportError::Abandoned`] without joining, and
    /// disconnecting a connection that a newer one replaced must leave the
    /// newer one alone.
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: TrackEvents,
    ) -> Result<Box<dyn VoiceConnection>, TransportError>;
}

/// Sink through which a transport reports asynchronous events to a session.
#[derive(Clone)]
pub struct TrackEvents {
    guild_id: GuildId,
    mailbox: mpsc::UnboundedSender<SessionMessage>,
    lifetime: CancellationToken,
}

impl TrackEvents {
    pub(crate) fn new(
        guild_id: GuildId,
        mailbox: mpsc::UnboundedSender<SessionMessage>,
        lifetime: CancellationToken,
    ) -> Self {
        Self { guild_id, mailbox, lifetime }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// True once the owning session has torn down. Set before the session
    /// leaves the registry, so it is visible to any later session's connect.
    pub fn is_retired(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    pub fn track_finished(&self, token: u64, outcome: PlayOutcome) {
        if self
            .mailbox
            .send(SessionMessage::TrackFinished { token, outcome })
            .is_err()
        {
            debug!("Fin de track ignorado, la sesión de guild {} ya no existe", self.guild_id);
        }
    }

    pub fn connection_lost(&self) {
        if self.mailbox.send(SessionMessage::ConnectionLost).is_err() {
            debug!("Desconexión ignorada, la sesión de guild {} ya no existe", self.guild_id);
        }
    }
}
