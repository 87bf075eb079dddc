//! # Error Types
//!
//! Error taxonomy of the playback orchestrator.
//!
//! - [`ResolutionError`]: the query could not be turned into a playable track.
//!   User-facing and non-fatal, the session is left untouched.
//! - [`TransportError`]: joining or streaming on the voice connection failed.
//! - [`PlaybackError`]: everything a session command can return, including
//!   `InvalidState` (command not meaningful right now) and `ConcurrencyStale`
//!   (a connect or track load finished after the session was stopped).
//! - [`PersistenceWarning`]: the settings store failed. Only ever logged.

use serenity::model::id::GuildId;
use thiserror::Error;

use crate::audio::PlayerState;

/// Fallos del resolvedor de tracks
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("No se encontraron resultados para `{0}`")]
    NotFound(String),

    #[error("Error de red al resolver el track: {0}")]
    NetworkFailure(String),

    #[error("Fuente no soportada: {0}")]
    Unsupported(String),
}

/// Fallos del transporte de voz
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("No se pudo entrar al canal de voz: {0}")]
    JoinDenied(String),

    #[error("Ya existe una conexión de voz activa en este servidor")]
    AlreadyConnected,

    #[error("Error de red en la conexión de voz: {0}")]
    NetworkFailure(String),

    /// The session that asked for the connection stopped before the join.
    #[error("La sesión que pidió la conexión ya terminó")]
    Abandoned,
}

/// Errores devueltos por los comandos de una sesión
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("`{command}` no está disponible en estado {state}")]
    InvalidState {
        command: &'static str,
        state: PlayerState,
    },

    #[error("La operación fue descartada porque la sesión se detuvo")]
    ConcurrencyStale,

    #[error("Argumento inválido: {0}")]
    InvalidArgument(String),

    /// The session retired while the command was in flight; the orchestrator
    /// retries against a fresh session before surfacing this.
    #[error("La sesión se cerró antes de procesar el comando")]
    SessionClosed,
}

impl PlaybackError {
    pub fn invalid_state(command: &'static str, state: PlayerState) -> Self {
        Self::InvalidState { command, state }
    }

    /// Errores que la interfaz puede ignorar sin avisar al usuario.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::ConcurrencyStale)
    }
}

/// Fallo del almacenamiento de configuración. Nunca detiene la reproducción.
#[derive(Debug, Error)]
#[error("No se pudo persistir la configuración del guild {guild_id}: {source}")]
pub struct PersistenceWarning {
    pub guild_id: GuildId,
    #[source]
    pub source: anyhow::Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_errors_convert_into_playback_errors() {
        let err: PlaybackError = ResolutionError::NotFound("abc".into()).into();
        assert_eq!(err, PlaybackError::Resolution(ResolutionError::NotFound("abc".into())));
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn only_stale_connections_are_silent() {
        assert!(PlaybackError::ConcurrencyStale.is_silent());
        assert!(!PlaybackError::invalid_state("skip", PlayerState::Idle).is_silent());
        assert!(!PlaybackError::Transport(TransportError::AlreadyConnected).is_silent());
    }

    #[test]
    fn invalid_state_names_command_and_state() {
        let err = PlaybackError::invalid_state("skip", PlayerState::Disconnected);
        let message = err.to_string();
        assert!(message.contains("skip"));
        assert!(message.contains("desconectado"));
    }
}
