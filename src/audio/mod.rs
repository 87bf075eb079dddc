//! # Audio Module
//!
//! Per-guild playback orchestration.
//!
//! ## Architecture
//!
//! ### [`player`] - Orchestrator
//! - Single entry point used by the bot: routes commands to guild sessions
//! - Creates sessions on `play`, retries once a retiring session is gone
//!
//! ### [`session`] - Guild Session
//! - One task per guild owning queue, current track and voice connection
//! - Serializes commands, track-finished events and idle ticks
//!
//! ### [`queue`] - Queue Management
//! - FIFO of pending references with shuffle and a bounded history
//!
//! ### [`idle`] - Auto Leave
//! - Empty-channel and no-command timeouts
//!
//! ### [`transport`] / [`voice`] - Voice
//! - Transport seam and its songbird implementation
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use music_maniac::audio::{MusicPlayer, PlayerConfig};
//! use serenity::all::{ChannelId, GuildId};
//! # use std::sync::Arc;
//! # use music_maniac::{sources::TrackResolver, audio::transport::VoiceTransport, storage::SettingsStore};
//!
//! # async fn example(
//! #     resolver: Arc<dyn TrackResolver>,
//! #     transport: Arc<dyn VoiceTransport>,
//! #     settings: Arc<dyn SettingsStore>,
//! # ) -> anyhow::Result<()> {
//! let player = MusicPlayer::new(resolver, transport, settings, PlayerConfig::default());
//! let guild_id = GuildId::new(123456789);
//!
//! player.play(guild_id, ChannelId::new(42), "never gonna give you up").await?;
//! player.pause(guild_id).await?;
//! player.resume(guild_id).await?;
//! player.skip(guild_id).await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;

pub mod effects;
pub mod idle;
pub mod player;
pub mod queue;
pub mod registry;
pub mod session;
pub mod transport;
pub mod voice;

pub use player::{MusicPlayer, PlayerConfig};
pub use session::{Command, CommandOutcome, SessionStatus};

/// Estado de reproducción de una sesión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Disconnected,
    Connecting,
    Playing,
    Paused,
    Idle,
}

impl PlayerState {
    /// Playing or paused: there is a current track.
    pub fn has_track(self) -> bool {
        matches!(self, PlayerState::Playing | PlayerState::Paused)
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayerState::Disconnected => "desconectado",
            PlayerState::Connecting => "conectando",
            PlayerState::Playing => "reproduciendo",
            PlayerState::Paused => "en pausa",
            PlayerState::Idle => "inactivo",
        };
        f.write_str(name)
    }
}
