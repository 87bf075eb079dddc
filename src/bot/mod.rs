//! # Bot Module
//!
//! Discord front end of Music Maniac.
//!
//! - Slash command registration ([`commands`])
//! - Interaction handling ([`handlers`]), which only translates Discord
//!   interactions into [`MusicPlayer`] commands and renders the outcome
//! - Gateway events (ready, interactions)
//!
//! ## Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use music_maniac::{audio::{MusicPlayer, voice::SongbirdTransport}, bot::MusicBot, config::Config, storage::SettingsStore};
//! # fn example(config: Config, player: MusicPlayer, settings: Arc<dyn SettingsStore>, transport: Arc<SongbirdTransport>) {
//! let bot = MusicBot::new(config, player, settings, transport);
//! # }
//! ```

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{voice::SongbirdTransport, MusicPlayer},
    config::Config,
    storage::SettingsStore,
};

/// Main Discord event handler.
///
/// Holds the orchestrator shared by every guild, the settings store (for the
/// DJ role) and the songbird transport, which needs serenity's cache once the
/// gateway is ready.
pub struct MusicBot {
    config: Arc<Config>,
    pub player: MusicPlayer,
    pub settings: Arc<dyn SettingsStore>,
    transport: Arc<SongbirdTransport>,
}

impl MusicBot {
    pub fn new(
        config: Config,
        player: MusicPlayer,
        settings: Arc<dyn SettingsStore>,
        transport: Arc<SongbirdTransport>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            player,
            settings,
            transport,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Commands go to a single guild when `GUILD_ID` is set (instant
    /// propagation, useful for development) and globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        let bot_id = ctx.cache.current_user().id;
        info!("🤖 Bot ID: {}", bot_id);
        info!("🔧 Application ID: {}", self.config.application_id);

        let enable_filters = self.config.enable_filters;
        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);

                commands::register_guild_commands(ctx, guild_id, enable_filters)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx, enable_filters)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos globales: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                    })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        self.transport.attach_cache(ctx.cache.clone());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }
}
