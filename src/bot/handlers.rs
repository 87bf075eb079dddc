use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, RoleId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info, warn};

use crate::{
    audio::{effects::AudioFilter, queue::LoopMode, session::CommandResult},
    bot::MusicBot,
    storage::SettingsPatch,
    ui::embeds,
};

/// Comandos que requieren el rol DJ cuando el servidor tiene uno configurado
const DJ_COMMANDS: &[&str] = &[
    "skip", "pause", "resume", "stop", "shuffle", "clearqueue", "filter", "volume", "loop",
];

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    if DJ_COMMANDS.contains(&command.data.name.as_str())
        && !has_dj_permission(&command, guild_id, bot).await
    {
        return respond_ephemeral(
            ctx,
            &command,
            embeds::create_error_embed("Sin permiso", "Necesitas el rol DJ para usar este comando"),
        )
        .await;
    }

    // Defer la respuesta ya que resolver y conectar puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let embed = match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, guild_id, bot).await,
        "pause" => respond_outcome(bot.player.pause(guild_id).await),
        "resume" => respond_outcome(bot.player.resume(guild_id).await),
        "skip" => respond_outcome(bot.player.skip(guild_id).await),
        "stop" => respond_outcome(bot.player.stop(guild_id).await),
        "shuffle" => respond_outcome(bot.player.shuffle(guild_id).await),
        "clearqueue" => respond_outcome(bot.player.clear_queue(guild_id).await),
        "queue" => Some(embeds::create_status_embed(&bot.player.status(guild_id).await)),
        "loop" => handle_loop(&command, guild_id, bot).await,
        "volume" => handle_volume(&command, guild_id, bot).await,
        "filter" => handle_filter(&command, guild_id, bot).await,
        "djrole" => handle_djrole(&command, guild_id, bot).await,
        _ => Some(embeds::create_error_embed("Error", "Comando no reconocido")),
    };

    match embed {
        Some(embed) => {
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
                .await?;
        }
        None => command.delete_response(&ctx.http).await?,
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
) -> Option<CreateEmbed> {
    let Some(query) = string_option(command, "query") else {
        return Some(embeds::create_error_embed("Error", "Query no proporcionado"));
    };

    // Verificar que el usuario esté en un canal de voz
    let voice_channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel_id) => channel_id,
        Err(e) => return Some(embeds::create_error_embed("Canal de voz", &e.to_string())),
    };

    respond_outcome(bot.player.play(guild_id, voice_channel_id, query).await)
}

async fn handle_loop(
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
) -> Option<CreateEmbed> {
    let mode = string_option(command, "mode").unwrap_or("none");
    match mode.parse::<LoopMode>() {
        Ok(mode) => respond_outcome(bot.player.set_loop_mode(guild_id, mode).await),
        Err(e) => Some(embeds::create_error_embed("Argumento inválido", &e)),
    }
}

async fn handle_volume(
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
) -> Option<CreateEmbed> {
    let level = integer_option(command, "level").unwrap_or(-1);
    // Fuera de rango se envía igual para que el orquestador lo rechace
    let level = u16::try_from(level).unwrap_or(u16::MAX);
    respond_outcome(bot.player.set_volume(guild_id, level).await)
}

async fn handle_filter(
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
) -> Option<CreateEmbed> {
    let name = string_option(command, "type").unwrap_or("none");
    match name.parse::<AudioFilter>() {
        Ok(filter) => respond_outcome(bot.player.set_filter(guild_id, filter).await),
        Err(e) => Some(embeds::create_error_embed("Argumento inválido", &e)),
    }
}

async fn handle_djrole(
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
) -> Option<CreateEmbed> {
    let is_manager = command
        .member
        .as_ref()
        .and_then(|member| member.permissions)
        .is_some_and(|permissions| permissions.administrator() || permissions.manage_guild());
    if !is_manager {
        return Some(embeds::create_error_embed(
            "Sin permiso",
            "Necesitas el permiso `Gestionar servidor`",
        ));
    }

    let role = role_option(command, "role");
    let patch = SettingsPatch {
        dj_role_id: Some(role.map(|role| role.get())),
        ..Default::default()
    };

    match bot.settings.set(guild_id, patch).await {
        Ok(()) => Some(match role {
            Some(role) => embeds::create_success_embed("Rol DJ", &format!("Rol DJ: <@&{}>", role)),
            None => embeds::create_success_embed(
                "Rol DJ",
                "Rol DJ eliminado, todos pueden controlar la música",
            ),
        }),
        Err(e) => {
            warn!("⚠️ No se pudo guardar el rol DJ de guild {}: {:?}", guild_id, e);
            Some(embeds::create_error_embed("Error", "No se pudo guardar la configuración"))
        }
    }
}

fn respond_outcome(result: CommandResult) -> Option<CreateEmbed> {
    match result {
        Ok(outcome) => Some(embeds::create_outcome_embed(&outcome)),
        Err(e) if e.is_silent() => {
            debug!("Error silencioso: {}", e);
            None
        }
        Err(e) => Some(embeds::create_playback_error_embed(&e)),
    }
}

// Funciones auxiliares

async fn has_dj_permission(
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
) -> bool {
    let dj_role = match bot.settings.get(guild_id).await {
        Ok(settings) => settings.dj_role_id,
        Err(e) => {
            warn!("⚠️ No se pudo leer la configuración de guild {}: {:?}", guild_id, e);
            None
        }
    };

    let Some(dj_role) = dj_role else {
        return true;
    };

    command.member.as_ref().is_some_and(|member| {
        member.roles.contains(&RoleId::new(dj_role))
            || member.permissions.is_some_and(|permissions| {
                permissions.administrator() || permissions.manage_guild()
            })
    })
}

async fn respond_ephemeral(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(true),
            ),
        )
        .await?;

    Ok(())
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn role_option(command: &CommandInteraction, name: &str) -> Option<RoleId> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_role_id())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}
