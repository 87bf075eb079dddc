use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

use crate::audio::effects::{AudioFilter, MAX_VOLUME};

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context, enable_filters: bool) -> Result<()> {
    for command in all_commands(enable_filters) {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(
    ctx: &Context,
    guild_id: GuildId,
    enable_filters: bool,
) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands(enable_filters)).await?;

    Ok(())
}

fn all_commands(enable_filters: bool) -> Vec<CreateCommand> {
    let mut commands = vec![
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        queue_command(),
        shuffle_command(),
        loop_command(),
        clear_command(),
        volume_command(),
        djrole_command(),
    ];
    if enable_filters {
        commands.push(filter_command());
    }
    commands
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o la agrega a la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

// Comandos de control

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción, limpia la cola y desconecta")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Muestra la canción actual y la cola")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla las canciones en cola")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Configura el modo de repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Modo de repetición")
                .add_string_choice("Desactivar", "none")
                .add_string_choice("Canción", "song")
                .add_string_choice("Cola", "queue")
                .required(true),
        )
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clearqueue").description("Limpia la cola de reproducción")
}

// Comandos de audio

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Ajusta el volumen de reproducción")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "level",
                format!("Nivel de volumen (0-{})", MAX_VOLUME),
            )
            .min_int_value(0)
            .max_int_value(MAX_VOLUME as u64)
            .required(true),
        )
}

fn filter_command() -> CreateCommand {
    let mut option = CreateCommandOption::new(CommandOptionType::String, "type", "Filtro de audio")
        .required(true);
    for filter in AudioFilter::ALL {
        option = option.add_string_choice(filter_label(filter), filter.name());
    }

    CreateCommand::new("filter")
        .description("Aplica un filtro de audio desde la próxima canción")
        .add_option(option)
}

fn filter_label(filter: AudioFilter) -> &'static str {
    match filter {
        AudioFilter::None => "Ninguno",
        AudioFilter::BassBoost => "Bass Boost",
        AudioFilter::Nightcore => "Nightcore",
        AudioFilter::Vaporwave => "Vaporwave",
        AudioFilter::EightD => "8D Audio",
    }
}

// Administración

fn djrole_command() -> CreateCommand {
    CreateCommand::new("djrole")
        .description("Define el rol DJ requerido para controlar la música")
        .add_option(CreateCommandOption::new(
            CommandOptionType::Role,
            "role",
            "Rol DJ (vacío para quitarlo)",
        ))
}
