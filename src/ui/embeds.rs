use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::{
    audio::{queue::LoopMode, CommandOutcome, PlayerState, SessionStatus},
    error::PlaybackError,
    sources::TrackDescriptor,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Music Maniac";

/// Máximo de entradas de la cola que se muestran
const QUEUE_PREVIEW: usize = 10;

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &TrackDescriptor) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", track.display_duration(), true)
        .url(&track.page_url);

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    standard(embed)
}

/// Crea un embed para mostrar el estado de la sesión y su cola
pub fn create_status_embed(status: &SessionStatus) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if status.state == PlayerState::Disconnected {
        return standard(
            embed
                .description("😴 **No hay nada sonando**\n\n💡 Usa `/play <canción>` para agregar música")
                .color(colors::NEUTRAL_GRAY),
        );
    }

    if let Some(current) = &status.current {
        let icon = match status.loop_mode {
            LoopMode::Song => "🔂",
            LoopMode::Queue => "🔁",
            LoopMode::None => "▶️",
        };
        embed = embed.field(
            format!("{} {}", icon, capitalize(&status.state.to_string())),
            format!("**{}** `[{}]`", current.title, current.display_duration()),
            false,
        );
    }

    if let Some(loading) = &status.loading {
        embed = embed.field("⏳ Cargando", loading.as_str(), false);
    }

    if status.queue.is_empty() {
        embed = embed.field("Próximas canciones", "La cola está vacía", false);
    } else {
        let mut description = String::new();
        for (i, reference) in status.queue.iter().take(QUEUE_PREVIEW).enumerate() {
            description.push_str(&format!("**{}**. {}\n", i + 1, reference));
        }
        if status.queue.len() > QUEUE_PREVIEW {
            description.push_str(&format!("… y {} más", status.queue.len() - QUEUE_PREVIEW));
        }
        embed = embed.field("Próximas canciones", description, false);
    }

    let info = format!(
        "**Total:** {} en cola • **Volumen:** {}% • **Filtro:** {} • **Repetir:** {}",
        status.queue.len(),
        status.volume,
        status.filter,
        status.loop_mode
    );

    standard(embed.field("Información", info, false))
}

/// Embed de respuesta para un comando exitoso
pub fn create_outcome_embed(outcome: &CommandOutcome) -> CreateEmbed {
    match outcome {
        CommandOutcome::Started(track) => create_now_playing_embed(track),
        CommandOutcome::Queued { position } => create_success_embed(
            "Agregado a la cola",
            &format!("Posición **#{}** en la cola", position),
        ),
        CommandOutcome::Skipped { next: Some(track) } => {
            create_now_playing_embed(track).title("⏭️ Saltado, ahora suena")
        }
        CommandOutcome::Skipped { next: None } => {
            create_info_embed("Saltado", "La cola terminó, usa `/play` para seguir")
        }
        CommandOutcome::Paused => create_success_embed("Pausado", "⏸️ Reproducción en pausa"),
        CommandOutcome::Resumed => create_success_embed("Reanudado", "▶️ Reproducción reanudada"),
        CommandOutcome::Stopped => {
            create_success_embed("Detenido", "⏹️ Cola limpiada y bot desconectado")
        }
        CommandOutcome::Shuffled { count } => {
            create_success_embed("Mezclado", &format!("🔀 {} canciones mezcladas", count))
        }
        CommandOutcome::Cleared { removed } => {
            create_success_embed("Cola limpiada", &format!("🗑️ {} canciones eliminadas", removed))
        }
        CommandOutcome::FilterSet(filter) => create_success_embed(
            "Filtro aplicado",
            &format!("🎛️ Filtro **{}** activo desde la próxima canción", filter),
        ),
        CommandOutcome::VolumeSet(volume) => create_volume_embed(*volume),
        CommandOutcome::LoopModeSet(mode) => {
            create_success_embed("Repetición", &format!("🔁 Modo de repetición: **{}**", mode))
        }
        CommandOutcome::Status(status) => create_status_embed(status),
    }
}

/// Embed para un error de comando
pub fn create_playback_error_embed(error: &PlaybackError) -> CreateEmbed {
    let title = match error {
        PlaybackError::Resolution(_) => "No se pudo cargar la canción",
        PlaybackError::Transport(_) => "Error de conexión de voz",
        PlaybackError::InvalidState { .. } => "Comando no disponible",
        PlaybackError::InvalidArgument(_) => "Argumento inválido",
        PlaybackError::ConcurrencyStale | PlaybackError::SessionClosed => "Sesión cerrada",
    };
    create_error_embed(title, &error.to_string())
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    standard(
        CreateEmbed::default()
            .title(format!("❌ {}", title))
            .description(description)
            .color(colors::ERROR_RED),
    )
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    standard(
        CreateEmbed::default()
            .title(format!("✅ {}", title))
            .description(description)
            .color(colors::SUCCESS_GREEN),
    )
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    standard(
        CreateEmbed::default()
            .title(format!("ℹ️ {}", title))
            .description(description)
            .color(colors::INFO_BLUE),
    )
}

pub fn create_volume_embed(volume: u8) -> CreateEmbed {
    let icon = match volume {
        0 => "🔇",
        1..=50 => "🔉",
        _ => "🔊",
    };
    standard(
        CreateEmbed::default()
            .title(format!("{} Volumen", icon))
            .description(format!("{} **{}%**", create_volume_bar(volume), volume))
            .color(colors::MUSIC_PURPLE),
    )
}

fn create_volume_bar(volume: u8) -> String {
    let filled = (volume as usize * 10 / crate::audio::effects::MAX_VOLUME as usize).min(10);
    format!("{}{}", "▰".repeat(filled), "▱".repeat(10 - filled))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn standard(embed: CreateEmbed) -> CreateEmbed {
    embed
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}
