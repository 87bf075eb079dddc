use async_process::Command;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::TrackDescriptor;
use crate::error::ResolutionError;

const YT_RESULTS: &str = "https://www.youtube.com/results?search_query=";
const YT_WATCH: &str = "https://www.youtube.com/watch?v=";
const YTDLP_TIMEOUT: Duration = Duration::from_secs(30);

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
}

/// Cliente para búsqueda en YouTube y extracción con yt-dlp
pub struct YouTubeClient {
    http: reqwest::Client,
    rate_limiter: Semaphore,
}

impl YouTubeClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            // Limitar procesos concurrentes de yt-dlp
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Busca en la página de resultados y devuelve la URL del primer video
    pub async fn search_first(&self, query: &str) -> Result<String, ResolutionError> {
        info!("🔍 Buscando en YouTube: {}", query);

        let url = format!("{}{}", YT_RESULTS, urlencoding::encode(query));
        let html = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ResolutionError::NetworkFailure(e.to_string()))?
            .text()
            .await
            .map_err(|e| ResolutionError::NetworkFailure(e.to_string()))?;

        let video_id = Self::first_video_id(&html)
            .ok_or_else(|| ResolutionError::NotFound(query.to_string()))?;
        debug!("🎯 Primer resultado para '{}': {}", query, video_id);

        Ok(format!("{}{}", YT_WATCH, video_id))
    }

    /// Obtiene metadata y URL de stream de un video con `yt-dlp -J`
    pub async fn get_info(&self, url: &str) -> Result<TrackDescriptor, ResolutionError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolutionError::NetworkFailure(e.to_string()))?;

        debug!("📊 Obteniendo info de: {}", url);

        let mut command = Command::new("yt-dlp");
        command.args([
            "--no-playlist",
            "--dump-single-json",
            "--format",
            "bestaudio/best",
            "--no-warnings",
            url,
        ]);

        let output = match tokio::time::timeout(YTDLP_TIMEOUT, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("❌ No se pudo ejecutar yt-dlp: {}", e);
                return Err(ResolutionError::Unsupported(format!("yt-dlp no disponible: {}", e)));
            }
            Err(_) => {
                warn!("⏰ Timeout de yt-dlp para {}", url);
                return Err(ResolutionError::NetworkFailure("timeout de yt-dlp".to_string()));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::classify_failure(url, &stderr));
        }

        let info: YtDlpInfo = serde_json::from_slice(&output.stdout).map_err(|e| {
            ResolutionError::Unsupported(format!("respuesta inválida de yt-dlp: {}", e))
        })?;

        Self::info_to_descriptor(url, info)
    }

    /// Verifica si una URL es de YouTube (incluye shorts y music)
    pub fn is_youtube_url(url: &str) -> bool {
        Regex::new(
            r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?v=|embed/|v/|shorts/)|youtu\.be/|music\.youtube\.com/)",
        )
        .map(|youtube_regex| youtube_regex.is_match(url))
        .unwrap_or(false)
    }

    fn first_video_id(html: &str) -> Option<String> {
        let video_regex = Regex::new(r"/watch\?v=([a-zA-Z0-9_-]{11})").ok()?;
        video_regex
            .captures(html)
            .and_then(|captures| captures.get(1))
            .map(|id| id.as_str().to_string())
    }

    fn classify_failure(url: &str, stderr: &str) -> ResolutionError {
        let lowered = stderr.to_lowercase();
        if lowered.contains("unsupported url") {
            ResolutionError::Unsupported(url.to_string())
        } else if lowered.contains("unavailable")
            || lowered.contains("not available")
            || lowered.contains("404")
            || lowered.contains("private video")
        {
            ResolutionError::NotFound(url.to_string())
        } else {
            ResolutionError::NetworkFailure(stderr.trim().to_string())
        }
    }

    fn info_to_descriptor(url: &str, info: YtDlpInfo) -> Result<TrackDescriptor, ResolutionError> {
        let stream_url = info
            .url
            .ok_or_else(|| ResolutionError::Unsupported(format!("sin stream de audio: {}", url)))?;

        let title = info.title.unwrap_or_else(|| "Unknown".to_string());
        let mut track = TrackDescriptor::new(title, stream_url)
            .with_page_url(info.webpage_url.unwrap_or_else(|| url.to_string()));

        if let Some(duration) = info.duration.filter(|d| d.is_finite() && *d > 0.0) {
            track = track.with_duration(Duration::from_secs_f64(duration));
        }
        if let Some(thumbnail) = info.thumbnail {
            track = track.with_thumbnail(thumbnail);
        }

        Ok(track)
    }
}

impl Default for YouTubeClient {
    fn default() -> Self {
        Self::new()
    }
}
