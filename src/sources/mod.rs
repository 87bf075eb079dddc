pub mod direct_url;
pub mod youtube;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::ResolutionError;

pub use direct_url::DirectUrlClient;
pub use youtube::YouTubeClient;

/// Convierte lo que escribió el usuario en un track reproducible
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<TrackDescriptor, ResolutionError>;
}

/// Resolved, immutable description of a playable track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub title: String,
    /// Seconds, 0 when unknown (live streams, raw files).
    pub duration_secs: u64,
    pub thumbnail: Option<String>,
    /// Opaque locator handed to the transport.
    pub stream_url: String,
    pub page_url: String,
}

impl TrackDescriptor {
    pub fn new(title: impl Into<String>, stream_url: impl Into<String>) -> Self {
        let stream_url = stream_url.into();
        Self {
            title: title.into(),
            duration_secs: 0,
            thumbnail: None,
            page_url: stream_url.clone(),
            stream_url,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_secs = duration.as_secs();
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: String) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn with_page_url(mut self, page_url: String) -> Self {
        self.page_url = page_url;
        self
    }

    /// Duración legible (`3:07`, `1:02:03`), `en vivo` si se desconoce.
    pub fn display_duration(&self) -> String {
        if self.duration_secs == 0 {
            return "en vivo".to_string();
        }
        let hours = self.duration_secs / 3600;
        let minutes = (self.duration_secs % 3600) / 60;
        let seconds = self.duration_secs % 60;
        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{}:{:02}", minutes, seconds)
        }
    }
}

/// Resolver used by the bot: direct media URLs pass straight through,
/// everything else (YouTube links, other sites, free text) goes to yt-dlp.
pub struct YtDlpResolver {
    direct: DirectUrlClient,
    youtube: YouTubeClient,
}

impl YtDlpResolver {
    pub fn new() -> Self {
        Self {
            direct: DirectUrlClient::new(),
            youtube: YouTubeClient::new(),
        }
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<TrackDescriptor, ResolutionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolutionError::NotFound(String::new()));
        }

        if self.direct.is_valid_url(query) {
            return self.direct.describe(query);
        }

        let is_link = YouTubeClient::is_youtube_url(query)
            || query.starts_with("http://")
            || query.starts_with("https://");
        let url = if is_link {
            query.to_string()
        } else {
            self.youtube.search_first(query).await?
        };

        self.youtube.get_info(&url).await
    }
}
