use url::Url;

use super::TrackDescriptor;
use crate::error::ResolutionError;

const AUDIO_EXTENSIONS: [&str; 6] = [".mp3", ".wav", ".ogg", ".flac", ".m4a", ".opus"];

/// Cliente para URLs directas a archivos de audio
pub struct DirectUrlClient;

impl DirectUrlClient {
    pub fn new() -> Self {
        Self
    }

    /// Solo HTTP/HTTPS cuyo path termina en una extensión de audio.
    pub fn is_valid_url(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }

        let path = parsed.path().to_lowercase();
        AUDIO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }

    /// Arma el descriptor sin red: el título sale del nombre del archivo.
    pub fn describe(&self, url: &str) -> Result<TrackDescriptor, ResolutionError> {
        let parsed = Url::parse(url).map_err(|e| ResolutionError::Unsupported(e.to_string()))?;

        let file_name = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .unwrap_or("audio");
        let decoded = urlencoding::decode(file_name)
            .map(|name| name.into_owned())
            .unwrap_or_else(|_| file_name.to_string());
        let title = match decoded.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => decoded,
        };

        Ok(TrackDescriptor::new(title, url))
    }
}

impl Default for DirectUrlClient {
    fn default() -> Self {
        Self::new()
    }
}
