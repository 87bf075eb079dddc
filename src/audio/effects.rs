use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub const MAX_VOLUME: u8 = 150;
pub const DEFAULT_VOLUME: u8 = 100;

/// Filtros de audio disponibles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFilter {
    #[default]
    None,
    BassBoost,
    Nightcore,
    Vaporwave,
    #[serde(rename = "8d")]
    EightD,
}

impl AudioFilter {
    pub const ALL: [AudioFilter; 5] = [
        AudioFilter::None,
        AudioFilter::BassBoost,
        AudioFilter::Nightcore,
        AudioFilter::Vaporwave,
        AudioFilter::EightD,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AudioFilter::None => "none",
            AudioFilter::BassBoost => "bassboost",
            AudioFilter::Nightcore => "nightcore",
            AudioFilter::Vaporwave => "vaporwave",
            AudioFilter::EightD => "8d",
        }
    }

    /// Grafo de filtros de ffmpeg (`-af`). `None` para el passthrough.
    pub fn ffmpeg_graph(&self) -> Option<&'static str> {
        match self {
            AudioFilter::None => None,
            AudioFilter::BassBoost => Some("bass=g=10,dynaudnorm=f=200"),
            AudioFilter::Nightcore => Some("aresample=48000,asetrate=48000*1.25,aresample=48000"),
            AudioFilter::Vaporwave => Some("aresample=48000,asetrate=48000*0.8,aresample=48000"),
            AudioFilter::EightD => Some("apulsator=hz=0.08"),
        }
    }
}

impl fmt::Display for AudioFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AudioFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|filter| filter.name() == wanted)
            .ok_or_else(|| format!("filtro desconocido: {}", s.trim()))
    }
}

/// Filtro activo y volumen (0–150 %) de una sesión.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSettings {
    pub filter: AudioFilter,
    pub volume: u8,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            filter: AudioFilter::None,
            volume: DEFAULT_VOLUME,
        }
    }
}

impl FilterSettings {
    pub fn validate_volume(volume: u16) -> Result<u8, String> {
        if volume > MAX_VOLUME as u16 {
            return Err(format!(
                "el volumen debe estar entre 0 y {}, se recibió {}",
                MAX_VOLUME, volume
            ));
        }
        Ok(volume as u8)
    }

    /// Ganancia lineal para el transporte (100 % = 1.0).
    pub fn gain(&self) -> f32 {
        self.volume as f32 / 100.0
    }
}
