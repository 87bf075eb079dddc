use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serenity::model::id::GuildId;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::{
    fs,
    sync::{mpsc, Mutex},
};
use tracing::{debug, info, warn};

use crate::audio::{effects::AudioFilter, queue::LoopMode};
use crate::error::PersistenceWarning;

/// Configuración persistida de un servidor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildSettings {
    pub volume: u8,
    pub dj_role_id: Option<u64>,
    pub loop_mode: LoopMode,
    pub filter: AudioFilter,
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self {
            volume: crate::audio::effects::DEFAULT_VOLUME,
            dj_role_id: None,
            loop_mode: LoopMode::None,
            filter: AudioFilter::None,
        }
    }
}

/// Partial update; `None` fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub volume: Option<u8>,
    pub dj_role_id: Option<Option<u64>>,
    pub loop_mode: Option<LoopMode>,
    pub filter: Option<AudioFilter>,
}

impl SettingsPatch {
    pub fn apply(&self, settings: &mut GuildSettings) {
        if let Some(volume) = self.volume {
            settings.volume = volume;
        }
        if let Some(dj_role_id) = self.dj_role_id {
            settings.dj_role_id = dj_role_id;
        }
        if let Some(loop_mode) = self.loop_mode {
            settings.loop_mode = loop_mode;
        }
        if let Some(filter) = self.filter {
            settings.filter = filter;
        }
    }
}

/// Per-guild settings persistence.
///
/// The orchestrator treats it as fire-and-forget: `get` failures fall back to
/// defaults and `set` failures are only logged.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, guild_id: GuildId) -> Result<GuildSettings>;

    async fn set(&self, guild_id: GuildId, patch: SettingsPatch) -> Result<()>;
}

/// Manager de almacenamiento basado en archivos JSON
pub struct JsonSettingsStore {
    data_dir: PathBuf,
    servers_cache: Mutex<HashMap<u64, GuildSettings>>,
    defaults: GuildSettings,
}

impl JsonSettingsStore {
    pub async fn new(data_dir: PathBuf, defaults: GuildSettings) -> Result<Self> {
        let servers_dir = data_dir.join("servers");
        fs::create_dir_all(&servers_dir)
            .await
            .with_context(|| format!("No se pudo crear {}", servers_dir.display()))?;

        info!("📁 Storage inicializado en: {}", data_dir.display());

        let store = Self {
            data_dir,
            servers_cache: Mutex::new(HashMap::new()),
            defaults,
        };

        // Cargar configuraciones existentes
        store.load_all_servers().await?;

        Ok(store)
    }

    pub async fn cached_servers(&self) -> usize {
        self.servers_cache.lock().await.len()
    }

    // Métodos privados

    async fn load_server_config(&self, guild_id: u64) -> Result<GuildSettings> {
        let file_path = self.get_server_file_path(guild_id);
        let content = fs::read_to_string(&file_path).await?;
        let config: GuildSettings = serde_json::from_str(&content)
            .with_context(|| format!("JSON inválido en {}", file_path.display()))?;
        Ok(config)
    }

    async fn save_server_config(&self, guild_id: u64, config: &GuildSettings) -> Result<()> {
        let file_path = self.get_server_file_path(guild_id);
        let content = serde_json::to_string_pretty(config)?;
        fs::write(&file_path, content)
            .await
            .with_context(|| format!("No se pudo escribir {}", file_path.display()))?;
        Ok(())
    }

    async fn load_all_servers(&self) -> Result<()> {
        let servers_dir = self.data_dir.join("servers");
        let mut files = fs::read_dir(&servers_dir).await?;
        let mut cache = self.servers_cache.lock().await;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            let Some(guild_id) = path
                .file_stem()
                .and_then(|n| n.to_str())
                .and_then(|name| name.strip_prefix("guild_"))
                .and_then(|id| id.parse::<u64>().ok())
            else {
                continue;
            };

            match self.load_server_config(guild_id).await {
                Ok(config) => {
                    cache.insert(guild_id, config);
                }
                Err(e) => {
                    warn!("Error cargando configuración para guild {}: {}", guild_id, e);
                }
            }
        }

        if !cache.is_empty() {
            info!("📂 Cargadas {} configuraciones de servidor", cache.len());
        }

        Ok(())
    }

    fn get_server_file_path(&self, guild_id: u64) -> PathBuf {
        self.data_dir.join("servers").join(format!("guild_{}.json", guild_id))
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn get(&self, guild_id: GuildId) -> Result<GuildSettings> {
        let guild_id = guild_id.get();
        let mut cache = self.servers_cache.lock().await;

        // Verificar cache primero
        if let Some(config) = cache.get(&guild_id) {
            return Ok(config.clone());
        }

        let config = match self.load_server_config(guild_id).await {
            Ok(config) => config,
            Err(e) => {
                debug!("Sin configuración guardada para guild {}: {}", guild_id, e);
                self.defaults.clone()
            }
        };
        cache.insert(guild_id, config.clone());
        Ok(config)
    }

    async fn set(&self, guild_id: GuildId, patch: SettingsPatch) -> Result<()> {
        let guild_id = guild_id.get();
        let mut cache = self.servers_cache.lock().await;

        let mut config = match cache.get(&guild_id) {
            Some(config) => config.clone(),
            None => self
                .load_server_config(guild_id)
                .await
                .unwrap_or_else(|_| self.defaults.clone()),
        };
        patch.apply(&mut config);

        // El lock se mantiene durante la escritura para no intercalar archivos
        self.save_server_config(guild_id, &config).await?;
        cache.insert(guild_id, config);

        debug!("💾 Configuración actualizada para guild {}", guild_id);
        Ok(())
    }
}

/// Fire-and-forget writes, applied one at a time in submission order.
///
/// Callers never wait on the store, and a later patch can never be
/// overwritten on disk by an earlier one still in flight.
#[derive(Clone)]
pub struct SettingsWriter {
    queue: mpsc::UnboundedSender<(GuildId, SettingsPatch)>,
}

impl SettingsWriter {
    /// Starts the writer task. It ends once every clone has been dropped and
    /// the pending patches are written.
    pub fn spawn(store: Arc<dyn SettingsStore>) -> Self {
        let (queue, mut pending) = mpsc::unbounded_channel::<(GuildId, SettingsPatch)>();

        tokio::spawn(async move {
            while let Some((guild_id, patch)) = pending.recv().await {
                if let Err(source) = store.set(guild_id, patch).await {
                    warn!("⚠️ {}", PersistenceWarning { guild_id, source });
                }
            }
            debug!("💾 Escritor de configuración finalizado");
        });

        Self { queue }
    }

    pub fn submit(&self, guild_id: GuildId, patch: SettingsPatch) {
        if self.queue.send((guild_id, patch)).is_err() {
            warn!("⚠️ Escritor de configuración cerrado, cambio de guild {} perdido", guild_id);
        }
    }
}
