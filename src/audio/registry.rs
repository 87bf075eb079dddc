use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::debug;

use super::session::SessionHandle;

/// Sessions by guild. At most one live session per guild.
#[derive(Clone, Default)]
pub(crate) struct SessionRegistry {
    sessions: Arc<DashMap<GuildId, SessionHandle>>,
    next_instance: Arc<AtomicU64>,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the live session for `guild_id`, spawning one with `spawn` if
    /// there is none. Concurrent callers for the same guild get the same
    /// handle; `spawn` runs at most once per created session.
    pub(crate) fn get_or_create<F>(&self, guild_id: GuildId, spawn: F) -> SessionHandle
    where
        F: FnOnce(u64) -> SessionHandle,
    {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                let instance = self.next_instance.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("📝 Nueva sesión {} para guild {}", instance, guild_id);
                spawn(instance)
            })
            .clone()
    }

    pub(crate) fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions.get(&guild_id).map(|entry| entry.clone())
    }

    /// Removes the entry only if it still belongs to `instance`, so a retiring
    /// session never evicts its successor.
    pub(crate) fn remove_instance(&self, guild_id: GuildId, instance: u64) -> bool {
        self.sessions
            .remove_if(&guild_id, |_, handle| handle.instance == instance)
            .is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }

    pub(crate) fn guilds(&self) -> Vec<GuildId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }
}
