use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fmt, str::FromStr};
use tracing::{debug, info};

/// Query o URL tal como la envió el usuario, sin resolver.
pub type TrackRef = String;

pub const DEFAULT_MAX_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    #[default]
    None,
    Song,
    Queue,
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopMode::None => "none",
            LoopMode::Song => "song",
            LoopMode::Queue => "queue",
        };
        f.write_str(name)
    }
}

impl FromStr for LoopMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" => Ok(LoopMode::None),
            "song" | "track" => Ok(LoopMode::Song),
            "queue" => Ok(LoopMode::Queue),
            other => Err(format!("modo de repetición desconocido: {}", other)),
        }
    }
}

/// Pending tracks of one session plus a bounded ring of what already played.
///
/// Order is strictly FIFO; only [`TrackQueue::shuffle`] permutes the pending
/// entries, and it does so once. The history ring exists for `loop=queue`:
/// when the queue runs dry, [`TrackQueue::rewind`] moves the consumed sequence
/// back to the front in its original order.
#[derive(Debug)]
pub struct TrackQueue {
    items: VecDeque<TrackRef>,
    history: VecDeque<TrackRef>,
    max_history: usize,
}

impl Default for TrackQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl TrackQueue {
    pub fn new(max_history: usize) -> Self {
        Self {
            items: VecDeque::new(),
            history: VecDeque::new(),
            max_history,
        }
    }

    /// Agrega un track al final. Devuelve su posición (1 = siguiente).
    pub fn enqueue(&mut self, reference: TrackRef) -> usize {
        debug!("➕ Agregado a la cola: {}", reference);
        self.items.push_back(reference);
        self.items.len()
    }

    pub fn dequeue_front(&mut self) -> Option<TrackRef> {
        let next = self.items.pop_front();
        match &next {
            Some(reference) => debug!("➡️ Siguiente en cola (FIFO): {}", reference),
            None => debug!("📭 Cola vacía, no hay siguiente track"),
        }
        next
    }

    pub fn peek_front(&self) -> Option<&TrackRef> {
        self.items.front()
    }

    /// Mezcla una sola vez las entradas pendientes.
    pub fn shuffle(&mut self) -> usize {
        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Cola mezclada ({} canciones)", self.items.len());
        self.items.len()
    }

    /// Vacía las entradas pendientes. Devuelve cuántas se eliminaron.
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        info!("🗑️ Cola limpiada: {} tracks removidos", removed);
        removed
    }

    /// Vacía pendientes e historial.
    pub fn reset(&mut self) -> usize {
        self.history.clear();
        self.clear()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn snapshot(&self) -> Vec<TrackRef> {
        self.items.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn record_played(&mut self, reference: TrackRef) {
        if self.max_history == 0 {
            return;
        }
        self.history.push_back(reference);
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    /// Moves the played sequence back in front of any pending entries.
    /// Returns how many entries were restored.
    pub fn rewind(&mut self) -> usize {
        let restored = self.history.len();
        for reference in self.history.drain(..).rev() {
            self.items.push_front(reference);
        }
        if restored > 0 {
            info!("🔁 Cola reiniciada desde el historial: {} tracks", restored);
        }
        restored
    }
}
