//! Idle-leave policy.
//!
//! The supervisor itself never touches a session: it only sends
//! [`SessionMessage::IdleTick`] into the session mailbox at a fixed period.
//! The session then asks [`IdlePolicy::evaluate`] whether it should leave,
//! using the occupancy it just polled from its connection.

use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{session::SessionMessage, transport::ChannelOccupancy, PlayerState};

pub const DEFAULT_EMPTY_CHANNEL_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_NO_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdlePolicy {
    pub empty_channel_timeout: Duration,
    pub no_command_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for IdlePolicy {
    fn default() -> Self {
        Self {
            empty_channel_timeout: DEFAULT_EMPTY_CHANNEL_TIMEOUT,
            no_command_timeout: DEFAULT_NO_COMMAND_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleVerdict {
    Stay,
    LeaveEmptyChannel,
    LeaveNoCommand,
}

/// Per-session timer state; recomputed on every tick, never persisted.
#[derive(Debug, Clone, Copy)]
pub struct IdleClock {
    pub last_command: Instant,
    pub empty_since: Option<Instant>,
}

impl IdleClock {
    pub fn new(now: Instant) -> Self {
        Self {
            last_command: now,
            empty_since: None,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_command = now;
    }
}

impl IdlePolicy {
    pub fn evaluate(
        &self,
        clock: &mut IdleClock,
        now: Instant,
        occupancy: ChannelOccupancy,
        state: PlayerState,
    ) -> IdleVerdict {
        if occupancy.self_only {
            let since = *clock.empty_since.get_or_insert(now);
            if now.duration_since(since) >= self.empty_channel_timeout {
                return IdleVerdict::LeaveEmptyChannel;
            }
        } else {
            clock.empty_since = None;
        }

        if state != PlayerState::Playing
            && now.duration_since(clock.last_command) >= self.no_command_timeout
        {
            return IdleVerdict::LeaveNoCommand;
        }

        IdleVerdict::Stay
    }
}

/// Spawns the ticker for one session. Stops when `cancel` fires or the
/// session mailbox is gone.
pub(crate) fn spawn_supervisor(
    period: Duration,
    mailbox: mpsc::UnboundedSender<SessionMessage>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if mailbox.send(SessionMessage::IdleTick).is_err() {
                        break;
                    }
                }
            }
        }

        debug!("⏲️ Supervisor de inactividad finalizado");
    })
}
