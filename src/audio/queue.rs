use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::GuildId;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use super::request::PlayRequest;

/// Result of handing a request to the guild queues.
#[derive(Debug)]
pub enum Admission {
    /// The guild was idle: the caller must start a playback run with this request.
    Start(PlayRequest),
    /// A run is active; the request waits at this 1-based position.
    Queued(usize),
    /// A run is active and its queue is full; the request was discarded.
    Dropped,
}

#[derive(Debug)]
struct GuildQueue {
    pending: VecDeque<PlayRequest>,
}

/// Process-wide map of guild → bounded FIFO of pending plays.
///
/// An entry exists exactly while a playback run is active for that guild, so
/// presence in the map is the single-flight gate. Every transition goes
/// through the map's entry lock, which makes "start or enqueue" and
/// "dequeue or retire" atomic with respect to each other.
#[derive(Debug)]
pub struct GuildQueues {
    queues: DashMap<GuildId, GuildQueue>,
    capacity: usize,
}

impl GuildQueues {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: DashMap::new(),
            capacity,
        }
    }

    /// Starts a run for an idle guild, or queues/drops behind the active one.
    pub fn admit(&self, play: PlayRequest) -> Admission {
        match self.queues.entry(play.guild_id) {
            Entry::Vacant(entry) => {
                entry.insert(GuildQueue {
                    pending: VecDeque::with_capacity(self.capacity),
                });
                Admission::Start(play)
            }
            Entry::Occupied(mut entry) => {
                let guild_id = play.guild_id;
                let queue = entry.get_mut();
                if queue.pending.len() >= self.capacity {
                    debug!(
                        "🚫 Cola llena en guild {} ({} pendientes), descartando {}",
                        guild_id,
                        queue.pending.len(),
                        play.clip.name()
                    );
                    return Admission::Dropped;
                }
                queue.pending.push_back(play);
                Admission::Queued(queue.pending.len())
            }
        }
    }

    /// Takes the next pending play, keeping the guild active.
    pub fn pop(&self, guild_id: GuildId) -> Option<PlayRequest> {
        self.queues
            .get_mut(&guild_id)
            .and_then(|mut queue| queue.pending.pop_front())
    }

    /// Takes the next pending play, or removes the guild's entry if nothing is
    /// pending. Returns `None` once the guild is idle again.
    pub fn pop_or_retire(&self, guild_id: GuildId) -> Option<PlayRequest> {
        match self.queues.entry(guild_id) {
            Entry::Occupied(mut entry) => {
                let next = entry.get_mut().pending.pop_front();
                if next.is_none() {
                    entry.remove();
                    debug!("💤 Guild {} sin reproducción activa", guild_id);
                }
                next
            }
            Entry::Vacant(_) => {
                warn!("⚠️ Guild {} ya estaba inactiva al retirar su cola", guild_id);
                None
            }
        }
    }

    /// Removes the guild's entry after a failed run, discarding pending plays.
    pub fn abandon(&self, guild_id: GuildId) -> usize {
        let discarded = self
            .queues
            .remove(&guild_id)
            .map(|(_, queue)| queue.pending.len())
            .unwrap_or(0);
        if discarded > 0 {
            info!(
                "🗑️ {} reproducciones descartadas en guild {}",
                discarded, guild_id
            );
        }
        discarded
    }

    #[cfg(test)]
    pub fn is_active(&self, guild_id: GuildId) -> bool {
        self.queues.contains_key(&guild_id)
    }

    pub fn pending(&self, guild_id: GuildId) -> usize {
        self.queues
            .get(&guild_id)
            .map(|queue| queue.pending.len())
            .unwrap_or(0)
    }

    pub fn active_guilds(&self) -> usize {
        self.queues.len()
    }
}
