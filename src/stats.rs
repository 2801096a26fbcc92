//! # Stats Module
//!
//! Fire-and-forget play statistics.
//!
//! The playback driver never waits on statistics: each play is pushed into a
//! bounded channel with [`StatsRecorder::record`], and a background worker
//! drains that channel into a [`PlayStatsSink`]. When the channel is full the
//! record is dropped; when the sink fails the error is logged and the worker
//! keeps going.
//!
//! ## Key Layout
//!
//! [`PlayCounters`] keeps the same keys the bot has always used, where `a`
//! marks random plays and `f` forced ones:
//!
//! ```text
//! airhorn:total
//! airhorn:{a|f}:total
//! airhorn:{a|f}:sound:<clip>
//! airhorn:{a|f}:user:<user>:sound:<clip>
//! airhorn:{a|f}:guild:<guild>:sound:<clip>
//! airhorn:{a|f}:guild:<guild>:chan:<channel>:sound:<clip>
//! airhorn:{a|f}:users | guilds | channels   (sets)
//! ```

use anyhow::Result;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::audio::request::PlayRequest;

/// One play, as reported to the statistics collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayRecord {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub clip: String,
    pub forced: bool,
}

impl From<&PlayRequest> for PlayRecord {
    fn from(play: &PlayRequest) -> Self {
        Self {
            guild_id: play.guild_id,
            channel_id: play.channel_id,
            user_id: play.user_id,
            clip: play.clip.name().to_string(),
            forced: play.forced,
        }
    }
}

/// Destination of play statistics.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PlayStatsSink: Send + Sync {
    async fn record(&self, play: &PlayRecord) -> Result<()>;
}

/// Cheap, cloneable handle used by the playback driver.
#[derive(Debug, Clone)]
pub struct StatsRecorder {
    tx: Option<flume::Sender<PlayRecord>>,
}

impl StatsRecorder {
    /// A recorder that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Spawns the background worker and returns its handle.
    ///
    /// The worker ends once every recorder clone has been dropped.
    pub fn spawn(sink: Arc<dyn PlayStatsSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = flume::bounded::<PlayRecord>(capacity);

        let worker = tokio::spawn(async move {
            while let Ok(play) = rx.recv_async().await {
                if let Err(e) = sink.record(&play).await {
                    warn!(
                        "⚠️ No se pudieron registrar estadísticas de {} en guild {}: {:?}",
                        play.clip, play.guild_id, e
                    );
                }
            }
            debug!("📊 Worker de estadísticas detenido");
        });

        (Self { tx: Some(tx) }, worker)
    }

    /// Queues a record without waiting. Returns `false` if it was dropped.
    pub fn record(&self, play: PlayRecord) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };

        match tx.try_send(play) {
            Ok(()) => true,
            Err(flume::TrySendError::Full(play)) => {
                debug!("📊 Canal de estadísticas lleno, descartando {}", play.clip);
                false
            }
            Err(flume::TrySendError::Disconnected(play)) => {
                warn!("📊 Worker de estadísticas no disponible, descartando {}", play.clip);
                false
            }
        }
    }
}

/// In-memory counters and sets using the `airhorn:*` key layout.
#[derive(Debug, Default)]
pub struct PlayCounters {
    counters: DashMap<String, u64>,
    sets: DashMap<String, DashSet<String>>,
}

impl PlayCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counters.get(key).map(|value| *value).unwrap_or(0)
    }

    /// Number of distinct members in the set stored at `key`.
    pub fn cardinality(&self, key: &str) -> usize {
        self.sets.get(key).map(|set| set.len()).unwrap_or(0)
    }

    fn incr(&self, key: String) {
        *self.counters.entry(key).or_insert(0) += 1;
    }

    fn add(&self, key: String, member: String) {
        self.sets.entry(key).or_default().insert(member);
    }
}

#[async_trait]
impl PlayStatsSink for PlayCounters {
    async fn record(&self, play: &PlayRecord) -> Result<()> {
        let base = format!("airhorn:{}", if play.forced { "f" } else { "a" });
        let clip = &play.clip;

        self.incr("airhorn:total".to_string());
        self.incr(format!("{base}:total"));
        self.incr(format!("{base}:sound:{clip}"));
        self.incr(format!("{base}:user:{}:sound:{clip}", play.user_id));
        self.incr(format!("{base}:guild:{}:sound:{clip}", play.guild_id));
        self.incr(format!(
            "{base}:guild:{}:chan:{}:sound:{clip}",
            play.guild_id, play.channel_id
        ));
        self.add(format!("{base}:users"), play.user_id.to_string());
        self.add(format!("{base}:guilds"), play.guild_id.to_string());
        self.add(format!("{base}:channels"), play.channel_id.to_string());

        Ok(())
    }
}
