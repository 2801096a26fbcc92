//! # Bot Module
//!
//! Discord event handling for the airhorn bot.
//!
//! This module contains:
//! - Chat command routing to the audio player
//! - Presence setup on READY
//! - Background maintenance tasks
//!
//! ## Architecture
//!
//! The bot is built around the [`AirhornBot`] struct which implements
//! Serenity's [`EventHandler`] trait. It holds the read-only clip
//! [`Catalog`] and the shared [`AudioPlayer`]; every command ends up in
//! [`AudioPlayer::submit`].

use serenity::{
    all::{ActivityData, Context, EventHandler, Message, Ready},
    async_trait,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, info};

pub mod commands;

use crate::{
    audio::{
        catalog::Catalog,
        player::{AudioPlayer, EnqueueOutcome},
    },
    stats::PlayCounters,
};

/// Main Discord event handler.
pub struct AirhornBot {
    catalog: Arc<Catalog>,
    player: Arc<AudioPlayer>,
    /// In-memory stats, when enabled
    counters: Option<Arc<PlayCounters>>,
    /// READY llega una vez por shard
    maintenance_started: AtomicBool,
}

impl AirhornBot {
    pub fn new(
        catalog: Arc<Catalog>,
        player: Arc<AudioPlayer>,
        counters: Option<Arc<PlayCounters>>,
    ) -> Self {
        Self {
            catalog,
            player,
            counters,
            maintenance_started: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl EventHandler for AirhornBot {
    /// Called when a shard is ready and connected to Discord.
    ///
    /// Sets the listening status and starts the maintenance task once per
    /// process.
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
        info!("📚 {} colecciones de sonidos disponibles", self.catalog.collections().len());

        ctx.set_activity(Some(ActivityData::listening("airhorn.wav")));

        if !self.maintenance_started.swap(true, Ordering::SeqCst) {
            let player = self.player.clone();
            let counters = self.counters.clone();
            tokio::spawn(async move {
                maintenance_tasks(player, counters).await;
            });
        }
    }

    /// Routes `!command [clip]` messages to the player.
    ///
    /// Messages from bots, direct messages and anything that is not a known
    /// command are ignored.
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let Some(command) = commands::parse(&self.catalog, &msg.content) else {
            return;
        };

        debug!(
            "💬 Comando {} de {} en guild {}",
            command.collection.prefix(),
            msg.author.id,
            guild_id
        );

        match self.player.submit(
            &*ctx.cache,
            guild_id,
            msg.author.id,
            &command.collection,
            command.clip,
        ) {
            Some(EnqueueOutcome::Dropped) => {
                debug!(
                    "🚫 Cola llena en guild {} ({} pendientes), comando ignorado",
                    guild_id,
                    self.player.pending(guild_id)
                );
            }
            Some(EnqueueOutcome::Queued(position)) => {
                debug!("⏳ Comando en cola en guild {} (posición {})", guild_id, position);
            }
            Some(EnqueueOutcome::Started(_)) | None => {}
        }
    }
}

/// Tareas periódicas: resumen de actividad cada hora
async fn maintenance_tasks(player: Arc<AudioPlayer>, counters: Option<Arc<PlayCounters>>) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600)); // Cada hora

    loop {
        interval.tick().await;

        info!("🔊 Guilds reproduciendo: {}", player.active_guilds());

        if let Some(counters) = &counters {
            info!(
                "📈 Reproducciones: {} total ({} aleatorias en {} guilds, {} forzadas en {} guilds)",
                counters.get("airhorn:total"),
                counters.get("airhorn:a:total"),
                counters.cardinality("airhorn:a:guilds"),
                counters.get("airhorn:f:total"),
                counters.cardinality("airhorn:f:guilds")
            );
        }

        info!("🧹 Tareas de mantenimiento completadas");
    }
}
