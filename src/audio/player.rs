use anyhow::{Context as _, Result};
use serenity::model::id::{GuildId, UserId};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{
    clip::{Clip, Collection},
    queue::{Admission, GuildQueues},
    request::{build_play, PlayRequest, SubmitError, VoicePresence},
    transport::{VoiceSession, VoiceTransport},
};
use crate::stats::{PlayRecord, StatsRecorder};

/// Pacing delays applied around every play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackTiming {
    /// Wait before the first frame, while the transport warms up.
    pub preroll: Duration,
    /// Wait after moving the session to another channel.
    pub channel_settle: Duration,
}

impl Default for PlaybackTiming {
    fn default() -> Self {
        Self {
            preroll: Duration::from_millis(32),
            channel_settle: Duration::from_millis(125),
        }
    }
}

/// What happened to a submitted play.
#[derive(Debug)]
pub enum EnqueueOutcome {
    /// The guild was idle and a new playback run was spawned.
    Started(JoinHandle<()>),
    /// Waiting behind the active run at this 1-based position.
    Queued(usize),
    /// The guild's queue was full.
    Dropped,
}

/// Per-guild clip player.
///
/// Owns the guild queues and drives at most one playback run per guild. Runs
/// for different guilds are independent tasks.
pub struct AudioPlayer {
    queues: GuildQueues,
    transport: Arc<dyn VoiceTransport>,
    stats: StatsRecorder,
    timing: PlaybackTiming,
}

impl AudioPlayer {
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        stats: StatsRecorder,
        queue_capacity: usize,
        timing: PlaybackTiming,
    ) -> Self {
        Self {
            queues: GuildQueues::new(queue_capacity),
            transport,
            stats,
            timing,
        }
    }

    /// Builds the play for one command invocation and hands it to the guild's
    /// queue.
    ///
    /// # Arguments
    ///
    /// * `presence` - Voice presence lookup used to find the requester's channel
    /// * `guild_id` - Guild the command was sent in
    /// * `user_id` - Requester
    /// * `collection` - Collection the command resolved to
    /// * `clip` - Clip explicitly named by the requester, if any
    ///
    /// # Returns
    ///
    /// `None` when no play could be built (requester not in voice, nothing to
    /// select). Those cases are logged, never surfaced as errors.
    pub fn submit(
        self: &Arc<Self>,
        presence: &dyn VoicePresence,
        guild_id: GuildId,
        user_id: UserId,
        collection: &Collection,
        clip: Option<Arc<Clip>>,
    ) -> Option<EnqueueOutcome> {
        match build_play(presence, guild_id, user_id, collection, clip) {
            Ok(play) => Some(self.enqueue(play)),
            Err(e @ SubmitError::NoVoiceChannel { .. }) => {
                warn!("🔇 No se encontró canal de voz para reproducir: {}", e);
                None
            }
            Err(e) => {
                warn!("⚠️ No se pudo preparar la reproducción: {}", e);
                None
            }
        }
    }

    /// Starts a run for an idle guild, queues behind an active one, or drops
    /// the play when the queue is full.
    pub fn enqueue(self: &Arc<Self>, play: PlayRequest) -> EnqueueOutcome {
        let guild_id = play.guild_id;
        match self.queues.admit(play) {
            Admission::Start(play) => {
                debug!(
                    "▶️ Iniciando reproducción en guild {} ({} clips)",
                    guild_id,
                    play.chain_len()
                );
                let player = Arc::clone(self);
                EnqueueOutcome::Started(tokio::spawn(async move { player.run(play).await }))
            }
            Admission::Queued(position) => {
                debug!("➕ En cola en guild {} (posición {})", guild_id, position);
                EnqueueOutcome::Queued(position)
            }
            Admission::Dropped => EnqueueOutcome::Dropped,
        }
    }

    pub fn pending(&self, guild_id: GuildId) -> usize {
        self.queues.pending(guild_id)
    }

    pub fn active_guilds(&self) -> usize {
        self.queues.active_guilds()
    }

    /// One playback run: acquire, play, chain, drain, then go idle.
    ///
    /// The session is kept across queued plays and only released when the
    /// queue is still empty after the last clip's hold delay. A play that
    /// arrives while the session is being released triggers a fresh join.
    async fn run(self: Arc<Self>, first: PlayRequest) {
        let guild_id = first.guild_id;
        let mut session: Option<Box<dyn VoiceSession>> = None;
        let mut pending = Some(first);

        while let Some(play) = pending.take() {
            let current = match session.take() {
                Some(current) => current,
                None => match self.transport.join(guild_id, play.channel_id).await {
                    Ok(joined) => {
                        info!("🔊 Conectado al canal {} en guild {}", play.channel_id, guild_id);
                        joined
                    }
                    Err(e) => {
                        error!("❌ Error al conectar al canal de voz en guild {}: {:?}", guild_id, e);
                        self.queues.abandon(guild_id);
                        return;
                    }
                },
            };
            let active = session.insert(current);

            let hold = match self.play_chain(active.as_mut(), play).await {
                Ok(hold) => hold,
                Err(e) => {
                    error!("❌ Reproducción abortada en guild {}: {:?}", guild_id, e);
                    if let Err(e) = active.disconnect().await {
                        warn!("⚠️ Error al desconectar en guild {}: {:?}", guild_id, e);
                    }
                    self.queues.abandon(guild_id);
                    return;
                }
            };

            pending = self.queues.pop(guild_id);
            if pending.is_some() {
                continue;
            }

            tokio::time::sleep(hold).await;
            pending = self.queues.pop(guild_id);
            if pending.is_some() {
                continue;
            }

            if let Some(mut idle) = session.take() {
                if let Err(e) = idle.disconnect().await {
                    warn!("⚠️ Error al desconectar en guild {}: {:?}", guild_id, e);
                }
                info!("👋 Desconectado del canal de voz en guild {}", guild_id);
            }
            pending = self.queues.pop_or_retire(guild_id);
        }
    }

    /// Plays `play` and every follow-up linked to it, back to back.
    ///
    /// Returns the hold delay of the last clip played.
    async fn play_chain(&self, session: &mut dyn VoiceSession, play: PlayRequest) -> Result<Duration> {
        let mut link = Some(play);
        let mut hold = Duration::ZERO;

        while let Some(mut play) = link.take() {
            self.play_one(session, &play).await?;
            hold = play.clip.hold();
            link = play.next.take().map(|next| *next);
        }

        Ok(hold)
    }

    async fn play_one(&self, session: &mut dyn VoiceSession, play: &PlayRequest) -> Result<()> {
        info!(
            "🎺 Reproduciendo {}/{} en guild {} (usuario {}, forzado: {})",
            play.clip.collection(),
            play.clip.name(),
            play.guild_id,
            play.user_id,
            play.forced
        );

        if session.channel_id() != play.channel_id {
            session
                .change_channel(play.channel_id)
                .await
                .with_context(|| format!("cambiando al canal {}", play.channel_id))?;
            tokio::time::sleep(self.timing.channel_settle).await;
        }

        if !play.clip.is_playable() {
            debug!("🔇 Clip {} sin audio cargado", play.clip.name());
        }

        self.stats.record(PlayRecord::from(play));

        tokio::time::sleep(self.timing.preroll).await;

        session.set_speaking(true).await.context("activando speaking")?;
        let sent = self.send_frames(session, &play.clip).await;
        // Speaking se desactiva aunque el envío haya fallado
        let stopped = session.set_speaking(false).await.context("desactivando speaking");
        if let (Err(_), Err(e)) = (&sent, &stopped) {
            warn!("⚠️ Error al desactivar speaking en guild {}: {:?}", play.guild_id, e);
        }
        sent.and(stopped)
    }

    async fn send_frames(&self, session: &mut dyn VoiceSession, clip: &Clip) -> Result<()> {
        for (index, frame) in clip.frames().iter().enumerate() {
            session
                .send_frame(frame.clone())
                .await
                .with_context(|| format!("enviando frame {} de {}", index, clip.name()))?;
        }
        Ok(())
    }
}
