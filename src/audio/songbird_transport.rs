use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use serde::Serialize;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{AudioStream, Input, LiveInput},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{io::Cursor, sync::Arc, time::Duration};
use symphonia::core::io::MediaSource;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::transport::{VoiceSession, VoiceTransport};

/// Duration of one 20ms Opus frame at 48kHz.
const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Extra time allowed for a clip to finish after its nominal length.
const PLAYBACK_GRACE: Duration = Duration::from_secs(5);

/// [`VoiceTransport`] backed by songbird's gateway and driver.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Box<dyn VoiceSession>> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| anyhow!("Error al unirse al canal {}: {:?}", channel_id, e))?;

        Ok(Box::new(SongbirdSession {
            manager: self.manager.clone(),
            call,
            guild_id,
            channel_id,
            speaking: None,
        }))
    }
}

/// One songbird call.
///
/// Frames sent while speaking are buffered and handed to the driver as a
/// single DCA stream when speaking stops, so the clip plays without gaps.
/// Ending a speaking run waits until the driver has finished the track.
struct SongbirdSession {
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    guild_id: GuildId,
    channel_id: ChannelId,
    speaking: Option<Vec<Bytes>>,
}

impl SongbirdSession {
    async fn play_frames(&self, frames: Vec<Bytes>) -> Result<()> {
        if frames.is_empty() {
            return Ok(());
        }

        let expected = playback_deadline(frames.len());
        let stream = dca_stream(&frames)?;
        let source: Box<dyn MediaSource> = Box::new(Cursor::new(stream));
        let input = Input::Live(
            LiveInput::Raw(AudioStream {
                input: source,
                hint: None,
            }),
            None,
        );

        let (ended, errored, rx) = TrackDone::pair(self.guild_id);

        {
            let mut call = self.call.lock().await;
            let track = call.play_input(input);
            track
                .add_event(Event::Track(TrackEvent::End), ended)
                .map_err(|e| anyhow!("Error registrando fin de pista: {:?}", e))?;
            track
                .add_event(Event::Track(TrackEvent::Error), errored)
                .map_err(|e| anyhow!("Error registrando error de pista: {:?}", e))?;
        }

        match tokio::time::timeout(expected, rx).await {
            Ok(received) => track_outcome(self.guild_id, received.ok()),
            Err(_) => Err(anyhow!(
                "la pista no terminó tras {:?} en guild {}",
                expected,
                self.guild_id
            )),
        }
    }
}

#[async_trait]
impl VoiceSession for SongbirdSession {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn change_channel(&mut self, channel_id: ChannelId) -> Result<()> {
        self.call = self
            .manager
            .join(self.guild_id, channel_id)
            .await
            .map_err(|e| anyhow!("Error al cambiar al canal {}: {:?}", channel_id, e))?;
        self.channel_id = channel_id;
        Ok(())
    }

    async fn set_speaking(&mut self, speaking: bool) -> Result<()> {
        match (speaking, self.speaking.take()) {
            (true, previous) => {
                if previous.is_some() {
                    warn!("⚠️ Speaking ya estaba activo en guild {}", self.guild_id);
                }
                self.speaking = Some(Vec::new());
                Ok(())
            }
            (false, Some(frames)) => {
                debug!("🎶 Enviando {} frames en guild {}", frames.len(), self.guild_id);
                self.play_frames(frames).await
            }
            (false, None) => Ok(()),
        }
    }

    async fn send_frame(&mut self, frame: Bytes) -> Result<()> {
        self.speaking
            .as_mut()
            .ok_or_else(|| anyhow!("frame enviado sin speaking activo en guild {}", self.guild_id))?
            .push(frame);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.speaking = None;
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| anyhow!("Error al salir del canal de voz: {:?}", e))
    }
}

/// Reports how a track finished: `true` on End, `false` on Error.
///
/// The End and Error handlers share one sender, so only the first event is
/// delivered.
struct TrackDone {
    guild_id: GuildId,
    ok: bool,
    tx: Arc<Mutex<Option<oneshot::Sender<bool>>>>,
}

impl TrackDone {
    fn pair(guild_id: GuildId) -> (Self, Self, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let ended = Self {
            guild_id,
            ok: true,
            tx: tx.clone(),
        };
        let errored = Self {
            guild_id,
            ok: false,
            tx,
        };
        (ended, errored, rx)
    }

    fn notify(&self) {
        if let Some(tx) = self.tx.lock().take() {
            let _ = tx.send(self.ok);
        }
    }
}

#[async_trait]
impl VoiceEventHandler for TrackDone {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _handle) in *tracks {
                if self.ok {
                    debug!("🎵 Pista finalizada en guild {}: {:?}", self.guild_id, state.playing);
                } else {
                    warn!("❌ Error en pista en guild {}: {:?}", self.guild_id, state.playing);
                }
            }
        }
        self.notify();
        None
    }
}

/// Maps the track notification to the session result.
fn track_outcome(guild_id: GuildId, ended: Option<bool>) -> Result<()> {
    match ended {
        Some(true) => Ok(()),
        Some(false) => Err(anyhow!("la pista falló durante la reproducción en guild {}", guild_id)),
        None => Err(anyhow!("la pista terminó sin notificar en guild {}", guild_id)),
    }
}

/// Nominal clip length plus grace, saturating for very long clips.
fn playback_deadline(frames: usize) -> Duration {
    FRAME_DURATION
        .saturating_mul(u32::try_from(frames).unwrap_or(u32::MAX))
        .saturating_add(PLAYBACK_GRACE)
}

#[derive(Debug, Serialize)]
struct DcaMetadata {
    dca: DcaInfo,
    opus: OpusInfo,
}

#[derive(Debug, Serialize)]
struct DcaInfo {
    version: u64,
    tool: DcaTool,
}

#[derive(Debug, Serialize)]
struct DcaTool {
    name: &'static str,
    version: &'static str,
    url: Option<String>,
    author: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpusInfo {
    mode: &'static str,
    sample_rate: u32,
    frame_size: u64,
    abr: Option<u64>,
    vbr: bool,
    channels: u8,
}

impl Default for DcaMetadata {
    fn default() -> Self {
        Self {
            dca: DcaInfo {
                version: 1,
                tool: DcaTool {
                    name: env!("CARGO_PKG_NAME"),
                    version: env!("CARGO_PKG_VERSION"),
                    url: None,
                    author: None,
                },
            },
            opus: OpusInfo {
                mode: "voip",
                sample_rate: 48_000,
                frame_size: 960, // 20ms @ 48kHz
                abr: None,
                vbr: true,
                channels: 2,
            },
        }
    }
}

/// Wraps raw Opus frames in a DCA1 container the driver can pass through.
fn dca_stream(frames: &[Bytes]) -> Result<Bytes> {
    let metadata = serde_json::to_vec(&DcaMetadata::default())?;

    let payload: usize = frames.iter().map(|frame| frame.len() + 2).sum();
    let mut buf = BytesMut::with_capacity(8 + metadata.len() + payload);
    buf.put_slice(b"DCA1");
    buf.put_i32_le(i32::try_from(metadata.len())?);
    buf.put_slice(&metadata);

    for frame in frames {
        let len = i16::try_from(frame.len())
            .with_context(|| format!("frame de {} bytes demasiado grande", frame.len()))?;
        buf.put_i16_le(len);
        buf.put_slice(frame);
    }

    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clip::decode_frames;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dca_stream_layout() {
        let frames = vec![Bytes::from_static(&[1, 2, 3]), Bytes::from_static(&[4])];
        let stream = dca_stream(&frames).unwrap();

        assert_eq!(&stream[..4], b"DCA1");
        let meta_len = i32::from_le_bytes(stream[4..8].try_into().unwrap()) as usize;
        let metadata: serde_json::Value = serde_json::from_slice(&stream[8..8 + meta_len]).unwrap();
        assert_eq!(metadata["opus"]["sample_rate"], 48000);
        assert_eq!(metadata["opus"]["channels"], 2);
        assert_eq!(metadata["dca"]["version"], 1);

        // El cuerpo usa el mismo framing que los clips en disco
        let body = stream.slice(8 + meta_len..);
        assert_eq!(decode_frames(body).unwrap(), frames);
    }

    #[test]
    fn test_dca_stream_rejects_oversized_frame() {
        let frames = vec![Bytes::from(vec![0u8; 40_000])];
        assert!(dca_stream(&frames).is_err());
    }

    const GUILD: GuildId = GuildId::new(7);

    #[tokio::test]
    async fn test_track_error_fails_playback() {
        let (ended, errored, rx) = TrackDone::pair(GUILD);

        errored.notify();
        // Solo cuenta el primer evento
        ended.notify();

        let received = rx.await.ok();
        assert_eq!(received, Some(false));
        assert!(track_outcome(GUILD, received).is_err());
    }

    #[tokio::test]
    async fn test_track_end_completes_playback() {
        let (ended, _errored, rx) = TrackDone::pair(GUILD);
        ended.notify();

        assert!(track_outcome(GUILD, rx.await.ok()).is_ok());
    }

    #[tokio::test]
    async fn test_dropped_notifier_fails_playback() {
        let (ended, errored, rx) = TrackDone::pair(GUILD);
        drop((ended, errored));

        assert!(track_outcome(GUILD, rx.await.ok()).is_err());
    }

    #[test]
    fn test_playback_deadline_saturates() {
        assert_eq!(playback_deadline(0), PLAYBACK_GRACE);
        assert_eq!(
            playback_deadline(50),
            Duration::from_secs(1) + PLAYBACK_GRACE
        );
        // 2^32 frames no vuelve a cero
        let huge = usize::try_from(1u64 << 32).unwrap_or(usize::MAX);
        assert!(playback_deadline(huge) > playback_deadline(50));
        assert_eq!(playback_deadline(usize::MAX), playback_deadline(huge));
    }
}
