use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serenity::model::id::{ChannelId, GuildId};

/// Opens voice sessions. Implemented over songbird in production.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Box<dyn VoiceSession>>;
}

/// An open audio transport to one guild.
///
/// Owned by exactly one playback run at a time.
#[async_trait]
pub trait VoiceSession: Send {
    fn channel_id(&self) -> ChannelId;

    async fn change_channel(&mut self, channel_id: ChannelId) -> Result<()>;

    async fn set_speaking(&mut self, speaking: bool) -> Result<()>;

    async fn send_frame(&mut self, frame: Bytes) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;
}
