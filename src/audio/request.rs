use serenity::{
    cache::Cache,
    model::id::{ChannelId, GuildId, UserId},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[cfg(test)]
use mockall::automock;

use super::clip::{Clip, Collection};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("user {user_id} is not in a voice channel of guild {guild_id}")]
    NoVoiceChannel { guild_id: GuildId, user_id: UserId },

    #[error("collection {prefix} has no selectable clip")]
    EmptyCollection { prefix: String },
}

/// Looks up which voice channel a user currently sits in.
#[cfg_attr(test, automock)]
pub trait VoicePresence: Send + Sync {
    fn voice_channel(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId>;
}

impl VoicePresence for Cache {
    fn voice_channel(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        let guild = self.guild(guild_id)?;
        guild
            .voice_states
            .get(&user_id)
            .and_then(|state| state.channel_id)
    }
}

/// A single use of a sound command, played exactly once.
#[derive(Debug)]
pub struct PlayRequest {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub clip: Arc<Clip>,
    /// The user named the clip instead of letting the weighted draw pick it.
    pub forced: bool,
    /// Played right after this one, on the same session.
    pub next: Option<Box<PlayRequest>>,
}

impl PlayRequest {
    /// Number of plays in this request's chain, itself included.
    pub fn chain_len(&self) -> usize {
        std::iter::successors(Some(self), |play| play.next.as_deref()).count()
    }
}

/// Builds the (possibly chained) request for one command invocation.
///
/// The follow-up of a chained collection copies the parent's guild, channel,
/// user and `forced` flag, but its clip is always a fresh weighted draw from
/// the chain target.
pub fn build_play(
    presence: &dyn VoicePresence,
    guild_id: GuildId,
    user_id: UserId,
    collection: &Collection,
    clip: Option<Arc<Clip>>,
) -> Result<PlayRequest, SubmitError> {
    let channel_id = presence
        .voice_channel(guild_id, user_id)
        .ok_or(SubmitError::NoVoiceChannel { guild_id, user_id })?;

    let (clip, forced) = match clip {
        Some(clip) => (clip, true),
        None => {
            let clip = collection
                .random()
                .ok_or_else(|| SubmitError::EmptyCollection {
                    prefix: collection.prefix().to_string(),
                })?;
            (clip, false)
        }
    };

    let next = collection.chain_with().and_then(|target| match target.random() {
        Some(clip) => Some(Box::new(PlayRequest {
            guild_id,
            channel_id,
            user_id,
            clip,
            forced,
            next: None,
        })),
        None => {
            // La cadena se omite, el clip principal se reproduce igual
            warn!(
                "⚠️ Colección encadenada {} sin clips seleccionables",
                target.prefix()
            );
            None
        }
    });

    Ok(PlayRequest {
        guild_id,
        channel_id,
        user_id,
        clip,
        forced,
        next,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clip::tests::collection;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    const GUILD: GuildId = GuildId::new(1);
    const USER: UserId = UserId::new(2);
    const CHANNEL: ChannelId = ChannelId::new(3);

    fn present() -> MockVoicePresence {
        let mut presence = MockVoicePresence::new();
        presence
            .expect_voice_channel()
            .with(eq(GUILD), eq(USER))
            .return_const(Some(CHANNEL));
        presence
    }

    #[test]
    fn test_random_play() {
        let coll = collection("airhorn", &[("default", 1000)]);
        let play = build_play(&present(), GUILD, USER, &coll, None).unwrap();

        assert_eq!(play.channel_id, CHANNEL);
        assert_eq!(play.clip.name(), "default");
        assert!(!play.forced);
        assert!(play.next.is_none());
        assert_eq!(play.chain_len(), 1);
    }

    #[test]
    fn test_explicit_clip_is_forced() {
        let coll = collection("airhorn", &[("default", 1000), ("truck", 10)]);
        let truck = coll.clip("truck").cloned();

        let play = build_play(&present(), GUILD, USER, &coll, truck).unwrap();
        assert_eq!(play.clip.name(), "truck");
        assert!(play.forced);
    }

    #[test]
    fn test_no_voice_channel() {
        let mut presence = MockVoicePresence::new();
        presence.expect_voice_channel().return_const(None);

        let coll = collection("airhorn", &[("default", 1000)]);
        let err = build_play(&presence, GUILD, USER, &coll, None).unwrap_err();
        assert_eq!(
            err,
            SubmitError::NoVoiceChannel {
                guild_id: GUILD,
                user_id: USER
            }
        );
    }

    #[test]
    fn test_empty_collection() {
        let coll = collection("empty", &[]);
        let err = build_play(&present(), GUILD, USER, &coll, None).unwrap_err();
        assert!(matches!(err, SubmitError::EmptyCollection { .. }));
    }

    #[test]
    fn test_chained_collection_builds_follow_up() {
        let airhorn = Arc::new(collection("airhorn", &[("default", 1000)]));
        let another = Collection::new(
            "another",
            vec!["!anotha".to_string()],
            collection("another", &[("one", 1), ("one_echo", 1)]).clips().to_vec(),
            Some(airhorn),
        );

        for forced in [false, true] {
            let clip = forced.then(|| another.clip("one_echo").cloned()).flatten();
            let play = build_play(&present(), GUILD, USER, &another, clip).unwrap();

            assert_eq!(play.forced, forced);
            assert_eq!(play.chain_len(), 2);

            let next = play.next.as_deref().unwrap();
            assert_eq!(next.clip.collection(), "airhorn");
            assert_eq!(next.clip.name(), "default");
            assert_eq!(next.forced, forced);
            assert_eq!(next.channel_id, CHANNEL);
            assert_eq!(next.user_id, USER);
        }
    }
}
