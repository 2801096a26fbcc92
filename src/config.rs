use anyhow::{Context, Result};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::audio::player::PlaybackTiming;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub shard_count: Option<u32>, // None = autosharding

    // Audio
    pub audio_dir: PathBuf,
    pub max_queue_size: usize,
    pub preroll: Duration,
    pub channel_settle: Duration,

    // Estadísticas
    pub stats_enabled: bool,
    pub stats_buffer: usize,
}

/// Reads `key`, falling back to `default` when it is unset or blank.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val
            .trim()
            .parse()
            .with_context(|| format!("valor inválido para {}: {:?}", key, val)),
        _ => Ok(default),
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            shard_count: match std::env::var("SHARD_COUNT") {
                Ok(val) if !val.trim().is_empty() => Some(val.trim().parse()?),
                _ => None,
            },

            // Audio
            audio_dir: env_or("AUDIO_DIR", defaults.audio_dir)?,
            max_queue_size: env_or("MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            preroll: Duration::from_millis(env_or("PREROLL_MS", 32u64)?),
            channel_settle: Duration::from_millis(env_or("CHANNEL_SETTLE_MS", 125u64)?),

            // Estadísticas
            stats_enabled: env_or("STATS_ENABLED", defaults.stats_enabled)?,
            stats_buffer: env_or("STATS_BUFFER", defaults.stats_buffer)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The token must not be empty
    /// - Queue capacity and stats buffer must be greater than 0
    /// - A fixed shard count must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("Discord token must not be empty");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.stats_buffer == 0 {
            anyhow::bail!("Stats buffer must be greater than 0");
        }

        if self.shard_count == Some(0) {
            anyhow::bail!("Shard count must be greater than 0 when set");
        }

        Ok(())
    }

    pub fn timing(&self) -> PlaybackTiming {
        PlaybackTiming {
            preroll: self.preroll,
            channel_settle: self.channel_settle,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: shards {}\n  \
            Audio: dir {}, queue {}, preroll {}, settle {}\n  \
            Stats: enabled={}, buffer {}",
            self.shard_count.map_or("auto".to_string(), |n| n.to_string()),
            self.audio_dir.display(),
            self.max_queue_size,
            humantime::format_duration(self.preroll),
            humantime::format_duration(self.channel_settle),
            self.stats_enabled,
            self.stats_buffer
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        let timing = PlaybackTiming::default();
        Self {
            // Discord (sin token por defecto)
            discord_token: String::new(),
            shard_count: None,

            // Audio
            audio_dir: "audio".into(),
            max_queue_size: 6,
            preroll: timing.preroll,
            channel_settle: timing.channel_settle,

            // Estadísticas
            stats_enabled: true,
            stats_buffer: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn valid() -> Config {
        Config {
            discord_token: "token".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = valid();
        assert_eq!(config.max_queue_size, 6);
        assert_eq!(config.timing(), PlaybackTiming::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(Config::default().validate().is_err());
        assert!(Config { max_queue_size: 0, ..valid() }.validate().is_err());
        assert!(Config { stats_buffer: 0, ..valid() }.validate().is_err());
        assert!(Config { shard_count: Some(0), ..valid() }.validate().is_err());
    }

    #[test]
    fn test_summary_hides_token() {
        let summary = Config {
            discord_token: "super-secret".to_string(),
            ..Config::default()
        }
        .summary();

        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("preroll 32ms"));
        assert!(summary.contains("shards auto"));
    }
}
