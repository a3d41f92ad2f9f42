use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // For development command registration

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,

    // Node
    pub node_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID is not set")?
                .parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,

            // Node
            node_timeout: humantime::parse_duration(
                &std::env::var("NODE_TIMEOUT").unwrap_or_else(|_| "10s".to_string()),
            )
            .context("NODE_TIMEOUT must be a duration such as `10s` or `1500ms`")?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue capacity must be greater than 0
    /// - Node timeout must be between 100ms and 5 minutes
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.node_timeout < Duration::from_millis(100) {
            anyhow::bail!(
                "Node timeout too short, minimum 100ms, got: {}",
                humantime::format_duration(self.node_timeout)
            );
        }

        if self.node_timeout > Duration::from_secs(300) {
            anyhow::bail!(
                "Node timeout too long, maximum 5m, got: {}",
                humantime::format_duration(self.node_timeout)
            );
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {} tracks max per queue\n  \
            Node: {} timeout",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            humantime::format_duration(self.node_timeout),
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 0.5,
            max_queue_size: 1000,

            node_timeout: Duration::from_secs(10),
        }
    }
}
