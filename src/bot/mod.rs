//! # Bot Module
//!
//! Discord front end for the music controller.
//!
//! - Slash command registration, per guild or global
//! - Interaction dispatch for commands and control-panel buttons
//!
//! The bot never touches queues or sessions itself. Every command goes
//! through the shared [`MusicController`].

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{audio::controller::MusicController, config::Config, sources::TrackResolver};

/// Serenity event handler for Uncord Music.
pub struct MusicBot {
    config: Arc<Config>,
    /// Shared with the node event loop spawned in `main`.
    pub controller: Arc<MusicController>,
    pub resolver: TrackResolver,
}

impl MusicBot {
    pub fn new(config: Config, controller: Arc<MusicController>, resolver: TrackResolver) -> Self {
        Self {
            config: Arc::new(config),
            controller,
            resolver,
        }
    }

    /// Registers slash commands for `GUILD_ID` when set, globally otherwise.
    /// Guild commands show up almost immediately, global ones can take an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ Bot is not a member of guild {}, skipping registration", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Guild command registration failed: {:?}", e);
                        anyhow::anyhow!(
                            "Could not register guild commands. Check the bot has the 'applications.commands' scope in the guild."
                        )
                    })?;
                info!("✅ Guild commands registered for {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Global command registration failed: {:?}", e);
                    anyhow::anyhow!(
                        "Could not register global commands. Check the bot has the 'applications.commands' scope."
                    )
                })?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Failed to register commands: {:?}", e);
        }
    }

    /// Errors are logged here; the user sees "This interaction failed" when
    /// no response could be sent.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error handling command: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error handling component: {:?}", e);
                }
            }
            _ => {}
        }
    }
}
