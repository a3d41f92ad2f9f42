//! Seams to the two external collaborators of the controller: the voice
//! gateway that moves the bot in and out of channels, and the audio node
//! that renders tracks into them.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::fmt;

use super::{error::NodeError, track::Track};

/// Opaque reference to the node-side player of one guild.
///
/// The id is unique per acquisition, so a disconnect notification can be
/// matched against the session that owns the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerHandle {
    guild_id: GuildId,
    id: u64,
}

impl PlayerHandle {
    pub fn new(guild_id: GuildId, id: u64) -> Self {
        Self { guild_id, id }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for PlayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player#{}@{}", self.id, self.guild_id)
    }
}

/// Out-of-band notifications pushed by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// The player lost its voice connection and can no longer render.
    Disconnected { player: PlayerHandle },
}

impl NodeEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            NodeEvent::Disconnected { player } => player.guild_id(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), NodeError>;

    /// Leaves the guild's voice channel. Leaving when not connected succeeds.
    async fn leave(&self, guild_id: GuildId) -> Result<(), NodeError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioNode: Send + Sync {
    async fn acquire_player(&self, guild_id: GuildId) -> Result<PlayerHandle, NodeError>;

    /// Replaces whatever the player is rendering with `track`.
    async fn render(&self, player: &PlayerHandle, track: &Track) -> Result<(), NodeError>;

    async fn set_paused(&self, player: &PlayerHandle, paused: bool) -> Result<(), NodeError>;

    /// Stops rendering but keeps the player for reuse.
    async fn stop(&self, player: &PlayerHandle) -> Result<(), NodeError>;

    async fn release(&self, player: &PlayerHandle) -> Result<(), NodeError>;
}
