use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use tracing::debug;

use super::{error::MusicError, node::PlayerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Playing,
    Paused,
    Destroyed,
}

impl SessionState {
    /// The complete transition table. Anything not listed is rejected.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Idle, Connecting | Playing | Destroyed)
                | (Connecting, Playing | Destroyed)
                | (Playing, Playing | Paused | Idle | Destroyed)
                | (Paused, Playing | Idle | Destroyed)
        )
    }

    /// Playing or paused, i.e. the node holds a track for this guild.
    pub fn is_rendering(self) -> bool {
        matches!(self, SessionState::Playing | SessionState::Paused)
    }
}

/// Binding of one guild to a voice connection and a node player.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    guild_id: GuildId,
    state: SessionState,
    voice_channel_id: Option<ChannelId>,
    player: Option<PlayerHandle>,
}

impl PlaybackSession {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            state: SessionState::Idle,
            voice_channel_id: None,
            player: None,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn voice_channel_id(&self) -> Option<ChannelId> {
        self.voice_channel_id
    }

    pub fn player(&self) -> Option<&PlayerHandle> {
        self.player.as_ref()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == SessionState::Destroyed
    }

    /// Moves the session to `next`, rejecting anything outside the
    /// transition table.
    pub fn transition(&mut self, next: SessionState) -> Result<(), MusicError> {
        if !self.state.can_transition_to(next) {
            return Err(MusicError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        debug!("🔁 [{}] Session {:?} -> {:?}", self.guild_id, self.state, next);
        self.state = next;
        Ok(())
    }

    pub fn begin_connecting(&mut self, channel_id: ChannelId) -> Result<(), MusicError> {
        self.transition(SessionState::Connecting)?;
        self.voice_channel_id = Some(channel_id);
        Ok(())
    }

    /// Records the node player acquired while connecting.
    pub fn attach_player(&mut self, player: PlayerHandle) {
        debug_assert_eq!(self.state, SessionState::Connecting);
        self.player = Some(player);
    }

    /// Terminal transition. Hands back the player handle so the caller can
    /// release it. Destroying twice yields `None` the second time.
    pub fn destroy(&mut self) -> Option<PlayerHandle> {
        if self.is_destroyed() {
            return None;
        }

        debug!("💥 [{}] Session {:?} -> Destroyed", self.guild_id, self.state);
        self.state = SessionState::Destroyed;
        self.voice_channel_id = None;
        self.player.take()
    }
}

/// Guild id → session registry. Destroyed sessions are never kept.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<GuildId, PlaybackSession>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the guild's live session, if any.
    pub fn active(&self, guild_id: GuildId) -> Option<PlaybackSession> {
        self.sessions
            .get(&guild_id)
            .filter(|session| !session.is_destroyed())
            .map(|session| session.value().clone())
    }

    /// Stores the session, or drops the entry if it has been destroyed.
    pub fn save(&self, session: PlaybackSession) {
        if session.is_destroyed() {
            self.sessions.remove(&session.guild_id());
        } else {
            self.sessions.insert(session.guild_id(), session);
        }
    }

    pub fn remove(&self, guild_id: GuildId) -> Option<PlaybackSession> {
        self.sessions.remove(&guild_id).map(|(_, session)| session)
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}
