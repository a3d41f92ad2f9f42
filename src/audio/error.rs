use std::time::Duration;
use thiserror::Error;

use super::session::SessionState;

/// Failure reported by the voice gateway or the audio node.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("not connected to a voice channel")]
    NotConnected,
    #[error("player {0} is unknown to the node")]
    UnknownPlayer(u64),
}

impl NodeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, NodeError::Timeout(_))
    }
}

/// Errors returned by controller operations. Every variant renders as a
/// message fit to show the user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MusicError {
    #[error("Nothing is playing in this server right now.")]
    NoActiveSession,
    #[error("The queue is empty.")]
    EmptyQueue,
    #[error("Need at least two upcoming tracks to shuffle, found {upcoming}.")]
    InsufficientTracks { upcoming: usize },
    #[error("The queue is full (maximum {max} tracks).")]
    QueueFull { max: usize },
    #[error("Could not join the voice channel: {0}")]
    VoiceJoin(#[source] NodeError),
    #[error("Could not leave the voice channel cleanly: {0}")]
    VoiceLeave(#[source] NodeError),
    #[error("The audio node did not provide a player: {0}")]
    NodeAcquisition(#[source] NodeError),
    #[error("The audio node failed to carry out the command: {0}")]
    NodeCommand(#[source] NodeError),
    #[error("This command only works inside a server.")]
    GuildResolution,
    #[error("Invalid session transition from {from:?} to {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },
}

impl MusicError {
    /// Whether the failure came from the user's request rather than an
    /// external dependency. Handlers render these as warnings.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            MusicError::NoActiveSession
                | MusicError::EmptyQueue
                | MusicError::InsufficientTracks { .. }
                | MusicError::QueueFull { .. }
                | MusicError::GuildResolution
        )
    }
}
