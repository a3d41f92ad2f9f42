use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError, input::YoutubeDl, tracks::TrackHandle, Call, CoreEvent, Event,
    EventContext, EventHandler as VoiceEventHandler, Songbird,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::{
    error::NodeError,
    node::{AudioNode, NodeEvent, PlayerHandle, VoiceGateway},
    track::Track,
};

/// Moves the bot in and out of voice channels through songbird.
pub struct SongbirdGateway {
    songbird: Arc<Songbird>,
}

impl SongbirdGateway {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self { songbird }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), NodeError> {
        self.songbird
            .join(guild_id, channel_id)
            .await
            .map_err(|e| NodeError::Rejected(e.to_string()))?;

        info!("🔊 Joined voice channel {} in guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), NodeError> {
        match self.songbird.remove(guild_id).await {
            Ok(()) => {
                info!("👋 Left voice in guild {}", guild_id);
                Ok(())
            }
            Err(JoinError::NoCall) => Ok(()),
            Err(e) => Err(NodeError::Rejected(e.to_string())),
        }
    }
}

struct PlayerSlot {
    id: u64,
    call: Arc<Mutex<Call>>,
    track: Option<TrackHandle>,
}

/// Renders tracks on the guild's songbird `Call`, streaming them through
/// yt-dlp. One player per guild; acquiring again replaces the old one.
pub struct SongbirdNode {
    songbird: Arc<Songbird>,
    http: reqwest::Client,
    events: mpsc::UnboundedSender<NodeEvent>,
    players: DashMap<GuildId, PlayerSlot>,
    next_id: AtomicU64,
    volume: f32,
}

impl SongbirdNode {
    pub fn new(
        songbird: Arc<Songbird>,
        http: reqwest::Client,
        events: mpsc::UnboundedSender<NodeEvent>,
        volume: f32,
    ) -> Self {
        Self {
            songbird,
            http,
            events,
            players: DashMap::new(),
            next_id: AtomicU64::new(1),
            volume,
        }
    }

    fn call_for(&self, player: &PlayerHandle) -> Result<Arc<Mutex<Call>>, NodeError> {
        match self.players.get(&player.guild_id()) {
            Some(slot) if slot.id == player.id() => Ok(Arc::clone(&slot.call)),
            _ => Err(NodeError::UnknownPlayer(player.id())),
        }
    }

    fn current_track(&self, player: &PlayerHandle) -> Result<TrackHandle, NodeError> {
        match self.players.get(&player.guild_id()) {
            Some(slot) if slot.id == player.id() => slot
                .track
                .clone()
                .ok_or_else(|| NodeError::Rejected("nothing is rendering".to_string())),
            _ => Err(NodeError::UnknownPlayer(player.id())),
        }
    }

    fn set_track(&self, player: &PlayerHandle, track: Option<TrackHandle>) {
        if let Some(mut slot) = self.players.get_mut(&player.guild_id()) {
            if slot.id == player.id() {
                slot.track = track;
            }
        }
    }
}

#[async_trait]
impl AudioNode for SongbirdNode {
    async fn acquire_player(&self, guild_id: GuildId) -> Result<PlayerHandle, NodeError> {
        let call = self.songbird.get(guild_id).ok_or(NodeError::NotConnected)?;
        let player = PlayerHandle::new(guild_id, self.next_id.fetch_add(1, Ordering::Relaxed));

        {
            let mut handler = call.lock().await;
            handler.remove_all_global_events();
            handler.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectNotifier {
                    player,
                    events: self.events.clone(),
                },
            );
        }

        self.players.insert(
            guild_id,
            PlayerSlot {
                id: player.id(),
                call,
                track: None,
            },
        );

        debug!("🎛️ Acquired {}", player);
        Ok(player)
    }

    async fn render(&self, player: &PlayerHandle, track: &Track) -> Result<(), NodeError> {
        let call = self.call_for(player)?;
        let input = YoutubeDl::new(self.http.clone(), track.uri().to_string());

        let handle = {
            let mut handler = call.lock().await;
            handler.stop();
            handler.play_input(input.into())
        };

        handle
            .set_volume(self.volume)
            .map_err(|e| NodeError::Rejected(e.to_string()))?;
        self.set_track(player, Some(handle));

        info!("🎵 {} rendering {}", player, track);
        Ok(())
    }

    async fn set_paused(&self, player: &PlayerHandle, paused: bool) -> Result<(), NodeError> {
        let track = self.current_track(player)?;
        let result = if paused { track.pause() } else { track.play() };
        result.map_err(|e| NodeError::Rejected(e.to_string()))
    }

    async fn stop(&self, player: &PlayerHandle) -> Result<(), NodeError> {
        let call = self.call_for(player)?;
        call.lock().await.stop();
        self.set_track(player, None);
        Ok(())
    }

    async fn release(&self, player: &PlayerHandle) -> Result<(), NodeError> {
        let Some((_, slot)) = self
            .players
            .remove_if(&player.guild_id(), |_, slot| slot.id == player.id())
        else {
            return Err(NodeError::UnknownPlayer(player.id()));
        };

        let mut handler = slot.call.lock().await;
        handler.remove_all_global_events();
        handler.stop();

        debug!("🎛️ Released {}", player);
        Ok(())
    }
}

/// Forwards songbird driver disconnects to the controller.
struct DisconnectNotifier {
    player: PlayerHandle,
    events: mpsc::UnboundedSender<NodeEvent>,
}

#[async_trait]
impl VoiceEventHandler for DisconnectNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(data) = ctx {
            warn!(
                "🔌 Voice driver disconnected for {} ({:?})",
                self.player, data.reason
            );
        }

        if self
            .events
            .send(NodeEvent::Disconnected {
                player: self.player,
            })
            .is_err()
        {
            debug!("Node event stream closed, dropping disconnect for {}", self.player);
        }

        None
    }
}
