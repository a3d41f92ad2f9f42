//! Per-guild playback controller.
//!
//! Every public operation takes the guild's lock first and keeps it until the
//! node has answered, so commands for one guild run strictly in arrival order
//! while different guilds never wait on each other. Queue and session are
//! only ever touched while that lock is held.

use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use super::{
    error::{MusicError, NodeError},
    node::{AudioNode, NodeEvent, VoiceGateway},
    queue::{QueueSnapshot, QueueStore},
    session::{PlaybackSession, SessionState, SessionStore},
    track::Track,
};
use crate::config::Config;

/// Result of a successful `play`.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    /// The node started rendering this track, which is now the front track.
    Started(Track),
    /// Playback was already running; the track was appended at `position`.
    Queued { track: Track, position: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkipOutcome {
    pub skipped: usize,
    /// The new front track, `None` when the queue ran dry.
    pub now_playing: Option<Track>,
}

pub struct MusicController {
    queues: QueueStore,
    sessions: SessionStore,
    guild_locks: DashMap<GuildId, Arc<Mutex<()>>>,
    node: Arc<dyn AudioNode>,
    voice: Arc<dyn VoiceGateway>,
    node_timeout: Duration,
    max_queue_size: usize,
}

impl MusicController {
    pub fn new(node: Arc<dyn AudioNode>, voice: Arc<dyn VoiceGateway>, config: &Config) -> Self {
        Self::with_limits(node, voice, config.node_timeout, config.max_queue_size)
    }

    pub fn with_limits(
        node: Arc<dyn AudioNode>,
        voice: Arc<dyn VoiceGateway>,
        node_timeout: Duration,
        max_queue_size: usize,
    ) -> Self {
        Self {
            queues: QueueStore::new(),
            sessions: SessionStore::new(),
            guild_locks: DashMap::new(),
            node,
            voice,
            node_timeout,
            max_queue_size,
        }
    }

    /// Queues `track` and starts playback if nothing is rendering yet.
    ///
    /// When connecting fails the track stays queued, so a later `play` picks
    /// it up again.
    pub async fn play(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        track: Track,
    ) -> Result<PlayOutcome, MusicError> {
        let _guard = self.lock(guild_id).await;
        let queue = self.queues.get(guild_id);

        let (position, front) = {
            let mut q = queue.write();
            if q.len() >= self.max_queue_size {
                return Err(MusicError::QueueFull {
                    max: self.max_queue_size,
                });
            }
            q.enqueue(track.clone());
            (q.len() - 1, q.front().cloned().ok_or(MusicError::EmptyQueue)?)
        };

        info!("🎵 [{}] play: {} (position {})", guild_id, track, position);

        match self.sessions.active(guild_id) {
            // With an empty queue before this track the node holds nothing
            // worth keeping, whatever the session state says.
            Some(session) if session.state().is_rendering() && position > 0 => {
                Ok(PlayOutcome::Queued { track, position })
            }
            Some(mut session) if session.voice_channel_id() != Some(channel_id) => {
                info!(
                    "🔀 [{}] moving from {:?} to {}",
                    guild_id,
                    session.voice_channel_id(),
                    channel_id
                );
                self.teardown(&mut session).await;
                self.sessions.save(session);
                self.connect(guild_id, channel_id, front).await
            }
            Some(session) => self.restart(session, front).await,
            None => self.connect(guild_id, channel_id, front).await,
        }
    }

    /// Pauses playback. Returns `false` when it was already paused.
    pub async fn pause(&self, guild_id: GuildId) -> Result<bool, MusicError> {
        self.set_paused(guild_id, true).await
    }

    /// Resumes playback. Returns `false` when it was already playing.
    pub async fn resume(&self, guild_id: GuildId) -> Result<bool, MusicError> {
        self.set_paused(guild_id, false).await
    }

    /// Drops up to `amount` tracks from the front and hands the new front to
    /// the node, or stops it when nothing is left.
    pub async fn skip(&self, guild_id: GuildId, amount: usize) -> Result<SkipOutcome, MusicError> {
        let amount = amount.max(1);
        let _guard = self.lock(guild_id).await;
        let queue = self.queues.get(guild_id);

        let (skipped, now_playing) = {
            let mut q = queue.write();
            if q.is_empty() {
                return Err(MusicError::EmptyQueue);
            }
            let skipped = q.remove_front(amount);
            (skipped, q.front().cloned())
        };

        info!("⏭️ [{}] skip: {} of {} requested", guild_id, skipped, amount);

        let outcome = SkipOutcome {
            skipped,
            now_playing: now_playing.clone(),
        };

        let Some(mut session) = self.sessions.active(guild_id) else {
            return Ok(outcome);
        };
        let Some(player) = session.player().copied() else {
            return Ok(outcome);
        };

        let result = match (&now_playing, session.state().is_rendering()) {
            (Some(track), _) => self
                .bounded(self.node.render(&player, track))
                .await
                .map(|_| SessionState::Playing),
            (None, true) => self
                .bounded(self.node.stop(&player))
                .await
                .map(|_| SessionState::Idle),
            (None, false) => Ok(session.state()),
        };

        match result {
            Ok(next) => {
                if session.state() != next {
                    session.transition(next)?;
                }
                self.sessions.save(session);
                Ok(outcome)
            }
            Err(e) => Err(self.node_failure(session, e).await),
        }
    }

    /// Removes every track except the front one. Returns how many were removed.
    pub async fn clear_queue(&self, guild_id: GuildId) -> Result<usize, MusicError> {
        let _guard = self.lock(guild_id).await;
        let queue = self.queues.get(guild_id);
        let mut q = queue.write();

        if q.is_empty() {
            return Err(MusicError::EmptyQueue);
        }

        let removed = q.clear_keeping_current();
        info!("🗑️ [{}] clear: {} tracks removed", guild_id, removed);
        Ok(removed)
    }

    /// Shuffles the upcoming tracks. Returns how many were shuffled.
    pub async fn shuffle(&self, guild_id: GuildId) -> Result<usize, MusicError> {
        let _guard = self.lock(guild_id).await;
        let queue = self.queues.get(guild_id);
        let mut q = queue.write();

        let upcoming = q.len().saturating_sub(1);
        if upcoming < 2 {
            return Err(MusicError::InsufficientTracks { upcoming });
        }

        q.shuffle();
        Ok(upcoming)
    }

    /// Tears the session down and empties the queue.
    ///
    /// The queue is cleared even when there was no session to destroy.
    /// Returns the number of tracks cleared.
    pub async fn leave(&self, guild_id: GuildId) -> Result<usize, MusicError> {
        let _guard = self.lock(guild_id).await;

        let cleared = self.queues.get(guild_id).write().clear_all();

        let Some(mut session) = self.sessions.remove(guild_id) else {
            debug!("👋 [{}] leave without session, {} tracks cleared", guild_id, cleared);
            return Err(MusicError::NoActiveSession);
        };

        let released = match session.destroy() {
            Some(player) => self.bounded(self.node.release(&player)).await,
            None => Ok(()),
        };
        let left = self.bounded(self.voice.leave(guild_id)).await;

        info!("👋 [{}] left voice, {} tracks cleared", guild_id, cleared);

        released.map_err(MusicError::NodeCommand)?;
        left.map_err(MusicError::VoiceLeave)?;
        Ok(cleared)
    }

    pub async fn now_playing(&self, guild_id: GuildId) -> Option<Track> {
        let _guard = self.lock(guild_id).await;
        let queue = self.queues.get(guild_id);
        let front = queue.read().front().cloned();
        front
    }

    pub async fn show_queue(&self, guild_id: GuildId) -> QueueSnapshot {
        let _guard = self.lock(guild_id).await;
        let queue = self.queues.get(guild_id);
        let snapshot = queue.read().snapshot();
        snapshot
    }

    /// Current lifecycle state, `None` when the guild has no live session.
    pub async fn session_state(&self, guild_id: GuildId) -> Option<SessionState> {
        let _guard = self.lock(guild_id).await;
        self.sessions.active(guild_id).map(|session| session.state())
    }

    /// Applies an out-of-band notification from the node.
    pub async fn handle_node_event(&self, event: NodeEvent) {
        let guild_id = event.guild_id();
        let _guard = self.lock(guild_id).await;

        match event {
            NodeEvent::Disconnected { player } => {
                let Some(mut session) = self.sessions.active(guild_id) else {
                    debug!("🔌 [{}] disconnect for {} without session", guild_id, player);
                    return;
                };

                if session.player() != Some(&player) {
                    debug!("🔌 [{}] ignoring stale disconnect for {}", guild_id, player);
                    return;
                }

                warn!(
                    "🔌 [{}] node lost {} in {:?} while {:?}, destroying session",
                    guild_id,
                    player,
                    session.voice_channel_id(),
                    session.state()
                );
                self.teardown(&mut session).await;
                self.sessions.save(session);
            }
        }
    }

    /// Consumes node notifications until the sender side is dropped.
    pub async fn run_events(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<NodeEvent>) {
        while let Some(event) = events.recv().await {
            let controller = Arc::clone(&self);
            tokio::spawn(async move {
                controller.handle_node_event(event).await;
            });
        }

        info!("📭 Node event stream closed");
    }

    async fn lock(&self, guild_id: GuildId) -> GuildGuard<'_> {
        let lock = self.guild_locks.entry(guild_id).or_default().clone();
        GuildGuard {
            controller: self,
            guild_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Forgets the guild's lock when no queue, session or waiter is left.
    /// The map's own reference is the only one once nobody holds or awaits it.
    fn prune_lock(&self, guild_id: GuildId) {
        let pruned = self
            .guild_locks
            .remove_if(&guild_id, |_, lock| {
                Arc::strong_count(lock) == 1
                    && !self.queues.contains(guild_id)
                    && !self.sessions.contains(guild_id)
            })
            .is_some();

        if pruned {
            debug!("🧹 [{}] guild state released", guild_id);
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, NodeError>>,
    ) -> Result<T, NodeError> {
        tokio::time::timeout(self.node_timeout, call)
            .await
            .unwrap_or_else(|_| Err(NodeError::Timeout(self.node_timeout)))
    }

    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> Result<bool, MusicError> {
        let _guard = self.lock(guild_id).await;
        let mut session = self
            .sessions
            .active(guild_id)
            .ok_or(MusicError::NoActiveSession)?;

        let target = if paused {
            SessionState::Paused
        } else {
            SessionState::Playing
        };

        if session.state() == target {
            debug!("[{}] already {:?}, no node call", guild_id, target);
            return Ok(false);
        }
        if !session.state().is_rendering() {
            return Err(MusicError::EmptyQueue);
        }

        let player = session
            .player()
            .copied()
            .ok_or(MusicError::NoActiveSession)?;

        match self.bounded(self.node.set_paused(&player, paused)).await {
            Ok(()) => {
                session.transition(target)?;
                self.sessions.save(session);
                info!("[{}] {}", guild_id, if paused { "⏸️ paused" } else { "▶️ resumed" });
                Ok(true)
            }
            Err(e) => Err(self.node_failure(session, e).await),
        }
    }

    /// Idle → Connecting → Playing for a guild without a session.
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        front: Track,
    ) -> Result<PlayOutcome, MusicError> {
        let mut session = PlaybackSession::new(guild_id);
        session.begin_connecting(channel_id)?;

        if let Err(e) = self.bounded(self.voice.join(guild_id, channel_id)).await {
            error!("❌ [{}] voice join failed: {}", guild_id, e);
            self.teardown(&mut session).await;
            return Err(MusicError::VoiceJoin(e));
        }

        let player = match self.bounded(self.node.acquire_player(guild_id)).await {
            Ok(player) => player,
            Err(e) => {
                error!("❌ [{}] player acquisition failed: {}", guild_id, e);
                self.teardown(&mut session).await;
                return Err(MusicError::NodeAcquisition(e));
            }
        };
        session.attach_player(player);

        if let Err(e) = self.bounded(self.node.render(&player, &front)).await {
            error!("❌ [{}] first render failed: {}", guild_id, e);
            self.teardown(&mut session).await;
            return Err(MusicError::NodeCommand(e));
        }

        session.transition(SessionState::Playing)?;
        self.sessions.save(session);
        info!("🔊 [{}] connected to {} with {}", guild_id, channel_id, player);

        Ok(PlayOutcome::Started(front))
    }

    /// Idle → Playing on a session whose resources were kept.
    async fn restart(
        &self,
        mut session: PlaybackSession,
        front: Track,
    ) -> Result<PlayOutcome, MusicError> {
        let player = session
            .player()
            .copied()
            .ok_or(MusicError::NoActiveSession)?;

        match self.bounded(self.node.render(&player, &front)).await {
            Ok(()) => {
                session.transition(SessionState::Playing)?;
                self.sessions.save(session);
                Ok(PlayOutcome::Started(front))
            }
            Err(e) => Err(self.node_failure(session, e).await),
        }
    }

    /// Maps a failed node command to an error. A timeout leaves the node in
    /// an unknown state, so the session is destroyed; any other failure keeps
    /// the session as it was.
    async fn node_failure(&self, mut session: PlaybackSession, err: NodeError) -> MusicError {
        if err.is_timeout() {
            warn!(
                "⏱️ [{}] node timed out while {:?}, destroying session",
                session.guild_id(),
                session.state()
            );
            self.teardown(&mut session).await;
            self.sessions.save(session);
        } else {
            error!("❌ [{}] node command failed: {}", session.guild_id(), err);
        }

        MusicError::NodeCommand(err)
    }

    /// Best-effort release of everything a session holds. Failures are logged
    /// because the caller is already reporting the error that got us here.
    async fn teardown(&self, session: &mut PlaybackSession) {
        let guild_id = session.guild_id();

        if let Some(player) = session.destroy() {
            if let Err(e) = self.bounded(self.node.release(&player)).await {
                warn!("⚠️ [{}] could not release {}: {}", guild_id, player, e);
            }
        }

        if let Err(e) = self.bounded(self.voice.leave(guild_id)).await {
            warn!("⚠️ [{}] could not leave voice: {}", guild_id, e);
        }
    }
}

/// A held guild lock. Dropping it drops an emptied queue while still
/// exclusive, then releases the lock and prunes it if the guild is idle.
struct GuildGuard<'a> {
    controller: &'a MusicController,
    guild_id: GuildId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for GuildGuard<'_> {
    fn drop(&mut self) {
        self.controller.queues.remove_if_empty(self.guild_id);
        drop(self.guard.take());
        self.controller.prune_lock(self.guild_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        node::{MockAudioNode, MockVoiceGateway, PlayerHandle},
        track::sample_track,
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    type CallLog = Arc<parking_lot::Mutex<Vec<String>>>;

    const GUILD: u64 = 42;
    const CHANNEL: u64 = 7;

    fn guild() -> GuildId {
        GuildId::new(GUILD)
    }

    fn channel() -> ChannelId {
        ChannelId::new(CHANNEL)
    }

    fn controller(node: impl AudioNode + 'static, voice: MockVoiceGateway) -> MusicController {
        MusicController::with_limits(Arc::new(node), Arc::new(voice), Duration::from_millis(200), 100)
    }

    fn voice_ok() -> MockVoiceGateway {
        let mut voice = MockVoiceGateway::new();
        voice.expect_join().returning(|_, _| Ok(()));
        voice.expect_leave().returning(|_| Ok(()));
        voice
    }

    /// A node that accepts everything and records what it was asked to do.
    fn node_ok(log: &CallLog) -> MockAudioNode {
        let mut node = MockAudioNode::new();
        node.expect_acquire_player()
            .returning(|guild_id| Ok(PlayerHandle::new(guild_id, 1)));

        let calls = Arc::clone(log);
        node.expect_render().returning(move |_, track| {
            calls.lock().push(format!("render {}", track.title()));
            Ok(())
        });
        let calls = Arc::clone(log);
        node.expect_set_paused().returning(move |_, paused| {
            calls.lock().push(format!("paused {paused}"));
            Ok(())
        });
        let calls = Arc::clone(log);
        node.expect_stop().returning(move |_| {
            calls.lock().push("stop".to_string());
            Ok(())
        });
        let calls = Arc::clone(log);
        node.expect_release().returning(move |_| {
            calls.lock().push("release".to_string());
            Ok(())
        });
        node
    }

    fn calls(log: &CallLog) -> Vec<String> {
        log.lock().clone()
    }

    async fn with_tracks(controller: &MusicController, n: u64) {
        for i in 0..n {
            controller.play(guild(), channel(), sample_track(i)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn first_play_connects_and_renders() {
        let log = CallLog::default();
        let controller = controller(node_ok(&log), voice_ok());

        let outcome = controller.play(guild(), channel(), sample_track(0)).await.unwrap();

        assert_eq!(outcome, PlayOutcome::Started(controller.now_playing(guild()).await.unwrap()));
        assert_eq!(controller.session_state(guild()).await, Some(SessionState::Playing));
        assert_eq!(calls(&log), vec!["render Track 0"]);
    }

    #[tokio::test]
    async fn play_while_playing_only_appends() {
        let log = CallLog::default();
        let controller = controller(node_ok(&log), voice_ok());
        with_tracks(&controller, 1).await;

        let outcome = controller.play(guild(), channel(), sample_track(1)).await.unwrap();

        assert!(matches!(outcome, PlayOutcome::Queued { position: 1, .. }));
        assert_eq!(calls(&log), vec!["render Track 0"]);
        assert_eq!(controller.show_queue(guild()).await.upcoming.len(), 1);
    }

    #[tokio::test]
    async fn join_failure_destroys_session_but_keeps_track() {
        let log = CallLog::default();
        let mut voice = MockVoiceGateway::new();
        voice
            .expect_join()
            .returning(|_, _| Err(NodeError::Rejected("missing permissions".into())));
        voice.expect_leave().returning(|_| Ok(()));
        let controller = controller(node_ok(&log), voice);

        let err = controller.play(guild(), channel(), sample_track(0)).await.unwrap_err();

        assert_eq!(
            err,
            MusicError::VoiceJoin(NodeError::Rejected("missing permissions".into()))
        );
        assert!(!controller.sessions.contains(guild()));
        assert_eq!(controller.now_playing(guild()).await.unwrap().title(), "Track 0");
        assert!(calls(&log).is_empty());
    }

    #[tokio::test]
    async fn acquisition_failure_leaves_voice() {
        let mut node = MockAudioNode::new();
        node.expect_acquire_player()
            .returning(|_| Err(NodeError::Rejected("no capacity".into())));
        let mut voice = MockVoiceGateway::new();
        voice.expect_join().times(1).returning(|_, _| Ok(()));
        voice.expect_leave().times(1).returning(|_| Ok(()));
        let controller = controller(node, voice);

        let err = controller.play(guild(), channel(), sample_track(0)).await.unwrap_err();

        assert!(matches!(err, MusicError::NodeAcquisition(_)));
        assert!(!controller.sessions.contains(guild()));
        assert_eq!(controller.show_queue(guild()).await.now_playing.unwrap().title(), "Track 0");
    }

    #[tokio::test]
    async fn pause_without_session_fails() {
        let controller = controller(MockAudioNode::new(), MockVoiceGateway::new());

        assert_eq!(controller.pause(guild()).await, Err(MusicError::NoActiveSession));
        assert_eq!(controller.resume(guild()).await, Err(MusicError::NoActiveSession));
        assert!(!controller.sessions.contains(guild()));
    }

    #[tokio::test]
    async fn pause_and_resume_are_idempotent() {
        let log = CallLog::default();
        let controller = controller(node_ok(&log), voice_ok());
        with_tracks(&controller, 1).await;

        assert_eq!(controller.resume(guild()).await, Ok(false));
        assert_eq!(controller.pause(guild()).await, Ok(true));
        assert_eq!(controller.pause(guild()).await, Ok(false));
        assert_eq!(controller.session_state(guild()).await, Some(SessionState::Paused));
        assert_eq!(controller.resume(guild()).await, Ok(true));

        assert_eq!(
            calls(&log),
            vec!["render Track 0", "paused true", "paused false"]
        );
    }

    #[tokio::test]
    async fn skip_last_track_goes_idle() {
        let log = CallLog::default();
        let controller = controller(node_ok(&log), voice_ok());
        with_tracks(&controller, 1).await;

        let outcome = controller.skip(guild(), 1).await.unwrap();

        assert_eq!(outcome, SkipOutcome { skipped: 1, now_playing: None });
        assert_eq!(controller.session_state(guild()).await, Some(SessionState::Idle));
        assert!(controller.show_queue(guild()).await.is_empty());
        assert_eq!(calls(&log), vec!["render Track 0", "stop"]);
    }

    #[tokio::test]
    async fn skip_two_renders_third() {
        let log = CallLog::default();
        let controller = controller(node_ok(&log), voice_ok());
        with_tracks(&controller, 3).await;

        let outcome = controller.skip(guild(), 2).await.unwrap();

        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.now_playing.unwrap().title(), "Track 2");
        assert_eq!(calls(&log), vec!["render Track 0", "render Track 2"]);
        assert_eq!(controller.session_state(guild()).await, Some(SessionState::Playing));
    }

    #[tokio::test]
    async fn skip_more_than_queued_truncates() {
        let log = CallLog::default();
        let controller = controller(node_ok(&log), voice_ok());
        with_tracks(&controller, 2).await;

        let outcome = controller.skip(guild(), 10).await.unwrap();

        assert_eq!(outcome.skipped, 2);
        assert_eq!(controller.session_state(guild()).await, Some(SessionState::Idle));
    }

    #[tokio::test]
    async fn skip_on_empty_queue_fails() {
        let controller = controller(MockAudioNode::new(), MockVoiceGateway::new());
        assert_eq!(controller.skip(guild(), 1).await, Err(MusicError::EmptyQueue));
    }

    #[tokio::test]
    async fn play_after_idle_restarts_on_same_player() {
        let log = CallLog::default();
        let controller = controller(node_ok(&log), voice_ok());
        with_tracks(&controller, 1).await;
        controller.skip(guild(), 1).await.unwrap();

        let outcome = controller.play(guild(), channel(), sample_track(5)).await.unwrap();

        assert!(matches!(outcome, PlayOutcome::Started(ref t) if t.title() == "Track 5"));
        assert_eq!(calls(&log), vec!["render Track 0", "stop", "render Track 5"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_skips_do_not_lose_updates() {
        let mut node = MockAudioNode::new();
        node.expect_acquire_player()
            .returning(|guild_id| Ok(PlayerHandle::new(guild_id, 1)));
        node.expect_render().times(3).returning(|_, _| {
            std::thread::sleep(Duration::from_millis(20));
            Ok(())
        });
        let controller = Arc::new(controller(node, voice_ok()));

        let queue = controller.queues.get(guild());
        for i in 1..5 {
            queue.write().enqueue(sample_track(i));
        }
        controller.play(guild(), channel(), sample_track(5)).await.unwrap();

        let first = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.skip(guild(), 1).await }
        });
        let second = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.skip(guild(), 1).await }
        });

        assert_eq!(first.await.unwrap().unwrap().skipped, 1);
        assert_eq!(second.await.unwrap().unwrap().skipped, 1);

        let snapshot = controller.show_queue(guild()).await;
        assert_eq!(snapshot.now_playing.unwrap().title(), "Track 3");
        assert_eq!(snapshot.upcoming.len(), 2);
    }

    #[tokio::test]
    async fn clear_queue_keeps_front() {
        let log = CallLog::default();
        let controller = controller(node_ok(&log), voice_ok());
        with_tracks(&controller, 3).await;

        assert_eq!(controller.clear_queue(guild()).await, Ok(2));

        let snapshot = controller.show_queue(guild()).await;
        assert_eq!(snapshot.now_playing.unwrap().title(), "Track 0");
        assert!(snapshot.upcoming.is_empty());
        assert_eq!(controller.session_state(guild()).await, Some(SessionState::Playing));
    }

    #[tokio::test]
    async fn clear_queue_on_empty_fails() {
        let controller = controller(MockAudioNode::new(), MockVoiceGateway::new());
        assert_eq!(controller.clear_queue(guild()).await, Err(MusicError::EmptyQueue));
    }

    #[tokio::test]
    async fn shuffle_needs_two_upcoming_tracks() {
        let log = CallLog::default();
        let controller = controller(node_ok(&log), voice_ok());
        with_tracks(&controller, 2).await;

        assert_eq!(
            controller.shuffle(guild()).await,
            Err(MusicError::InsufficientTracks { upcoming: 1 })
        );

        controller.play(guild(), channel(), sample_track(2)).await.unwrap();
        assert_eq!(controller.shuffle(guild()).await, Ok(2));
        assert_eq!(controller.now_playing(guild()).await.unwrap().title(), "Track 0");
        assert_eq!(calls(&log), vec!["render Track 0"]);
    }

    #[tokio::test]
    async fn leave_releases_and_clears() {
        let log = CallLog::default();
        let controller = controller(node_ok(&log), voice_ok());
        with_tracks(&controller, 3).await;

        assert_eq!(controller.leave(guild()).await, Ok(3));

        assert!(!controller.sessions.contains(guild()));
        assert!(controller.show_queue(guild()).await.is_empty());
        assert_eq!(calls(&log), vec!["render Track 0", "release"]);
    }

    #[tokio::test]
    async fn leave_without_session_still_clears_queue() {
        let controller = controller(MockAudioNode::new(), MockVoiceGateway::new());
        controller.queues.get(guild()).write().enqueue(sample_track(0));

        assert_eq!(controller.leave(guild()).await, Err(MusicError::NoActiveSession));
        assert!(controller.now_playing(guild()).await.is_none());
        assert!(!controller.sessions.contains(guild()));

        assert_eq!(controller.leave(guild()).await, Err(MusicError::NoActiveSession));
    }

    #[tokio::test]
    async fn disconnect_destroys_session_and_keeps_queue() {
        let log = CallLog::default();
        let controller = controller(node_ok(&log), voice_ok());
        with_tracks(&controller, 2).await;

        controller
            .handle_node_event(NodeEvent::Disconnected {
                player: PlayerHandle::new(guild(), 1),
            })
            .await;

        assert_eq!(controller.session_state(guild()).await, None);
        assert_eq!(controller.show_queue(guild()).await.upcoming.len(), 1);
        assert_eq!(controller.pause(guild()).await, Err(MusicError::NoActiveSession));
    }

    #[tokio::test]
    async fn stale_disconnect_is_ignored() {
        let log = CallLog::default();
        let controller = controller(node_ok(&log), voice_ok());
        with_tracks(&controller, 1).await;

        controller
            .handle_node_event(NodeEvent::Disconnected {
                player: PlayerHandle::new(guild(), 99),
            })
            .await;

        assert_eq!(controller.session_state(guild()).await, Some(SessionState::Playing));
    }

    #[tokio::test]
    async fn queue_capacity_is_enforced() {
        let log = CallLog::default();
        let controller = MusicController::with_limits(
            Arc::new(node_ok(&log)),
            Arc::new(voice_ok()),
            Duration::from_millis(200),
            2,
        );
        with_tracks(&controller, 2).await;

        assert_eq!(
            controller.play(guild(), channel(), sample_track(2)).await,
            Err(MusicError::QueueFull { max: 2 })
        );
        assert_eq!(controller.show_queue(guild()).await.upcoming.len(), 1);
    }

    /// Accepts playback but never answers pause requests.
    struct StalledPauseNode;

    #[async_trait]
    impl AudioNode for StalledPauseNode {
        async fn acquire_player(&self, guild_id: GuildId) -> Result<PlayerHandle, NodeError> {
            Ok(PlayerHandle::new(guild_id, 1))
        }

        async fn render(&self, _: &PlayerHandle, _: &Track) -> Result<(), NodeError> {
            Ok(())
        }

        async fn set_paused(&self, _: &PlayerHandle, _: bool) -> Result<(), NodeError> {
            std::future::pending::<Result<(), NodeError>>().await
        }

        async fn stop(&self, _: &PlayerHandle) -> Result<(), NodeError> {
            Ok(())
        }

        async fn release(&self, _: &PlayerHandle) -> Result<(), NodeError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn node_timeout_destroys_session() {
        let controller = controller(StalledPauseNode, voice_ok());
        with_tracks(&controller, 1).await;

        let err = controller.pause(guild()).await.unwrap_err();

        assert_eq!(err, MusicError::NodeCommand(NodeError::Timeout(Duration::from_millis(200))));
        assert_eq!(controller.session_state(guild()).await, None);
        assert_eq!(controller.now_playing(guild()).await.unwrap().title(), "Track 0");
    }

    #[tokio::test]
    async fn failed_command_keeps_session_state() {
        let mut node = MockAudioNode::new();
        node.expect_acquire_player()
            .returning(|guild_id| Ok(PlayerHandle::new(guild_id, 1)));
        node.expect_render().returning(|_, _| Ok(()));
        node.expect_set_paused()
            .returning(|_, _| Err(NodeError::Rejected("busy".into())));
        let controller = controller(node, voice_ok());
        with_tracks(&controller, 1).await;

        assert!(matches!(
            controller.pause(guild()).await,
            Err(MusicError::NodeCommand(NodeError::Rejected(_)))
        ));
        assert_eq!(controller.session_state(guild()).await, Some(SessionState::Playing));
    }

    #[tokio::test]
    async fn guilds_do_not_share_state() {
        let log = CallLog::default();
        let controller = controller(node_ok(&log), voice_ok());
        with_tracks(&controller, 2).await;
        let other = GuildId::new(GUILD + 1);

        assert!(controller.show_queue(other).await.is_empty());
        assert_eq!(controller.session_state(other).await, None);
        assert_eq!(controller.skip(other, 1).await, Err(MusicError::EmptyQueue));
    }

    #[tokio::test]
    async fn pause_on_idle_session_reports_empty_queue() {
        let log = CallLog::default();
        let controller = controller(node_ok(&log), voice_ok());
        with_tracks(&controller, 1).await;
        controller.skip(guild(), 1).await.unwrap();

        assert_eq!(controller.pause(guild()).await, Err(MusicError::EmptyQueue));
        assert_eq!(controller.resume(guild()).await, Err(MusicError::EmptyQueue));
        assert_eq!(controller.session_state(guild()).await, Some(SessionState::Idle));
    }

    #[tokio::test]
    async fn skip_without_session_only_touches_queue() {
        let controller = controller(MockAudioNode::new(), MockVoiceGateway::new());
        let queue = controller.queues.get(guild());
        for i in 0..3 {
            queue.write().enqueue(sample_track(i));
        }

        let outcome = controller.skip(guild(), 0).await.unwrap();

        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.now_playing.unwrap().title(), "Track 1");
        assert_eq!(controller.session_state(guild()).await, None);
    }

    #[tokio::test]
    async fn first_render_failure_tears_down() {
        let mut node = MockAudioNode::new();
        node.expect_acquire_player()
            .returning(|guild_id| Ok(PlayerHandle::new(guild_id, 1)));
        node.expect_render()
            .returning(|_, _| Err(NodeError::Rejected("unplayable".into())));
        node.expect_release().times(1).returning(|_| Ok(()));
        let mut voice = MockVoiceGateway::new();
        voice.expect_join().returning(|_, _| Ok(()));
        voice.expect_leave().times(1).returning(|_| Ok(()));
        let controller = controller(node, voice);

        let err = controller.play(guild(), channel(), sample_track(0)).await.unwrap_err();

        assert!(matches!(err, MusicError::NodeCommand(_)));
        assert_eq!(controller.session_state(guild()).await, None);
    }

    #[tokio::test]
    async fn leave_reports_release_failure_after_cleanup() {
        let mut node = MockAudioNode::new();
        node.expect_acquire_player()
            .returning(|guild_id| Ok(PlayerHandle::new(guild_id, 1)));
        node.expect_render().returning(|_, _| Ok(()));
        node.expect_release()
            .returning(|player| Err(NodeError::UnknownPlayer(player.id())));
        let controller = controller(node, voice_ok());
        with_tracks(&controller, 2).await;

        assert_eq!(
            controller.leave(guild()).await,
            Err(MusicError::NodeCommand(NodeError::UnknownPlayer(1)))
        );
        assert_eq!(controller.session_state(guild()).await, None);
        assert!(controller.show_queue(guild()).await.is_empty());
    }

    #[tokio::test]
    async fn play_after_failed_stop_renders_new_track() {
        let log = CallLog::default();
        let mut node = MockAudioNode::new();
        node.expect_acquire_player()
            .returning(|guild_id| Ok(PlayerHandle::new(guild_id, 1)));
        let calls_made = Arc::clone(&log);
        node.expect_render().returning(move |_, track| {
            calls_made.lock().push(format!("render {}", track.title()));
            Ok(())
        });
        node.expect_stop()
            .returning(|_| Err(NodeError::Rejected("driver gone".into())));
        let controller = controller(node, voice_ok());
        with_tracks(&controller, 1).await;

        assert!(matches!(
            controller.skip(guild(), 1).await,
            Err(MusicError::NodeCommand(NodeError::Rejected(_)))
        ));
        assert_eq!(controller.session_state(guild()).await, Some(SessionState::Playing));

        let outcome = controller.play(guild(), channel(), sample_track(9)).await.unwrap();

        assert!(matches!(outcome, PlayOutcome::Started(ref t) if t.title() == "Track 9"));
        assert_eq!(calls(&log), vec!["render Track 0", "render Track 9"]);
    }

    #[tokio::test]
    async fn play_from_another_channel_reconnects() {
        let log = CallLog::default();
        let mut voice = MockVoiceGateway::new();
        let joins = Arc::clone(&log);
        voice.expect_join().returning(move |_, channel_id| {
            joins.lock().push(format!("join {channel_id}"));
            Ok(())
        });
        voice.expect_leave().returning(|_| Ok(()));
        let controller = controller(node_ok(&log), voice);
        with_tracks(&controller, 1).await;
        controller.skip(guild(), 1).await.unwrap();

        let other = ChannelId::new(CHANNEL + 1);
        controller.play(guild(), other, sample_track(5)).await.unwrap();

        assert_eq!(
            calls(&log),
            vec!["join 7", "render Track 0", "stop", "release", "join 8", "render Track 5"]
        );
        assert_eq!(
            controller
                .sessions
                .active(guild())
                .and_then(|session| session.voice_channel_id()),
            Some(other)
        );
    }

    /// Never answers a join request.
    struct StalledJoinGateway;

    #[async_trait]
    impl VoiceGateway for StalledJoinGateway {
        async fn join(&self, _: GuildId, _: ChannelId) -> Result<(), NodeError> {
            std::future::pending::<Result<(), NodeError>>().await
        }

        async fn leave(&self, _: GuildId) -> Result<(), NodeError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn connect_timeout_destroys_session() {
        let controller = MusicController::with_limits(
            Arc::new(MockAudioNode::new()),
            Arc::new(StalledJoinGateway),
            Duration::from_millis(200),
            100,
        );

        let err = controller.play(guild(), channel(), sample_track(0)).await.unwrap_err();

        assert_eq!(err, MusicError::VoiceJoin(NodeError::Timeout(Duration::from_millis(200))));
        assert_eq!(controller.session_state(guild()).await, None);
        assert_eq!(controller.now_playing(guild()).await.unwrap().title(), "Track 0");
    }

    /// Joins fine but never hands out a player.
    struct StalledAcquireNode;

    #[async_trait]
    impl AudioNode for StalledAcquireNode {
        async fn acquire_player(&self, _: GuildId) -> Result<PlayerHandle, NodeError> {
            std::future::pending::<Result<PlayerHandle, NodeError>>().await
        }

        async fn render(&self, _: &PlayerHandle, _: &Track) -> Result<(), NodeError> {
            Ok(())
        }

        async fn set_paused(&self, _: &PlayerHandle, _: bool) -> Result<(), NodeError> {
            Ok(())
        }

        async fn stop(&self, _: &PlayerHandle) -> Result<(), NodeError> {
            Ok(())
        }

        async fn release(&self, _: &PlayerHandle) -> Result<(), NodeError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn acquisition_timeout_leaves_voice() {
        let mut voice = MockVoiceGateway::new();
        voice.expect_join().times(1).returning(|_, _| Ok(()));
        voice.expect_leave().times(1).returning(|_| Ok(()));
        let controller = controller(StalledAcquireNode, voice);

        let err = controller.play(guild(), channel(), sample_track(0)).await.unwrap_err();

        assert_eq!(
            err,
            MusicError::NodeAcquisition(NodeError::Timeout(Duration::from_millis(200)))
        );
        assert_eq!(controller.session_state(guild()).await, None);
    }

    /// Hangs forever when asked to render in one particular guild.
    struct StalledRenderNode {
        stalled: GuildId,
    }

    #[async_trait]
    impl AudioNode for StalledRenderNode {
        async fn acquire_player(&self, guild_id: GuildId) -> Result<PlayerHandle, NodeError> {
            Ok(PlayerHandle::new(guild_id, 1))
        }

        async fn render(&self, player: &PlayerHandle, _: &Track) -> Result<(), NodeError> {
            if player.guild_id() == self.stalled {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn set_paused(&self, _: &PlayerHandle, _: bool) -> Result<(), NodeError> {
            Ok(())
        }

        async fn stop(&self, _: &PlayerHandle) -> Result<(), NodeError> {
            Ok(())
        }

        async fn release(&self, _: &PlayerHandle) -> Result<(), NodeError> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stalled_guild_does_not_block_others() {
        let stalled = guild();
        let other = GuildId::new(GUILD + 1);
        let controller = Arc::new(MusicController::with_limits(
            Arc::new(StalledRenderNode { stalled }),
            Arc::new(voice_ok()),
            Duration::from_secs(5),
            100,
        ));

        let blocked = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.play(stalled, channel(), sample_track(0)).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let outcome = tokio::time::timeout(Duration::from_secs(1), async {
            controller.play(other, channel(), sample_track(1)).await.unwrap();
            controller.play(other, channel(), sample_track(2)).await.unwrap();
            controller.skip(other, 1).await.unwrap()
        })
        .await
        .expect("other guild waited on the stalled one");

        assert_eq!(outcome.now_playing.unwrap().title(), "Track 2");
        assert!(!blocked.is_finished());
        blocked.abort();
    }

    #[tokio::test]
    async fn idle_guild_state_is_released() {
        let log = CallLog::default();
        let controller = controller(node_ok(&log), voice_ok());
        let other = GuildId::new(GUILD + 1);

        assert!(controller.show_queue(other).await.is_empty());
        assert_eq!(controller.now_playing(other).await, None);
        assert_eq!(controller.skip(other, 1).await, Err(MusicError::EmptyQueue));
        assert!(controller.guild_locks.is_empty());
        assert_eq!(controller.queues.len(), 0);

        with_tracks(&controller, 2).await;
        assert_eq!(controller.guild_locks.len(), 1);

        controller.leave(guild()).await.unwrap();
        assert!(controller.guild_locks.is_empty());
        assert_eq!(controller.queues.len(), 0);
    }
}
