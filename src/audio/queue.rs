use dashmap::DashMap;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use serenity::model::id::GuildId;
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tracing::{debug, info};

use super::track::Track;

/// Ordered track list for one guild. Index 0 is the front track, the one
/// currently rendering (or about to).
#[derive(Debug)]
pub struct Queue {
    guild_id: GuildId,
    tracks: VecDeque<Track>,
}

impl Queue {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            tracks: VecDeque::new(),
        }
    }

    /// Appends a track to the back of the queue.
    pub fn enqueue(&mut self, track: Track) {
        debug!("➕ [{}] Queued: {}", self.guild_id, track);
        self.tracks.push_back(track);
    }

    /// Removes up to `count` tracks starting at the front and returns how
    /// many were actually removed.
    pub fn remove_front(&mut self, count: usize) -> usize {
        let removed = count.min(self.tracks.len());
        self.tracks.drain(..removed);
        debug!("⏭️ [{}] Removed {} front tracks", self.guild_id, removed);
        removed
    }

    /// Shuffles everything behind the front track. The front track never moves.
    pub fn shuffle(&mut self) {
        if self.tracks.len() <= 2 {
            return;
        }

        let mut rng = rand::thread_rng();
        self.tracks.make_contiguous()[1..].shuffle(&mut rng);
        info!("🔀 [{}] Queue shuffled", self.guild_id);
    }

    pub fn clear_keeping_current(&mut self) -> usize {
        let removed = self.tracks.len().saturating_sub(1);
        self.tracks.truncate(1);
        removed
    }

    pub fn clear_all(&mut self) -> usize {
        let removed = self.tracks.len();
        self.tracks.clear();
        removed
    }

    pub fn front(&self) -> Option<&Track> {
        self.tracks.front()
    }

    /// Everything after the front track, in play order.
    pub fn upcoming(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().skip(1)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn total_duration(&self) -> Duration {
        self.tracks.iter().map(Track::duration).sum()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            now_playing: self.front().cloned(),
            upcoming: self.upcoming().cloned().collect(),
            total_duration: self.total_duration(),
        }
    }
}

/// Read-only copy of a queue handed out to command handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    pub now_playing: Option<Track>,
    pub upcoming: Vec<Track>,
    pub total_duration: Duration,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.now_playing.is_none()
    }

    /// One page of the upcoming tracks (1-indexed) and the page count.
    pub fn page(&self, page: usize, items_per_page: usize) -> (&[Track], usize) {
        let items_per_page = items_per_page.max(1);
        let total_pages = self.upcoming.len().div_ceil(items_per_page).max(1);
        let page = page.clamp(1, total_pages);
        let start = (page - 1) * items_per_page;
        let end = (start + items_per_page).min(self.upcoming.len());

        (&self.upcoming[start..end], total_pages)
    }
}

/// Guild id → queue registry. Queues are created on first reference.
#[derive(Debug, Default)]
pub struct QueueStore {
    queues: DashMap<GuildId, Arc<RwLock<Queue>>>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild_id: GuildId) -> Arc<RwLock<Queue>> {
        self.queues
            .entry(guild_id)
            .or_insert_with(|| Arc::new(RwLock::new(Queue::new(guild_id))))
            .clone()
    }

    /// Drops the guild's queue if it holds no tracks. Returns whether it was removed.
    pub fn remove_if_empty(&self, guild_id: GuildId) -> bool {
        self.queues
            .remove_if(&guild_id, |_, queue| queue.read().is_empty())
            .is_some()
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.queues.contains_key(&guild_id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.queues.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::track::sample_track;
    use pretty_assertions::assert_eq;

    fn queue_with(n: u64) -> Queue {
        let mut queue = Queue::new(GuildId::new(1));
        for i in 0..n {
            queue.enqueue(sample_track(i));
        }
        queue
    }

    fn titles(queue: &Queue) -> Vec<String> {
        queue.tracks.iter().map(|t| t.title().to_string()).collect()
    }

    #[test]
    fn remove_front_drops_prefix() {
        for len in 0..5u64 {
            for k in 1..7usize {
                let mut queue = queue_with(len);
                let expected: Vec<String> = titles(&queue)
                    .into_iter()
                    .skip(k.min(len as usize))
                    .collect();

                let removed = queue.remove_front(k);

                assert_eq!(removed, k.min(len as usize));
                assert_eq!(titles(&queue), expected);
            }
        }
    }

    #[test]
    fn shuffle_keeps_front_and_permutes_tail() {
        let mut queue = queue_with(20);
        let mut before_tail: Vec<String> = titles(&queue).into_iter().skip(1).collect();

        for _ in 0..10 {
            queue.shuffle();

            let after = titles(&queue);
            assert_eq!(after.len(), 20);
            assert_eq!(after[0], "Track 0");

            let mut after_tail: Vec<String> = after.into_iter().skip(1).collect();
            after_tail.sort();
            before_tail.sort();
            assert_eq!(after_tail, before_tail);
        }
    }

    #[test]
    fn shuffle_is_noop_for_two_or_fewer() {
        let mut queue = queue_with(2);
        queue.shuffle();
        assert_eq!(titles(&queue), vec!["Track 0", "Track 1"]);
    }

    #[test]
    fn clear_keeping_current_leaves_front() {
        let mut queue = queue_with(3);
        assert_eq!(queue.clear_keeping_current(), 2);
        assert_eq!(titles(&queue), vec!["Track 0"]);

        let mut empty = queue_with(0);
        assert_eq!(empty.clear_keeping_current(), 0);
        assert!(empty.is_empty());
    }

    #[test]
    fn clear_all_empties() {
        let mut queue = queue_with(4);
        assert_eq!(queue.clear_all(), 4);
        assert!(queue.is_empty());
        assert!(queue.front().is_none());
    }

    #[test]
    fn snapshot_splits_front_and_upcoming() {
        let queue = queue_with(3);
        let snapshot = queue.snapshot();

        assert_eq!(snapshot.now_playing.as_ref(), queue.front());
        assert_eq!(snapshot.upcoming.len(), 2);
        assert_eq!(snapshot.upcoming[0].title(), "Track 1");
        assert_eq!(snapshot.total_duration, Duration::from_secs(180 + 181 + 182));
    }

    #[test]
    fn snapshot_pages_are_clamped() {
        let snapshot = queue_with(12).snapshot();

        let (items, total_pages) = snapshot.page(1, 5);
        assert_eq!(total_pages, 3);
        assert_eq!(items[0].title(), "Track 1");

        let (items, _) = snapshot.page(99, 5);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title(), "Track 11");
    }

    #[test]
    fn store_creates_lazily_and_prunes_empty() {
        let store = QueueStore::new();
        let guild = GuildId::new(7);

        let queue = store.get(guild);
        assert_eq!(store.len(), 1);

        queue.write().enqueue(sample_track(1));
        assert!(!store.remove_if_empty(guild));
        assert_eq!(store.get(guild).read().len(), 1);

        queue.write().clear_all();
        assert!(store.remove_if_empty(guild));
        assert_eq!(store.len(), 0);
    }
}
