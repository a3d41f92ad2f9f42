use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::{fmt, time::Duration};

/// A playable item as handed to the audio node.
///
/// Fields are private so a track cannot change once it sits in a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    uri: String,
    title: String,
    author: String,
    duration: Duration,
    requester: UserId,
    requested_at: DateTime<Utc>,
}

impl Track {
    pub fn new(
        uri: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
        duration: Duration,
        requester: UserId,
    ) -> Self {
        Self {
            uri: uri.into(),
            title: title.into(),
            author: author.into(),
            // Millisecond precision is all the node reports
            duration: Duration::from_millis(duration.as_millis() as u64),
            requester,
            requested_at: Utc::now(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn requester(&self) -> UserId {
        self.requester
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} by {}", self.title, self.author)
    }
}

#[cfg(test)]
pub(crate) fn sample_track(n: u64) -> Track {
    Track::new(
        format!("https://example.com/track/{n}"),
        format!("Track {n}"),
        "Test Artist",
        Duration::from_secs(180 + n),
        UserId::new(1000 + n),
    )
}
