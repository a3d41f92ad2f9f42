//! Resolves what a user typed after `/play` into a [`Track`].
//!
//! URLs are looked up directly, anything else goes through a yt-dlp search
//! and the first hit wins.

use anyhow::{Context, Result};
use serenity::model::id::UserId;
use songbird::input::{AuxMetadata, Compose, YoutubeDl};
use tracing::{debug, info};

use crate::audio::track::Track;

const UNKNOWN_TITLE: &str = "Unknown title";
const UNKNOWN_AUTHOR: &str = "Unknown artist";

#[derive(Clone)]
pub struct TrackResolver {
    http: reqwest::Client,
}

impl TrackResolver {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub async fn resolve(&self, query: &str, requester: UserId) -> Result<Track> {
        let query = query.trim();
        if query.is_empty() {
            anyhow::bail!("Search query is empty");
        }

        let mut source = if is_url(query) {
            debug!("🔗 Resolving URL: {}", query);
            YoutubeDl::new(self.http.clone(), query.to_string())
        } else {
            debug!("🔍 Searching: {}", query);
            YoutubeDl::new_search(self.http.clone(), query.to_string())
        };

        let metadata = source
            .aux_metadata()
            .await
            .with_context(|| format!("No results for `{}`", query))?;

        let track = track_from_metadata(metadata, requester)
            .with_context(|| format!("No playable result for `{}`", query))?;
        info!("✅ Resolved `{}` to {}", query, track);
        Ok(track)
    }
}

pub fn is_url(query: &str) -> bool {
    query.starts_with("https://") || query.starts_with("http://")
}

/// Builds a track from yt-dlp metadata. A result without a source URL has
/// nothing the node could stream and is rejected.
fn track_from_metadata(metadata: AuxMetadata, requester: UserId) -> Result<Track> {
    let Some(uri) = metadata.source_url else {
        anyhow::bail!("Result has no source URL");
    };
    let author = metadata
        .artist
        .or(metadata.channel)
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    Ok(Track::new(
        uri,
        metadata.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        author,
        metadata.duration.unwrap_or_default(),
        requester,
    ))
}
