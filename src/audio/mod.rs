//! # Audio Module
//!
//! Per-guild queues and playback sessions for the bot.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue Management
//! - Ordered track list per guild, index 0 is the track being rendered
//! - Shuffle that never moves the front track
//! - Lazily populated [`queue::QueueStore`]
//!
//! ### [`session`] - Playback Sessions
//! - Lifecycle state machine: Idle → Connecting → Playing ⇄ Paused → Destroyed
//! - [`session::SessionStore`] only ever holds live sessions
//!
//! ### [`controller`] - Controller
//! - The only component that mutates queues and sessions
//! - Serializes commands per guild, never across guilds
//! - Bounds every node round-trip with the configured timeout
//!
//! ### [`node`] / [`songbird_node`] - External Node
//! - Traits for the voice gateway and the audio node
//! - Songbird-backed implementations streaming through yt-dlp
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! # use std::sync::Arc;
//! # use uncord_music::audio::{controller::MusicController, track::Track};
//! # async fn example(controller: Arc<MusicController>, track: Track) -> anyhow::Result<()> {
//! use serenity::all::{ChannelId, GuildId};
//!
//! let guild_id = GuildId::new(123456789);
//!
//! controller.play(guild_id, ChannelId::new(987654321), track).await?;
//! controller.pause(guild_id).await?;
//! controller.resume(guild_id).await?;
//! controller.skip(guild_id, 1).await?;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod error;
pub mod node;
pub mod queue;
pub mod session;
pub mod songbird_node;
pub mod track;
