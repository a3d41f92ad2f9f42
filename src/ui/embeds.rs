use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{
    controller::{PlayOutcome, SkipOutcome},
    error::MusicError,
    queue::QueueSnapshot,
    track::Track,
};

/// Colour palette shared by every embed.
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

const STANDARD_FOOTER: &str = "🎵 Uncord Music";
pub const QUEUE_PAGE_SIZE: usize = 10;

pub fn create_now_playing_embed(track: &Track) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Now Playing")
        .description(format!("**{}**", track.title()))
        .color(colors::MUSIC_PURPLE)
        .field("🎤 Artist", track.author(), true)
        .field("⏱️ Duration", duration_label(track.duration()), true)
        .field("👤 Requested by", format!("<@{}>", track.requester()), true)
        .url(track.uri())
        .timestamp(requested_timestamp(track))
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn requested_timestamp(track: &Track) -> Timestamp {
    Timestamp::from_unix_timestamp(track.requested_at().timestamp())
        .unwrap_or_else(|_| Timestamp::now())
}

pub fn create_play_embed(outcome: &PlayOutcome) -> CreateEmbed {
    match outcome {
        PlayOutcome::Started(track) => create_now_playing_embed(track),
        PlayOutcome::Queued { track, position } => CreateEmbed::default()
            .title("✅ Added to Queue")
            .description(format!("**{}** by {}", track.title(), track.author()))
            .color(colors::SUCCESS_GREEN)
            .field("📍 Position", position.to_string(), true)
            .field("⏱️ Duration", duration_label(track.duration()), true)
            .url(track.uri())
            .timestamp(Timestamp::now())
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER)),
    }
}

pub fn create_skip_embed(outcome: &SkipOutcome) -> CreateEmbed {
    let noun = if outcome.skipped == 1 { "track" } else { "tracks" };
    let description = match &outcome.now_playing {
        Some(track) => format!(
            "Skipped {} {}.\n\n▶️ Now playing: **{}**",
            outcome.skipped, noun, track
        ),
        None => format!(
            "Skipped {} {}.\n\n📭 The queue is now empty.",
            outcome.skipped, noun
        ),
    };

    create_success_embed("Skipped", &description)
}

/// Lists the upcoming tracks as `N. title by author`.
pub fn create_queue_embed(snapshot: &QueueSnapshot, page: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Music Queue")
        .color(colors::INFO_BLUE);

    let Some(current) = &snapshot.now_playing else {
        return embed
            .description("😴 **The queue is currently empty.**\n\n💡 Use `/play <song>` to add music")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    };

    embed = embed.field(
        "▶️ Now Playing",
        format!("**{}** - {}", current.title(), current.author()),
        false,
    );

    let (items, total_pages) = snapshot.page(page, QUEUE_PAGE_SIZE);
    let page = page.clamp(1, total_pages);

    if items.is_empty() {
        embed = embed.field("Up Next", "Nothing else queued.", false);
    } else {
        let offset = (page - 1) * QUEUE_PAGE_SIZE;
        let listing: String = items
            .iter()
            .enumerate()
            .map(|(i, track)| {
                format!(
                    "{}. {} by {} `[{}]`\n",
                    offset + i + 1,
                    track.title(),
                    track.author(),
                    format_duration(track.duration())
                )
            })
            .collect();

        embed = embed.field("Up Next", listing, false);
    }

    embed = embed.field(
        "Info",
        format!(
            "**Total:** {} tracks • **Duration:** {}",
            snapshot.upcoming.len() + 1,
            humantime::format_duration(snapshot.total_duration)
        ),
        false,
    );

    let footer = if total_pages > 1 {
        format!("Page {} of {} • {}", page, total_pages, STANDARD_FOOTER)
    } else {
        STANDARD_FOOTER.to_string()
    };

    embed
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

/// Renders a controller error. Problems with the request are warnings,
/// failures of the voice or audio backend are errors.
pub fn create_music_error_embed(err: &MusicError) -> CreateEmbed {
    if err.is_user_facing() {
        create_warning_embed("Heads up", &err.to_string())
    } else {
        create_error_embed("Something went wrong", &err.to_string())
    }
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_warning_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("⚠️ {}", title))
        .description(description)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn duration_label(duration: Duration) -> String {
    if duration.is_zero() {
        "🔴 Live".to_string()
    } else {
        format_duration(duration)
    }
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
