use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod sources;
mod ui;

use crate::audio::{
    controller::MusicController,
    songbird_node::{SongbirdGateway, SongbirdNode},
};
use crate::bot::MusicBot;
use crate::config::Config;
use crate::sources::TrackResolver;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("uncord_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Uncord Music v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("⚙️ {}", config.summary());

    let songbird = Songbird::serenity();
    let http = reqwest::Client::new();

    // Node disconnects flow back into the controller through this channel
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let node = Arc::new(SongbirdNode::new(
        Arc::clone(&songbird),
        http.clone(),
        events_tx,
        config.default_volume,
    ));
    let voice = Arc::new(SongbirdGateway::new(Arc::clone(&songbird)));

    let controller = Arc::new(MusicController::new(node, voice, &config));
    tokio::spawn(Arc::clone(&controller).run_events(events_rx));

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = MusicBot::new(config.clone(), controller, TrackResolver::new(http));

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, exiting...");
        std::process::exit(0);
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
