use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        clearqueue_command(),
        shuffle_command(),
        leave_command(),
        nowplaying_command(),
        queue_command(),
        player_command(),
    ]
}

/// Registers every command globally.
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registers every command for a single guild (development).
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Playback

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play a song or add it to the queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "URL or search term")
                .required(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause the current song")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume the paused song")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip")
        .description("Skip the current song")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "amount",
                "Number of songs to skip",
            )
            .min_int_value(1),
        )
}

// Queue

fn clearqueue_command() -> CreateCommand {
    CreateCommand::new("clearqueue").description("Remove every upcoming song from the queue")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Shuffle the upcoming songs")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Show the music queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Page number")
                .min_int_value(1),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Show the song that is playing")
}

// Session

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Stop playback, clear the queue and leave voice")
}

fn player_command() -> CreateCommand {
    CreateCommand::new("player").description("Post the player control panel")
}
