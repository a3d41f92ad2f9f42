use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandDataOptionValue, CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info, warn};

use crate::{
    audio::error::MusicError,
    bot::MusicBot,
    ui::{
        buttons::{self, button_ids},
        embeds,
    },
};

/// Dispatches a slash command.
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &MusicBot,
) -> Result<()> {
    info!(
        "📝 /{} used by {} in guild {:?}",
        command.data.name, command.user.name, command.guild_id
    );

    let Some(guild_id) = command.guild_id else {
        let embed = error_embed(&MusicError::GuildResolution);
        return respond(ctx, &command, embed).await;
    };

    let result = match command.data.name.as_str() {
        "play" => return handle_play(ctx, &command, bot, guild_id).await,
        "player" => return handle_player(ctx, &command, bot, guild_id).await,
        "pause" => handle_pause(bot, guild_id).await,
        "resume" => handle_resume(bot, guild_id).await,
        "skip" => {
            let amount = integer_option(&command, "amount").unwrap_or(1);
            handle_skip(bot, guild_id, amount).await
        }
        "clearqueue" => handle_clear_queue(bot, guild_id).await,
        "shuffle" => handle_shuffle(bot, guild_id).await,
        "leave" => handle_leave(bot, guild_id).await,
        "nowplaying" => Ok(handle_nowplaying(bot, guild_id).await),
        "queue" => {
            let page = integer_option(&command, "page").unwrap_or(1);
            Ok(embeds::create_queue_embed(
                &bot.controller.show_queue(guild_id).await,
                page,
            ))
        }
        _ => Ok(embeds::create_error_embed(
            "Unknown command",
            "This command is not recognised.",
        )),
    };

    let embed = result.unwrap_or_else(|err| error_embed(&err));
    respond(ctx, &command, embed).await
}

/// Dispatches a control-panel button press.
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &MusicBot,
) -> Result<()> {
    info!(
        "🔘 Button {} pressed by {} in guild {:?}",
        component.data.custom_id, component.user.name, component.guild_id
    );

    let Some(guild_id) = component.guild_id else {
        return respond_ephemeral(ctx, &component, error_embed(&MusicError::GuildResolution))
            .await;
    };

    let result = match component.data.custom_id.as_str() {
        button_ids::PAUSE => handle_pause(bot, guild_id).await,
        button_ids::RESUME => handle_resume(bot, guild_id).await,
        button_ids::SKIP => handle_skip(bot, guild_id, 1).await,
        button_ids::SHUFFLE => handle_shuffle(bot, guild_id).await,
        button_ids::LEAVE => handle_leave(bot, guild_id).await,
        other => {
            debug!("Ignoring unknown component {}", other);
            Ok(embeds::create_error_embed(
                "Unknown action",
                "This button is not recognised.",
            ))
        }
    };

    match result {
        Ok(embed) => {
            let state = bot.controller.session_state(guild_id).await;
            component
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::UpdateMessage(
                        CreateInteractionResponseMessage::new()
                            .embed(embed)
                            .components(buttons::create_player_controls(state)),
                    ),
                )
                .await?;
            Ok(())
        }
        Err(err) => respond_ephemeral(ctx, &component, error_embed(&err)).await,
    }
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query not provided"))?;

    let Some(channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        let embed = embeds::create_warning_embed(
            "Not in a voice channel",
            "Join a voice channel first, then use `/play` again.",
        );
        return respond(ctx, command, embed).await;
    };

    // Resolving and connecting can take longer than the interaction window
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let track = match bot.resolver.resolve(query, command.user.id).await {
        Ok(track) => track,
        Err(e) => {
            warn!("🔍 Could not resolve `{}`: {:?}", query, e);
            let embed = embeds::create_warning_embed(
                "No results",
                &format!("Couldn't find anything for `{}`.", query),
            );
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
                .await?;
            return Ok(());
        }
    };

    let embed = match bot.controller.play(guild_id, channel_id, track).await {
        Ok(outcome) => embeds::create_play_embed(&outcome),
        Err(err) => error_embed(&err),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_player(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let state = bot.controller.session_state(guild_id).await;
    let embed = handle_nowplaying(bot, guild_id).await;

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .components(buttons::create_player_controls(state)),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_pause(bot: &MusicBot, guild_id: GuildId) -> Result<CreateEmbed, MusicError> {
    let embed = if bot.controller.pause(guild_id).await? {
        embeds::create_success_embed("Paused", "⏸️ Playback paused.")
    } else {
        embeds::create_info_embed("⏸️ Already paused", "Use `/resume` to continue.")
    };
    Ok(embed)
}

async fn handle_resume(bot: &MusicBot, guild_id: GuildId) -> Result<CreateEmbed, MusicError> {
    let embed = if bot.controller.resume(guild_id).await? {
        embeds::create_success_embed("Resumed", "▶️ Playback resumed.")
    } else {
        embeds::create_info_embed("▶️ Already playing", "Nothing to resume.")
    };
    Ok(embed)
}

async fn handle_skip(
    bot: &MusicBot,
    guild_id: GuildId,
    amount: usize,
) -> Result<CreateEmbed, MusicError> {
    let outcome = bot.controller.skip(guild_id, amount).await?;
    Ok(embeds::create_skip_embed(&outcome))
}

async fn handle_clear_queue(bot: &MusicBot, guild_id: GuildId) -> Result<CreateEmbed, MusicError> {
    let removed = bot.controller.clear_queue(guild_id).await?;
    Ok(embeds::create_success_embed(
        "Queue cleared",
        &format!("🗑️ Removed {} upcoming tracks.", removed),
    ))
}

async fn handle_shuffle(bot: &MusicBot, guild_id: GuildId) -> Result<CreateEmbed, MusicError> {
    let shuffled = bot.controller.shuffle(guild_id).await?;
    Ok(embeds::create_success_embed(
        "Shuffled",
        &format!("🔀 Shuffled {} upcoming tracks.", shuffled),
    ))
}

async fn handle_leave(bot: &MusicBot, guild_id: GuildId) -> Result<CreateEmbed, MusicError> {
    let removed = bot.controller.leave(guild_id).await?;
    Ok(embeds::create_success_embed(
        "Disconnected",
        &format!("👋 Left the voice channel and cleared {} tracks.", removed),
    ))
}

async fn handle_nowplaying(bot: &MusicBot, guild_id: GuildId) -> CreateEmbed {
    match bot.controller.now_playing(guild_id).await {
        Some(track) => embeds::create_now_playing_embed(&track),
        None => embeds::create_info_embed(
            "🔇 Nothing playing",
            "Use `/play <song>` to start the music.",
        ),
    }
}

fn error_embed(err: &MusicError) -> CreateEmbed {
    if err.is_user_facing() {
        debug!("Request rejected: {}", err);
    } else {
        warn!("❌ Command failed: {}", err);
    }
    embeds::create_music_error_embed(err)
}

async fn respond(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

async fn respond_ephemeral(
    ctx: &Context,
    component: &ComponentInteraction,
    embed: CreateEmbed,
) -> Result<()> {
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<usize> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| match opt.value {
            CommandDataOptionValue::Integer(value) => usize::try_from(value).ok(),
            _ => None,
        })
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
