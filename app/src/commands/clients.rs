use crate::clients::{CachedClient, SessionState};
use crate::{Context, Error};
use chrono::Utc;
use poise::serenity_prelude::{Color, CreateEmbed, GuildId};
use poise::CreateReply;

/// Manage the cached bot clients
#[poise::command(
    slash_command,
    owners_only,
    ephemeral,
    subcommands("sweep", "refresh", "list")
)]
pub async fn clients(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Evict clients whose vanity token has changed
#[poise::command(slash_command, owners_only, ephemeral)]
pub async fn sweep(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let report = ctx.data().control.request_sweep().await?;

    let evicted = if report.evicted.is_empty() {
        "none".to_string()
    } else {
        report
            .evicted
            .iter()
            .map(|id| format!("`{id}`"))
            .collect::<Vec<_>>()
            .join(", ")
    };

    ctx.say(format!(
        "Checked {} vanity clients, evicted: {}",
        report.checked, evicted
    ))
    .await?;
    Ok(())
}

/// Reload the client for a guild after its vanity token changed
#[poise::command(slash_command, owners_only, ephemeral)]
pub async fn refresh(
    ctx: Context<'_>,
    #[description = "Guild ID to refresh"] guild_id: String,
) -> Result<(), Error> {
    let guild_id = parse_guild_id(&guild_id).ok_or("That is not a valid guild ID")?;
    ctx.data().control.notify_credential_changed(guild_id)?;
    ctx.say(format!("Refreshing the client for `{guild_id}`")).await?;
    Ok(())
}

/// Show every cached client
#[poise::command(slash_command, owners_only, ephemeral)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let cached = ctx.data().control.snapshot().await?;

    let mut embed = CreateEmbed::default()
        .title("Cached clients")
        .color(Color::from_rgb(255, 255, 255))
        .timestamp(Utc::now());

    if cached.is_empty() {
        embed = embed.description("No clients have been created yet.");
    }
    for client in cached.iter().take(25) {
        let (name, value) = describe(client);
        embed = embed.field(name, value, true);
    }

    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

fn parse_guild_id(raw: &str) -> Option<GuildId> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .map(GuildId::new)
}

fn describe(client: &CachedClient) -> (String, String) {
    let name = match client.guild_id {
        Some(id) => format!("Guild {id}"),
        None => "Default".to_string(),
    };
    let state = match client.state {
        SessionState::Pending => "⏳ logging in",
        SessionState::Ready => "🟢 ready",
        SessionState::Failed => "🔴 login failed",
    };
    (
        name,
        format!("{state}\ncreated <t:{}:R>", client.created_at.timestamp()),
    )
}
