use crate::{Data, Error};
use poise::serenity_prelude::{self as serenity, ActivityData, OnlineStatus};
use tracing::{info, trace};

pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    _data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            info!(
                user = %data_about_bot.user.name,
                guilds = data_about_bot.guilds.len(),
                "Bot is ready"
            );
            ctx.set_presence(
                Some(ActivityData::watching("your server")),
                OnlineStatus::Idle,
            );
        }
        serenity::FullEvent::GuildCreate { guild, is_new } => {
            if *is_new == Some(true) {
                info!(guild_id = %guild.id, "Joined guild {}", guild.name);
            }
        }
        _ => trace!(event = event.snake_case_name(), "Unhandled event"),
    }
    Ok(())
}
