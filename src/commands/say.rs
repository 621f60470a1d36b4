use anyhow::Result;
use poise::serenity_prelude as serenity;

use crate::auth::ModrankLevel;
use crate::commands::require_level;
use crate::state::Ctx;

/// Make the bot repeat your message
///
/// Sending to another channel is a broadcast and needs the Moderator modrank.
#[poise::command(slash_command, guild_only, ephemeral)]
pub async fn say(
    ctx: Ctx<'_>,
    #[description = "The message you want the bot to repeat"] message: String,
    #[description = "The channel to send the message to"] channel: Option<serenity::ChannelId>,
) -> Result<()> {
    if channel.is_some() && !require_level(ctx, ModrankLevel::Moderator).await? {
        return Ok(());
    }

    let target = channel.unwrap_or_else(|| ctx.channel_id());
    target.say(ctx.http(), message).await?;
    ctx.say("✅ Message sent").await?;
    Ok(())
}
