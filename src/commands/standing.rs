use anyhow::Result;

use crate::commands::guild_subject;
use crate::state::{Ctx, shared_memberships};

/// Show your modrank level
///
/// In a DM this is your best standing in any server you share with the bot.
#[poise::command(slash_command, ephemeral)]
pub async fn standing(ctx: Ctx<'_>) -> Result<()> {
    let authorizer = ctx.data().authorizer();

    if ctx.guild_id().is_some() {
        let Some((subject, roles)) = guild_subject(ctx).await else {
            ctx.say("Could not resolve your server membership.").await?;
            return Ok(());
        };
        let level = authorizer.resolve_level(&subject, &roles).await?;
        ctx.say(format!("Your modrank here is **{level}**.")).await?;
    } else {
        let user_id = ctx.author().id;
        let memberships = shared_memberships(&ctx.serenity_context().cache, user_id);
        let level = authorizer.resolve_best_level(user_id, &memberships).await?;
        ctx.say(format!(
            "Your best modrank across {} shared server(s) is **{level}**.",
            memberships.len()
        ))
        .await?;
    }
    Ok(())
}
