use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use poise::FrameworkContext;
use poise::serenity_prelude as serenity;
use serenity::all::{GuildId, Member, RoleId, User};
use serenity::prelude::Context;

use crate::auth::role_snapshot;
use crate::state::AppState;

pub async fn event_handler(
    ctx: &Context,
    event: &serenity::FullEvent,
    _framework: FrameworkContext<'_, Arc<AppState>, anyhow::Error>,
    state: &Arc<AppState>,
) -> Result<()> {
    use serenity::FullEvent::*;
    match event {
        Ready { data_about_bot, .. } => handle_ready(state, data_about_bot),
        GuildMemberAddition { new_member } => on_join(ctx, state, new_member).await?,
        GuildMemberRemoval { guild_id, user, .. } => on_leave(ctx, state, *guild_id, user).await?,
        _ => {}
    }
    Ok(())
}

fn handle_ready(state: &AppState, ready: &serenity::Ready) {
    tracing::info!(
        "Connected as {} in {} guild(s), {} global owner(s)",
        ready.user.name,
        ready.guilds.len(),
        state.owners.len()
    );
}

/// Current role ids of a guild, from the cache when possible.
async fn guild_roles(ctx: &Context, guild_id: GuildId) -> Result<HashSet<RoleId>> {
    if let Some(roles) = ctx.cache.guild(guild_id).map(|g| role_snapshot(&g)) {
        return Ok(roles);
    }
    Ok(guild_id.roles(&ctx.http).await?.into_keys().collect())
}

/// Join: hand out the guild's autoroles.
pub async fn on_join(ctx: &Context, state: &AppState, member: &Member) -> Result<()> {
    let guild_id = member.guild_id;
    let roles = guild_roles(ctx, guild_id).await?;
    let autoroles = state.autoroles().list(guild_id, &roles).await?;
    if autoroles.items.is_empty() {
        return Ok(());
    }

    if let Err(e) = member.add_roles(&ctx.http, &autoroles.items).await {
        tracing::warn!(
            "Failed to assign autoroles to {} in guild {guild_id}: {e}",
            member.user.id
        );
    }
    Ok(())
}

/// Leave: post the configured leave message, if any.
pub async fn on_leave(
    ctx: &Context,
    state: &AppState,
    guild_id: GuildId,
    user: &User,
) -> Result<()> {
    let Some(leave) = state.config().leave_message(guild_id).await? else {
        return Ok(());
    };

    let text = leave.render(&format!("<@{}>", user.id.get()));
    if let Err(e) = leave.channel_id.say(&ctx.http, text).await {
        tracing::warn!(
            "Failed to post leave message in {} for guild {guild_id}: {e}",
            leave.channel_id
        );
    }
    Ok(())
}
