use anyhow::Result;
use poise::serenity_prelude as serenity;
use serenity::all::RoleId;

use crate::auth::ModrankLevel;
use crate::commands::{guild_subject, require_level};
use crate::db::parse_snowflake;
use crate::state::Ctx;

/// `/autorole` parent: roles given to every member on join.
#[poise::command(
    slash_command,
    guild_only,
    subcommands("autorole_add", "autorole_remove", "autorole_list"),
    rename = "autorole"
)]
pub async fn autorole(_: Ctx<'_>) -> Result<()> {
    Ok(())
}

/// Give this role to every member who joins
#[poise::command(slash_command, guild_only, ephemeral, rename = "add")]
pub async fn autorole_add(
    ctx: Ctx<'_>,
    #[description = "The role"] role: serenity::Role,
) -> Result<()> {
    if !require_level(ctx, ModrankLevel::Administrator).await? {
        return Ok(());
    }
    let Some(gid) = ctx.guild_id() else {
        return Ok(());
    };

    let repo = ctx.data().autoroles();
    if repo.has(gid, role.id).await? {
        ctx.say(format!("<@&{}> is already an autorole.", role.id.get())).await?;
        return Ok(());
    }
    repo.add(gid, role.id).await?;
    ctx.say(format!("✅ Added autorole <@&{}>", role.id.get())).await?;
    Ok(())
}

/// Stop giving a role to new members
///
/// Pass `role_id` to remove an autorole whose role was already deleted.
#[poise::command(slash_command, guild_only, ephemeral, rename = "remove")]
pub async fn autorole_remove(
    ctx: Ctx<'_>,
    #[description = "The role"] role: Option<serenity::Role>,
    #[description = "Raw id of a role that no longer exists"] role_id: Option<String>,
) -> Result<()> {
    if !require_level(ctx, ModrankLevel::Administrator).await? {
        return Ok(());
    }
    let Some(gid) = ctx.guild_id() else {
        return Ok(());
    };

    let target: RoleId = match (role, role_id.as_deref()) {
        (Some(role), _) => role.id,
        (None, Some(raw)) => match parse_snowflake(raw) {
            Some(id) => RoleId::new(id),
            None => {
                ctx.say(format!("❌ `{raw}` is not a role id.")).await?;
                return Ok(());
            }
        },
        (None, None) => {
            ctx.say("❌ Pick a role or pass a role id.").await?;
            return Ok(());
        }
    };

    if ctx.data().autoroles().remove(gid, target).await? {
        ctx.say(format!("✅ Removed autorole {}", target.get())).await?;
    } else {
        ctx.say(format!("{} was not an autorole.", target.get())).await?;
    }
    Ok(())
}

/// List autoroles
#[poise::command(slash_command, guild_only, ephemeral, rename = "list")]
pub async fn autorole_list(ctx: Ctx<'_>) -> Result<()> {
    if !require_level(ctx, ModrankLevel::Moderator).await? {
        return Ok(());
    }
    let Some(gid) = ctx.guild_id() else {
        return Ok(());
    };
    let Some((_, roles)) = guild_subject(ctx).await else {
        ctx.say("Server data is not available yet, try again in a moment.").await?;
        return Ok(());
    };

    let listed = ctx.data().autoroles().list(gid, &roles).await?;
    if listed.items.is_empty() {
        ctx.say("No autoroles configured.").await?;
        return Ok(());
    }

    let lines: Vec<String> = listed
        .items
        .iter()
        .map(|r| format!("• <@&{}>", r.get()))
        .collect();
    ctx.say(format!("**Autoroles**\n{}", lines.join("\n"))).await?;
    Ok(())
}
