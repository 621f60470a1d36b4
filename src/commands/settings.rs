use anyhow::Result;
use poise::serenity_prelude as serenity;
use serenity::all::{ChannelId, RoleId};

use crate::auth::ModrankLevel;
use crate::commands::{guild_subject, require_level};
use crate::repos::{CommandPrefix, GuildConfigSnapshot, LeaveMessage};
use crate::state::Ctx;
use crate::timezone::TimeZoneSetting;

/// Levels that can be attached to a role. `Owner` comes from the owner list only.
#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum AssignableLevel {
    #[name = "None"]
    Unranked,
    Moderator,
    Administrator,
}

impl From<AssignableLevel> for ModrankLevel {
    fn from(level: AssignableLevel) -> Self {
        match level {
            AssignableLevel::Unranked => ModrankLevel::None,
            AssignableLevel::Moderator => ModrankLevel::Moderator,
            AssignableLevel::Administrator => ModrankLevel::Administrator,
        }
    }
}

/// `/settings` parent command. All real work happens in the subcommands.
#[poise::command(
    slash_command,
    guild_only,
    subcommands(
        "settings_list",
        "settings_pin_channel",
        "settings_log_channel",
        "settings_command_prefix",
        "settings_modrank",
        "settings_leave_message",
        "settings_time_zone",
        "settings_no_xp_role"
    )
)]
pub async fn settings(_: Ctx<'_>) -> Result<()> {
    Ok(())
}

/// List all settings
#[poise::command(slash_command, guild_only, rename = "list")]
pub async fn settings_list(ctx: Ctx<'_>) -> Result<()> {
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

    let snapshot = ctx.data().config().snapshot(gid, &roles).await?;
    let embed = render_snapshot(&snapshot).title("Bot Settings");
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

fn render_snapshot(s: &GuildConfigSnapshot) -> serenity::CreateEmbed {
    let channel = |ch: Option<ChannelId>| {
        ch.map(|c| format!("<#{}>", c.get()))
            .unwrap_or_else(|| "None".to_string())
    };
    let roles = |ids: &[RoleId]| {
        if ids.is_empty() {
            "None".to_string()
        } else {
            ids.iter()
                .map(|r| format!("<@&{}>", r.get()))
                .collect::<Vec<_>>()
                .join(" ")
        }
    };
    let leave = s
        .leave_message
        .as_ref()
        .map(|m| format!("{} in <#{}>", m.template(), m.channel_id.get()))
        .unwrap_or_else(|| "None".to_string());
    let time_zone = s
        .time_zone
        .as_ref()
        .map(|tz| tz.to_string())
        .unwrap_or_else(|| "None".to_string());
    let no_xp = s
        .no_xp_role
        .map(|r| format!("<@&{}>", r.get()))
        .unwrap_or_else(|| "None".to_string());

    serenity::CreateEmbed::new()
        .field("Pin channel", channel(s.pin_channel), true)
        .field("Log channel", channel(s.log_channel), true)
        .field("Custom command prefix", s.command_prefix.as_str(), true)
        .field("Bot Administrator ranks", roles(&s.admin_roles), true)
        .field("Moderator ranks", roles(&s.moderator_roles), true)
        .field("Leave message", leave, true)
        .field("Time zone", time_zone, true)
        .field("No XP role", no_xp, true)
}

/// Set or clear the channel where the bot pins messages
#[poise::command(slash_command, guild_only, rename = "pinchannel")]
pub async fn settings_pin_channel(
    ctx: Ctx<'_>,
    #[description = "The channel (defaults to this channel)"] channel: Option<ChannelId>,
    #[description = "Clear the pin channel instead of setting it"] clear: Option<bool>,
) -> Result<()> {
    if !require_level(ctx, ModrankLevel::Administrator).await? {
        return Ok(());
    }
    let Some(gid) = ctx.guild_id() else {
        return Ok(());
    };

    let config = ctx.data().config();
    if clear.unwrap_or(false) {
        config.set_pin_channel(gid, None).await?;
        ctx.say("✅ Cleared **pin** channel.").await?;
    } else {
        let ch = channel.unwrap_or_else(|| ctx.channel_id());
        config.set_pin_channel(gid, Some(ch)).await?;
        ctx.say(format!("✅ **Pin** channel set to <#{}>.", ch.get())).await?;
    }
    Ok(())
}

/// Set or clear the channel where the bot logs configuration changes
#[poise::command(slash_command, guild_only, rename = "logchannel")]
pub async fn settings_log_channel(
    ctx: Ctx<'_>,
    #[description = "The channel (defaults to this channel)"] channel: Option<ChannelId>,
    #[description = "Clear the log channel instead of setting it"] clear: Option<bool>,
) -> Result<()> {
    if !require_level(ctx, ModrankLevel::Administrator).await? {
        return Ok(());
    }
    let Some(gid) = ctx.guild_id() else {
        return Ok(());
    };

    let config = ctx.data().config();
    if clear.unwrap_or(false) {
        config.set_log_channel(gid, None).await?;
        ctx.say("✅ Cleared **log** channel.").await?;
    } else {
        let ch = channel.unwrap_or_else(|| ctx.channel_id());
        config.set_log_channel(gid, Some(ch)).await?;
        ctx.say(format!("✅ **Log** channel set to <#{}>.", ch.get())).await?;
    }
    Ok(())
}

/// Set the command prefix for custom commands
#[poise::command(slash_command, guild_only, rename = "commandprefix")]
pub async fn settings_command_prefix(
    ctx: Ctx<'_>,
    #[description = "The prefix"] prefix: String,
) -> Result<()> {
    if !require_level(ctx, ModrankLevel::Administrator).await? {
        return Ok(());
    }
    let Some(gid) = ctx.guild_id() else {
        return Ok(());
    };

    let prefix = match CommandPrefix::new(&prefix) {
        Ok(p) => p,
        Err(e) => {
            ctx.say(format!("❌ {e}")).await?;
            return Ok(());
        }
    };
    ctx.data().config().set_command_prefix(gid, &prefix).await?;
    ctx.say(format!("✅ Command prefix set to `{}`", prefix.as_str())).await?;
    Ok(())
}

/// Change which roles the bot considers moderators and administrators
#[poise::command(slash_command, guild_only, rename = "modrank")]
pub async fn settings_modrank(
    ctx: Ctx<'_>,
    #[description = "The role"] role: serenity::Role,
    #[description = "Level of the modrank"] level: AssignableLevel,
) -> Result<()> {
    if !require_level(ctx, ModrankLevel::Administrator).await? {
        return Ok(());
    }
    let Some(gid) = ctx.guild_id() else {
        return Ok(());
    };

    let level = ModrankLevel::from(level);
    ctx.data().modranks().set(gid, role.id, level).await?;
    ctx.say(format!("✅ Modrank is now {level} for role <@&{}>", role.id.get()))
        .await?;
    Ok(())
}

/// Set or clear the message sent when a member leaves the server
#[poise::command(slash_command, guild_only, rename = "leavemessage")]
pub async fn settings_leave_message(
    ctx: Ctx<'_>,
    #[description = "The channel (defaults to this channel)"] channel: Option<ChannelId>,
    #[description = "The message. Use $user where the member should be mentioned"]
    message: Option<String>,
    #[description = "Turn the leave message off"] clear: Option<bool>,
) -> Result<()> {
    if !require_level(ctx, ModrankLevel::Administrator).await? {
        return Ok(());
    }
    let Some(gid) = ctx.guild_id() else {
        return Ok(());
    };

    let config = ctx.data().config();
    if clear.unwrap_or(false) {
        config.clear_leave_message(gid).await?;
        ctx.say("✅ Leave message turned off.").await?;
        return Ok(());
    }

    let Some(message) = message else {
        ctx.say("❌ Provide a message, or use `clear:true`.").await?;
        return Ok(());
    };
    let ch = channel.unwrap_or_else(|| ctx.channel_id());
    let leave = match LeaveMessage::new(ch, message) {
        Ok(m) => m,
        Err(e) => {
            ctx.say(format!("❌ {e}")).await?;
            return Ok(());
        }
    };

    config.set_leave_message(gid, &leave).await?;
    ctx.say(format!(
        "✅ Leave message set to {} in <#{}>",
        leave.template(),
        ch.get()
    ))
    .await?;
    Ok(())
}

/// Set the default time zone of the server
#[poise::command(slash_command, guild_only, rename = "timezone")]
pub async fn settings_time_zone(
    ctx: Ctx<'_>,
    #[description = "The time zone, e.g. UTC+2 or CET"] timezone: String,
) -> Result<()> {
    if !require_level(ctx, ModrankLevel::Administrator).await? {
        return Ok(());
    }
    let Some(gid) = ctx.guild_id() else {
        return Ok(());
    };

    let tz = match TimeZoneSetting::parse(&timezone) {
        Ok(tz) => tz,
        Err(e) => {
            ctx.say(format!("❌ {e}")).await?;
            return Ok(());
        }
    };
    ctx.data().config().set_time_zone(gid, &tz).await?;
    ctx.say(format!(
        "✅ Time zone set to {tz} (currently {})",
        tz.now().format("%H:%M")
    ))
    .await?;
    Ok(())
}

/// Set or clear the role whose members do not earn XP
#[poise::command(slash_command, guild_only, rename = "noxprole")]
pub async fn settings_no_xp_role(
    ctx: Ctx<'_>,
    #[description = "The role"] role: Option<serenity::Role>,
) -> Result<()> {
    if !require_level(ctx, ModrankLevel::Administrator).await? {
        return Ok(());
    }
    let Some(gid) = ctx.guild_id() else {
        return Ok(());
    };

    let config = ctx.data().config();
    match role {
        Some(role) => {
            config.set_no_xp_role(gid, Some(role.id)).await?;
            ctx.say(format!("✅ No XP role set to <@&{}>", role.id.get())).await?;
        }
        None => {
            config.set_no_xp_role(gid, None).await?;
            ctx.say("✅ Cleared **no XP** role.").await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignable_levels_never_include_owner() {
        for level in [
            AssignableLevel::Unranked,
            AssignableLevel::Moderator,
            AssignableLevel::Administrator,
        ] {
            assert!(ModrankLevel::from(level) < ModrankLevel::Owner);
        }
        assert_eq!(ModrankLevel::from(AssignableLevel::Unranked), ModrankLevel::None);
    }
}
