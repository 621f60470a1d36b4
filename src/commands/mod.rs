use std::collections::HashSet;

use anyhow::Result;
use poise::serenity_prelude as serenity;
use serenity::all::RoleId;

use crate::auth::{AuthSubject, Authorization, ModrankLevel, role_snapshot};
use crate::state::{Ctx, shared_memberships};

pub mod autorole;
pub mod say;
pub mod settings;
pub mod standing;

/// The invoking member and the guild's current roles, when invoked in a cached guild.
pub async fn guild_subject(ctx: Ctx<'_>) -> Option<(AuthSubject, HashSet<RoleId>)> {
    let member = ctx.author_member().await?;
    let guild = ctx.guild()?;
    let subject = AuthSubject::from_member(&member, Some(&*guild));
    let roles = role_snapshot(&guild);
    Some((subject, roles))
}

/// Resolves the caller against `required`. In DMs the caller's best standing
/// across shared guilds counts. On denial the reason is sent back and `false`
/// is returned.
pub async fn require_level(ctx: Ctx<'_>, required: ModrankLevel) -> Result<bool> {
    let authorizer = ctx.data().authorizer();

    let verdict = if ctx.guild_id().is_some() {
        match guild_subject(ctx).await {
            Some((subject, roles)) => authorizer.is_authorized(&subject, &roles, required).await?,
            None => Authorization::Denied("Could not resolve your server membership.".into()),
        }
    } else {
        let user_id = ctx.author().id;
        let memberships = shared_memberships(&ctx.serenity_context().cache, user_id);
        authorizer
            .is_authorized_anywhere(user_id, &memberships, required)
            .await?
    };

    if let Some(msg) = verdict.message() {
        ctx.say(msg).await?;
    }
    Ok(verdict.is_granted())
}
