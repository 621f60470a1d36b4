//! Modrank levels and the resolver that decides who may change what.
//!
//! A member's level is, in order of precedence:
//! 1. `Owner` when their user id is on the bot's global owner list,
//! 2. `Administrator` when they hold the guild's native Administrator permission,
//! 3. the highest modrank among the roles they hold, where a modrank on the
//!    @everyone role applies to every member,
//! 4. `None`.

use std::collections::HashSet;
use std::fmt;

use anyhow::Result;
use poise::serenity_prelude as serenity;
use serenity::all::{Guild, GuildId, Member, Permissions, RoleId, UserId};

use crate::audit::AuditSink;
use crate::db::Db;
use crate::repos::ModranksRepo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ModrankLevel {
    #[default]
    None,
    Moderator,
    Administrator,
    Owner,
}

impl ModrankLevel {
    /// Maps a persisted level back to the scale. Anything outside the
    /// assignable range (including `Owner`, which is never stored) is `None`.
    pub fn from_stored(raw: i64) -> Self {
        match raw {
            1 => ModrankLevel::Moderator,
            2 => ModrankLevel::Administrator,
            _ => ModrankLevel::None,
        }
    }

    pub fn to_stored(self) -> i64 {
        match self {
            ModrankLevel::None => 0,
            ModrankLevel::Moderator => 1,
            ModrankLevel::Administrator => 2,
            ModrankLevel::Owner => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ModrankLevel::None => "None",
            ModrankLevel::Moderator => "Moderator",
            ModrankLevel::Administrator => "Administrator",
            ModrankLevel::Owner => "Owner",
        }
    }
}

impl fmt::Display for ModrankLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Answers whether a role still exists in a guild.
pub trait RoleLookup {
    fn has_role(&self, role_id: RoleId) -> bool;
}

impl RoleLookup for HashSet<RoleId> {
    fn has_role(&self, role_id: RoleId) -> bool {
        self.contains(&role_id)
    }
}

impl RoleLookup for Guild {
    fn has_role(&self, role_id: RoleId) -> bool {
        self.roles.contains_key(&role_id)
    }
}

/// Ownership and role permissions of a guild, enough to derive the native
/// Administrator bit.
pub trait GuildPermissions {
    fn guild_id(&self) -> GuildId;
    fn owner_id(&self) -> UserId;
    fn role_permissions(&self, role_id: RoleId) -> Option<Permissions>;
}

impl GuildPermissions for Guild {
    fn guild_id(&self) -> GuildId {
        self.id
    }

    fn owner_id(&self) -> UserId {
        self.owner_id
    }

    fn role_permissions(&self, role_id: RoleId) -> Option<Permissions> {
        self.roles.get(&role_id).map(|role| role.permissions)
    }
}

/// Role ids of a cached guild, detached from the cache lock so it can be held
/// across awaits.
pub fn role_snapshot(guild: &Guild) -> HashSet<RoleId> {
    guild.roles.keys().copied().collect()
}

/// The parts of a guild member that authorization looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSubject {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub roles: Vec<RoleId>,
    pub guild_admin: bool,
}

impl AuthSubject {
    /// Uses the interaction-resolved permissions when present, otherwise
    /// derives the Administrator bit from the cached guild.
    pub fn from_member(member: &Member, guild: Option<&Guild>) -> Self {
        Self::from_parts(
            member.guild_id,
            member.user.id,
            member.roles.clone(),
            member.permissions,
            guild,
        )
    }

    pub fn from_parts<G: GuildPermissions>(
        guild_id: GuildId,
        user_id: UserId,
        roles: Vec<RoleId>,
        resolved: Option<Permissions>,
        guild: Option<&G>,
    ) -> Self {
        let guild_admin = match (resolved, guild) {
            (Some(perms), _) => perms.administrator(),
            (None, Some(guild)) => is_guild_admin(guild, user_id, &roles),
            (None, None) => false,
        };
        Self { guild_id, user_id, roles, guild_admin }
    }

    /// Every member implicitly holds the @everyone role, whose id is the guild id.
    fn holds(&self, role_id: RoleId) -> bool {
        role_id.get() == self.guild_id.get() || self.roles.contains(&role_id)
    }
}

/// Guild owner, or any held role (including @everyone) granting Administrator.
pub fn is_guild_admin(guild: &impl GuildPermissions, user_id: UserId, roles: &[RoleId]) -> bool {
    if guild.owner_id() == user_id {
        return true;
    }
    let everyone = RoleId::new(guild.guild_id().get());
    roles
        .iter()
        .copied()
        .chain(std::iter::once(everyone))
        .filter_map(|id| guild.role_permissions(id))
        .any(|perms| perms.administrator())
}

/// Users that are `Owner` in every guild.
#[derive(Debug, Clone, Default)]
pub struct OwnerList(HashSet<UserId>);

impl OwnerList {
    pub fn new(owners: impl IntoIterator<Item = UserId>) -> Self {
        Self(owners.into_iter().collect())
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.0.contains(&user_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Granted,
    Denied(String),
}

impl Authorization {
    pub fn is_granted(&self) -> bool {
        matches!(self, Authorization::Granted)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Authorization::Granted => None,
            Authorization::Denied(msg) => Some(msg),
        }
    }
}

pub struct Authorizer<'a> {
    db: &'a Db,
    audit: &'a dyn AuditSink,
    owners: &'a OwnerList,
}

impl<'a> Authorizer<'a> {
    pub fn new(db: &'a Db, audit: &'a dyn AuditSink, owners: &'a OwnerList) -> Self {
        Self { db, audit, owners }
    }

    /// Reads the guild's modranks, which purges modranks for deleted roles.
    pub async fn resolve_level(
        &self,
        subject: &AuthSubject,
        roles: &impl RoleLookup,
    ) -> Result<ModrankLevel> {
        if self.owners.contains(subject.user_id) {
            return Ok(ModrankLevel::Owner);
        }
        if subject.guild_admin {
            return Ok(ModrankLevel::Administrator);
        }

        let modranks = ModranksRepo::new(self.db, self.audit)
            .list(subject.guild_id, roles)
            .await?;
        Ok(modranks
            .items
            .iter()
            .filter(|m| subject.holds(m.role_id))
            .map(|m| m.level)
            .max()
            .unwrap_or(ModrankLevel::None))
    }

    pub async fn is_authorized(
        &self,
        subject: &AuthSubject,
        roles: &impl RoleLookup,
        required: ModrankLevel,
    ) -> Result<Authorization> {
        let level = self.resolve_level(subject, roles).await?;
        Ok(check(level, required))
    }

    /// Best standing across every guild the user shares with the bot, for
    /// contexts outside a guild such as DMs. One resolution per membership.
    pub async fn resolve_best_level<L: RoleLookup>(
        &self,
        user_id: UserId,
        memberships: &[(AuthSubject, L)],
    ) -> Result<ModrankLevel> {
        if self.owners.contains(user_id) {
            return Ok(ModrankLevel::Owner);
        }
        let mut best = ModrankLevel::None;
        for (subject, roles) in memberships {
            best = best.max(self.resolve_level(subject, roles).await?);
        }
        Ok(best)
    }

    pub async fn is_authorized_anywhere<L: RoleLookup>(
        &self,
        user_id: UserId,
        memberships: &[(AuthSubject, L)],
        required: ModrankLevel,
    ) -> Result<Authorization> {
        let level = self.resolve_best_level(user_id, memberships).await?;
        Ok(check(level, required))
    }
}

fn check(level: ModrankLevel, required: ModrankLevel) -> Authorization {
    if level >= required {
        Authorization::Granted
    } else {
        Authorization::Denied(format!("This action requires at least {required} modrank"))
    }
}
