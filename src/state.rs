use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use poise::serenity_prelude as serenity;
use serenity::all::RoleId;

use crate::audit::{AuditSink, ChannelAudit};
use crate::auth::{AuthSubject, Authorizer, OwnerList, role_snapshot};
use crate::db::Db;
use crate::repos::{AutorolesRepo, GuildConfig, ModranksRepo};

pub type Ctx<'a> = poise::Context<'a, Arc<AppState>, anyhow::Error>;

/// AppState: the database plus the collaborators every component is built from.
/// No SQL here.
pub struct AppState {
    pub db: Db,
    pub owners: OwnerList,
    pub audit: Arc<dyn AuditSink>,
}

impl AppState {
    pub async fn new(
        db_url: &str,
        owners: OwnerList,
        http: Arc<serenity::http::Http>,
    ) -> Result<Arc<Self>, anyhow::Error> {
        let db = crate::db::Db::connect(db_url).await?;
        let audit = Arc::new(ChannelAudit::new(http, db.clone()));
        Ok(Arc::new(Self { db, owners, audit }))
    }

    pub fn authorizer(&self) -> Authorizer<'_> {
        Authorizer::new(&self.db, self.audit.as_ref(), &self.owners)
    }

    pub fn config(&self) -> GuildConfig<'_> {
        GuildConfig::new(&self.db, self.audit.as_ref())
    }

    pub fn modranks(&self) -> ModranksRepo<'_> {
        ModranksRepo::new(&self.db, self.audit.as_ref())
    }

    pub fn autoroles(&self) -> AutorolesRepo<'_> {
        AutorolesRepo::new(&self.db, self.audit.as_ref())
    }
}

/// Every cached guild the user is a member of, as inputs for
/// `Authorizer::resolve_best_level`.
pub fn shared_memberships(
    cache: &serenity::cache::Cache,
    user_id: serenity::all::UserId,
) -> Vec<(AuthSubject, HashSet<RoleId>)> {
    cache
        .guilds()
        .into_iter()
        .filter_map(|guild_id| {
            let guild_ref = cache.guild(guild_id)?;
            let guild: &serenity::all::Guild = &guild_ref;
            let member = guild.members.get(&user_id)?;
            let subject = AuthSubject::from_member(member, Some(guild));
            let roles = role_snapshot(guild);
            Some((subject, roles))
        })
        .collect()
}
