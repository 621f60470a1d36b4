use anyhow::Result;
use poise::serenity_prelude as serenity;
use serenity::all::{GuildId, RoleId};

use crate::audit::AuditSink;
use crate::auth::RoleLookup;
use crate::db::{Db, parse_snowflake};
use crate::repos::Healed;

/// Roles handed out to every member who joins the guild.
#[derive(Clone)]
pub struct AutorolesRepo<'a> {
    db: &'a Db,
    audit: &'a dyn AuditSink,
}

impl<'a> AutorolesRepo<'a> {
    pub fn new(db: &'a Db, audit: &'a dyn AuditSink) -> Self {
        Self { db, audit }
    }

    pub async fn has(&self, guild_id: GuildId, role_id: RoleId) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM autoroles WHERE guild_id = ? AND role_id = ?",
        )
        .bind(guild_id.to_string())
        .bind(role_id.to_string())
        .fetch_one(&self.db.pool)
        .await?;
        Ok(count > 0)
    }

    /// Lists autoroles in insertion order. Roles missing from `roles` are
    /// removed while listing and counted in `Healed::repaired`.
    pub async fn list(
        &self,
        guild_id: GuildId,
        roles: &impl RoleLookup,
    ) -> Result<Healed<Vec<RoleId>>> {
        let raw_ids = sqlx::query_scalar::<_, String>(
            "SELECT role_id FROM autoroles WHERE guild_id = ? ORDER BY id ASC",
        )
        .bind(guild_id.to_string())
        .fetch_all(&self.db.pool)
        .await?;

        let mut items = Vec::with_capacity(raw_ids.len());
        let mut repaired = 0;
        for raw in raw_ids {
            match parse_snowflake(&raw).map(RoleId::new) {
                Some(role_id) if roles.has_role(role_id) => items.push(role_id),
                _ => {
                    self.delete_raw(guild_id, &raw).await?;
                    tracing::info!("Removed stale autorole {raw} in guild {guild_id}");
                    repaired += 1;
                }
            }
        }

        Ok(Healed { items, repaired })
    }

    /// Returns `false` when the role was already an autorole. Only a new
    /// membership is audited.
    pub async fn add(&self, guild_id: GuildId, role_id: RoleId) -> Result<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO autoroles (guild_id, role_id) VALUES (?, ?)
            ON CONFLICT(guild_id, role_id) DO NOTHING
            "#,
        )
        .bind(guild_id.to_string())
        .bind(role_id.to_string())
        .execute(&self.db.pool)
        .await?;
        let added = res.rows_affected() > 0;
        if added {
            self.audit
                .record(guild_id, format!("Adding autorole <@&{role_id}>"))
                .await;
        }
        Ok(added)
    }

    /// Accepts a resolved `Role` or a bare id, so roles that no longer exist
    /// in the guild can still be cleaned up.
    pub async fn remove(&self, guild_id: GuildId, role: impl Into<RoleId>) -> Result<bool> {
        let role_id = role.into();
        let removed = self.delete_raw(guild_id, &role_id.to_string()).await?;
        if removed {
            self.audit
                .record(guild_id, format!("Removing autorole {role_id}"))
                .await;
        }
        Ok(removed)
    }

    async fn delete_raw(&self, guild_id: GuildId, raw_role_id: &str) -> Result<bool> {
        let res = sqlx::query("DELETE FROM autoroles WHERE guild_id = ? AND role_id = ?")
            .bind(guild_id.to_string())
            .bind(raw_role_id)
            .execute(&self.db.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::audit::MemoryAudit;

    fn roles(ids: &[u64]) -> HashSet<RoleId> {
        ids.iter().copied().map(RoleId::new).collect()
    }

    #[tokio::test]
    async fn add_has_remove() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let repo = AutorolesRepo::new(&db, &audit);
        let g = GuildId::new(1);
        let r = RoleId::new(10);

        assert!(!repo.has(g, r).await.unwrap());
        assert!(repo.add(g, r).await.unwrap());
        assert!(repo.has(g, r).await.unwrap());
        assert!(repo.remove(g, r).await.unwrap());
        assert!(!repo.has(g, r).await.unwrap());
        assert!(!repo.remove(g, r).await.unwrap());

        assert_eq!(
            audit.lines(),
            vec!["Adding autorole <@&10>", "Removing autorole 10"]
        );
    }

    #[tokio::test]
    async fn only_effective_changes_are_audited() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let repo = AutorolesRepo::new(&db, &audit);
        let g = GuildId::new(1);

        assert!(!repo.remove(g, RoleId::new(99)).await.unwrap());
        assert!(audit.lines().is_empty());

        repo.add(g, RoleId::new(10)).await.unwrap();
        repo.add(g, RoleId::new(10)).await.unwrap();
        assert_eq!(audit.lines(), vec!["Adding autorole <@&10>"]);
    }

    #[tokio::test]
    async fn failed_write_is_not_audited() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let repo = AutorolesRepo::new(&db, &audit);
        sqlx::query("DROP TABLE autoroles").execute(&db.pool).await.unwrap();

        assert!(repo.add(GuildId::new(1), RoleId::new(10)).await.is_err());
        assert!(repo.remove(GuildId::new(1), RoleId::new(10)).await.is_err());
        assert!(audit.lines().is_empty());
    }

    #[tokio::test]
    async fn adding_twice_keeps_one_membership() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let repo = AutorolesRepo::new(&db, &audit);
        let g = GuildId::new(1);

        assert!(repo.add(g, RoleId::new(10)).await.unwrap());
        assert!(!repo.add(g, RoleId::new(10)).await.unwrap());
        assert_eq!(repo.list(g, &roles(&[10])).await.unwrap().items, vec![RoleId::new(10)]);
    }

    #[tokio::test]
    async fn list_heals_deleted_roles() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let repo = AutorolesRepo::new(&db, &audit);
        let g = GuildId::new(1);

        for id in [10, 20, 30] {
            repo.add(g, RoleId::new(id)).await.unwrap();
        }

        let first = repo.list(g, &roles(&[10, 30])).await.unwrap();
        assert_eq!(first.items, vec![RoleId::new(10), RoleId::new(30)]);
        assert_eq!(first.repaired, 1);
        assert!(!repo.has(g, RoleId::new(20)).await.unwrap());

        let second = repo.list(g, &roles(&[10, 30])).await.unwrap();
        assert_eq!(second.repaired, 0);
    }

    #[tokio::test]
    async fn remove_by_raw_id_cleans_up_unresolvable_role() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let repo = AutorolesRepo::new(&db, &audit);
        let g = GuildId::new(1);

        repo.add(g, RoleId::new(42)).await.unwrap();
        assert!(repo.remove(g, 42_u64).await.unwrap());
        assert!(repo.list(g, &roles(&[42])).await.unwrap().items.is_empty());
    }
}
