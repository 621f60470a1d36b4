use anyhow::Result;
use poise::serenity_prelude as serenity;
use serenity::all::{GuildId, RoleId};
use sqlx::FromRow;

use crate::audit::AuditSink;
use crate::auth::{ModrankLevel, RoleLookup};
use crate::db::{Db, parse_snowflake};
use crate::error::ConfigError;
use crate::repos::Healed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modrank {
    pub role_id: RoleId,
    pub level: ModrankLevel,
}

#[derive(Debug, FromRow)]
struct ModrankRow {
    role_id: String,
    level: i64,
}

/// Role -> modrank level, one row per (guild, role).
#[derive(Clone)]
pub struct ModranksRepo<'a> {
    db: &'a Db,
    audit: &'a dyn AuditSink,
}

impl<'a> ModranksRepo<'a> {
    pub fn new(db: &'a Db, audit: &'a dyn AuditSink) -> Self {
        Self { db, audit }
    }

    /// Lists the guild's modranks, strongest first.
    ///
    /// Rows whose role no longer exists in `roles` are deleted as part of the
    /// call and left out of the result; `Healed::repaired` counts them.
    pub async fn list(
        &self,
        guild_id: GuildId,
        roles: &impl RoleLookup,
    ) -> Result<Healed<Vec<Modrank>>> {
        let guild = guild_id.to_string();
        let rows = sqlx::query_as::<_, ModrankRow>(
            "SELECT role_id, level FROM modranks WHERE guild_id = ? ORDER BY level DESC, id ASC",
        )
        .bind(&guild)
        .fetch_all(&self.db.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        let mut repaired = 0;
        for row in rows {
            let role_id = parse_snowflake(&row.role_id).map(RoleId::new);
            match role_id {
                Some(role_id) if roles.has_role(role_id) => items.push(Modrank {
                    role_id,
                    level: ModrankLevel::from_stored(row.level),
                }),
                _ => {
                    sqlx::query("DELETE FROM modranks WHERE guild_id = ? AND role_id = ?")
                        .bind(&guild)
                        .bind(&row.role_id)
                        .execute(&self.db.pool)
                        .await?;
                    tracing::info!(
                        "Removed stale modrank for role {} in guild {guild_id}",
                        row.role_id
                    );
                    repaired += 1;
                }
            }
        }

        Ok(Healed { items, repaired })
    }

    /// Gives `role_id` exactly one level. `ModrankLevel::None` removes the entry.
    /// The audit line follows the write, and removing nothing is not audited.
    pub async fn set(
        &self,
        guild_id: GuildId,
        role_id: RoleId,
        level: ModrankLevel,
    ) -> Result<()> {
        if level == ModrankLevel::Owner {
            return Err(ConfigError::OwnerNotAssignable.into());
        }

        let guild = guild_id.to_string();
        let role = role_id.to_string();

        if level == ModrankLevel::None {
            let res = sqlx::query("DELETE FROM modranks WHERE guild_id = ? AND role_id = ?")
                .bind(guild)
                .bind(role)
                .execute(&self.db.pool)
                .await?;
            if res.rows_affected() > 0 {
                self.audit
                    .record(guild_id, format!("Removing modrank for role <@&{role_id}>"))
                    .await;
            }
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO modranks (guild_id, role_id, level)
            VALUES (?, ?, ?)
            ON CONFLICT(guild_id, role_id) DO UPDATE SET level = excluded.level
            "#,
        )
        .bind(guild)
        .bind(role)
        .bind(level.to_stored())
        .execute(&self.db.pool)
        .await?;
        self.audit
            .record(
                guild_id,
                format!("Setting modrank for role <@&{role_id}> to {level}"),
            )
            .await;
        Ok(())
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
    async fn set_replaces_previous_level() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let repo = ModranksRepo::new(&db, &audit);
        let g = GuildId::new(1);
        let r = RoleId::new(10);

        repo.set(g, r, ModrankLevel::Moderator).await.unwrap();
        repo.set(g, r, ModrankLevel::Administrator).await.unwrap();

        let listed = repo.list(g, &roles(&[10])).await.unwrap();
        assert_eq!(
            listed.items,
            vec![Modrank { role_id: r, level: ModrankLevel::Administrator }]
        );
        assert_eq!(listed.repaired, 0);
    }

    #[tokio::test]
    async fn setting_none_removes_the_entry() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let repo = ModranksRepo::new(&db, &audit);
        let g = GuildId::new(1);

        repo.set(g, RoleId::new(10), ModrankLevel::Moderator).await.unwrap();
        repo.set(g, RoleId::new(10), ModrankLevel::None).await.unwrap();

        assert!(repo.list(g, &roles(&[10])).await.unwrap().items.is_empty());
        let lines = audit.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("Removing modrank"));
    }

    #[tokio::test]
    async fn clearing_an_unranked_role_is_not_audited() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let repo = ModranksRepo::new(&db, &audit);

        repo.set(GuildId::new(1), RoleId::new(10), ModrankLevel::None).await.unwrap();
        assert!(audit.lines().is_empty());
    }

    #[tokio::test]
    async fn failed_write_is_not_audited() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let repo = ModranksRepo::new(&db, &audit);
        sqlx::query("DROP TABLE modranks").execute(&db.pool).await.unwrap();

        for level in [ModrankLevel::Moderator, ModrankLevel::None] {
            assert!(repo.set(GuildId::new(1), RoleId::new(10), level).await.is_err());
        }
        assert!(audit.lines().is_empty());
    }

    #[tokio::test]
    async fn owner_level_is_never_stored() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let repo = ModranksRepo::new(&db, &audit);

        let err = repo
            .set(GuildId::new(1), RoleId::new(10), ModrankLevel::Owner)
            .await
            .unwrap_err();
        assert_eq!(err.downcast_ref::<ConfigError>(), Some(&ConfigError::OwnerNotAssignable));
        assert!(audit.lines().is_empty());
    }

    #[tokio::test]
    async fn list_orders_strongest_first() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let repo = ModranksRepo::new(&db, &audit);
        let g = GuildId::new(1);

        repo.set(g, RoleId::new(10), ModrankLevel::Moderator).await.unwrap();
        repo.set(g, RoleId::new(20), ModrankLevel::Administrator).await.unwrap();

        let levels: Vec<_> = repo
            .list(g, &roles(&[10, 20]))
            .await
            .unwrap()
            .items
            .into_iter()
            .map(|m| m.level)
            .collect();
        assert_eq!(levels, vec![ModrankLevel::Administrator, ModrankLevel::Moderator]);
    }

    #[tokio::test]
    async fn deleted_role_is_purged_on_next_list() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let repo = ModranksRepo::new(&db, &audit);
        let g = GuildId::new(1);

        repo.set(g, RoleId::new(10), ModrankLevel::Moderator).await.unwrap();
        repo.set(g, RoleId::new(20), ModrankLevel::Administrator).await.unwrap();

        // Role 20 was deleted from the guild.
        let first = repo.list(g, &roles(&[10])).await.unwrap();
        assert_eq!(first.repaired, 1);
        assert_eq!(first.items.len(), 1);
        assert_eq!(first.items[0].role_id, RoleId::new(10));

        // Even if the role reappears in the lookup, the row is gone.
        let second = repo.list(g, &roles(&[10, 20])).await.unwrap();
        assert_eq!(second.repaired, 0);
        assert_eq!(second.items.len(), 1);
    }

    #[tokio::test]
    async fn corrupted_level_fails_closed() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let repo = ModranksRepo::new(&db, &audit);

        sqlx::query("INSERT INTO modranks (guild_id, role_id, level) VALUES ('1', '10', 99)")
            .execute(&db.pool)
            .await
            .unwrap();

        let listed = repo.list(GuildId::new(1), &roles(&[10])).await.unwrap();
        assert_eq!(listed.items[0].level, ModrankLevel::None);
    }

    #[tokio::test]
    async fn other_guilds_are_untouched() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let repo = ModranksRepo::new(&db, &audit);

        repo.set(GuildId::new(1), RoleId::new(10), ModrankLevel::Moderator).await.unwrap();
        repo.set(GuildId::new(2), RoleId::new(10), ModrankLevel::Administrator)
            .await
            .unwrap();

        // Healing guild 1 with an empty role set must not affect guild 2.
        assert_eq!(repo.list(GuildId::new(1), &roles(&[])).await.unwrap().repaired, 1);
        let other = repo.list(GuildId::new(2), &roles(&[10])).await.unwrap();
        assert_eq!(other.items[0].level, ModrankLevel::Administrator);
    }
}
