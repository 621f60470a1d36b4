use anyhow::Result;
use poise::serenity_prelude as serenity;
use serenity::all::GuildId;

use crate::db::{Db, parse_snowflake};

/// Names under which per-guild settings are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    PinChannel,
    LogChannel,
    CommandPrefix,
    NoXpRole,
    LeaveMessageChannel,
    LeaveMessageText,
    TimeZone,
}

impl SettingKey {
    pub const ALL: [SettingKey; 7] = [
        SettingKey::PinChannel,
        SettingKey::LogChannel,
        SettingKey::CommandPrefix,
        SettingKey::NoXpRole,
        SettingKey::LeaveMessageChannel,
        SettingKey::LeaveMessageText,
        SettingKey::TimeZone,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::PinChannel => "pin_channel",
            SettingKey::LogChannel => "log_channel",
            SettingKey::CommandPrefix => "command_prefix",
            SettingKey::NoXpRole => "no_xp_role",
            SettingKey::LeaveMessageChannel => "leave_message_channel",
            SettingKey::LeaveMessageText => "leave_message_text",
            SettingKey::TimeZone => "timezone",
        }
    }
}

/// Generic (guild, name) -> value store backed by the `settings` table.
///
/// Every write is a single `INSERT .. ON CONFLICT DO UPDATE` against the
/// `UNIQUE(guild_id, name)` constraint, so readers see either the old or the
/// new value and never a missing or duplicated row.
#[derive(Clone)]
pub struct SettingsRepo<'a> {
    db: &'a Db,
}

impl<'a> SettingsRepo<'a> {
    pub fn new(db: &'a Db) -> Self { Self { db } }

    pub async fn get(&self, guild_id: GuildId, key: SettingKey) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM settings WHERE guild_id = ? AND name = ?",
        )
        .bind(guild_id.to_string())
        .bind(key.as_str())
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(value)
    }

    /// Reads an identifier setting. Missing, zero or corrupted values are `None`.
    pub async fn get_id(&self, guild_id: GuildId, key: SettingKey) -> Result<Option<u64>> {
        Ok(self
            .get(guild_id, key)
            .await?
            .as_deref()
            .and_then(parse_snowflake))
    }

    pub async fn set(&self, guild_id: GuildId, key: SettingKey, value: &str) -> Result<()> {
        upsert(&self.db.pool, guild_id, key, value).await
    }

    /// Writes several settings in one transaction.
    pub async fn set_many(&self, guild_id: GuildId, entries: &[(SettingKey, &str)]) -> Result<()> {
        let mut tx = self.db.pool.begin().await?;
        for (key, value) in entries {
            upsert(&mut *tx, guild_id, *key, value).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn clear(&self, guild_id: GuildId, key: SettingKey) -> Result<bool> {
        let res = sqlx::query("DELETE FROM settings WHERE guild_id = ? AND name = ?")
            .bind(guild_id.to_string())
            .bind(key.as_str())
            .execute(&self.db.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Clears several settings in one transaction.
    pub async fn clear_many(&self, guild_id: GuildId, keys: &[SettingKey]) -> Result<()> {
        let guild = guild_id.to_string();
        let mut tx = self.db.pool.begin().await?;
        for key in keys {
            sqlx::query("DELETE FROM settings WHERE guild_id = ? AND name = ?")
                .bind(&guild)
                .bind(key.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn upsert<'e, E>(executor: E, guild_id: GuildId, key: SettingKey, value: &str) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO settings (guild_id, name, value)
        VALUES (?, ?, ?)
        ON CONFLICT(guild_id, name) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(guild_id.to_string())
    .bind(key.as_str())
    .bind(value)
    .execute(executor)
    .await?;
    Ok(())
}
