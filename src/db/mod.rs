use std::num::NonZeroU64;
use std::str::FromStr;
#[cfg(test)]
use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

#[derive(Clone)]
pub struct Db {
    pub pool: Pool<Sqlite>,
}

impl Db {
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!().run(&pool).await?;
        Ok(Self { pool })
    }

    /// Private in-memory database. Each connection to `:memory:` is its own
    /// database, so the pool is pinned to one connection that never expires.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;

        sqlx::migrate!().run(&pool).await?;
        Ok(Self { pool })
    }
}

/// Snowflakes are stored as decimal TEXT. Anything that is not a non-zero
/// u64 reads back as "not configured".
pub fn parse_snowflake(raw: &str) -> Option<u64> {
    raw.trim().parse::<NonZeroU64>().ok().map(NonZeroU64::get)
}
