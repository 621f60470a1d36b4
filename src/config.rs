use anyhow::{Context as AnyhowContext, Result};
use poise::serenity_prelude as serenity;
use serenity::all::{GuildId, UserId};

use crate::db::parse_snowflake;

pub struct Config {
    pub discord_token: String,
    pub database_url: String,
    pub owners: Vec<UserId>,
    /// Register commands in this guild only instead of globally.
    pub dev_guild: Option<GuildId>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let discord_token = std::env::var("DISCORD_TOKEN")
            .context("Set DISCORD_TOKEN in env")?;
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://moe.db".into());
        let owners = match std::env::var("BOT_OWNERS") {
            Ok(raw) => parse_owners(&raw).context("Invalid BOT_OWNERS")?,
            Err(_) => Vec::new(),
        };
        let dev_guild = match std::env::var("DEV_GUILD_ID") {
            Ok(raw) => Some(
                parse_snowflake(&raw)
                    .map(GuildId::new)
                    .with_context(|| format!("Invalid DEV_GUILD_ID {raw:?}"))?,
            ),
            Err(_) => None,
        };

        Ok(Self { discord_token, database_url, owners, dev_guild })
    }
}

/// Comma and/or whitespace separated user ids.
fn parse_owners(raw: &str) -> Result<Vec<UserId>> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            parse_snowflake(s)
                .map(UserId::new)
                .with_context(|| format!("{s:?} is not a user id"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owners_accept_commas_and_spaces() {
        let owners = parse_owners("1, 2\n3,,").unwrap();
        assert_eq!(owners, vec![UserId::new(1), UserId::new(2), UserId::new(3)]);
        assert!(parse_owners("").unwrap().is_empty());
    }

    #[test]
    fn owners_reject_garbage() {
        assert!(parse_owners("1,bob").is_err());
        assert!(parse_owners("0").is_err());
    }
}
