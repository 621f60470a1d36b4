use std::sync::Arc;

use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use serenity::all::{CreateMessage, GuildId};
use serenity::http::Http;

use crate::db::Db;
use crate::repos::{SettingKey, SettingsRepo};

/// Receives one human-readable line per configuration change.
///
/// Constructed once at startup and handed to every component that mutates
/// guild configuration. Delivery is best-effort: a sink never fails the
/// change it is describing.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, guild_id: GuildId, line: String);
}

/// Writes to the `audit` tracing target and mirrors the line into the guild's
/// log channel when one is configured.
pub struct ChannelAudit {
    http: Arc<Http>,
    db: Db,
}

impl ChannelAudit {
    pub fn new(http: Arc<Http>, db: Db) -> Self {
        Self { http, db }
    }
}

#[async_trait]
impl AuditSink for ChannelAudit {
    async fn record(&self, guild_id: GuildId, line: String) {
        tracing::info!(target: "audit", guild_id = %guild_id, "{line}");

        let channel = match SettingsRepo::new(&self.db)
            .get_id(guild_id, SettingKey::LogChannel)
            .await
        {
            Ok(Some(id)) => serenity::all::ChannelId::new(id),
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Failed to read log channel for guild {guild_id}: {e:#}");
                return;
            }
        };

        if let Err(e) = channel
            .send_message(&self.http, CreateMessage::new().content(line))
            .await
        {
            tracing::warn!("Failed to post audit line to {channel} in guild {guild_id}: {e}");
        }
    }
}

/// Keeps every recorded line in memory.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryAudit {
    lines: std::sync::Mutex<Vec<(GuildId, String)>>,
}

#[cfg(test)]
impl MemoryAudit {
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|l| l.iter().map(|(_, line)| line.clone()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait]
impl AuditSink for MemoryAudit {
    async fn record(&self, guild_id: GuildId, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((guild_id, line));
        }
    }
}
