use anyhow::Result;
use poise::serenity_prelude as serenity;
use serenity::all::{ChannelId, GuildId, RoleId};

use crate::audit::AuditSink;
use crate::auth::{ModrankLevel, RoleLookup};
use crate::db::Db;
use crate::error::ConfigError;
use crate::repos::{ModranksRepo, SettingKey, SettingsRepo};
use crate::timezone::TimeZoneSetting;

pub const DEFAULT_COMMAND_PREFIX: &str = "!";
pub const MAX_PREFIX_LEN: usize = 8;
pub const LEAVE_PLACEHOLDER: &str = "$user";

/// Validated custom-command prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPrefix(String);

impl CommandPrefix {
    pub fn new(raw: &str) -> Result<Self, ConfigError> {
        let prefix = raw.trim();
        if prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        if prefix.chars().count() > MAX_PREFIX_LEN {
            return Err(ConfigError::PrefixTooLong { max: MAX_PREFIX_LEN });
        }
        Ok(Self(prefix.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CommandPrefix {
    fn default() -> Self {
        Self(DEFAULT_COMMAND_PREFIX.to_string())
    }
}

/// Message posted when a member leaves. The template always contains `$user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveMessage {
    pub channel_id: ChannelId,
    template: String,
}

impl LeaveMessage {
    pub fn new(channel_id: ChannelId, template: impl Into<String>) -> Result<Self, ConfigError> {
        let template = template.into();
        if !template.contains(LEAVE_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder(LEAVE_PLACEHOLDER));
        }
        Ok(Self { channel_id, template })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn render(&self, mention: &str) -> String {
        self.template.replace(LEAVE_PLACEHOLDER, mention)
    }
}

/// Everything `/settings list` shows, read in one go.
#[derive(Debug, Clone, Default)]
pub struct GuildConfigSnapshot {
    pub pin_channel: Option<ChannelId>,
    pub log_channel: Option<ChannelId>,
    pub command_prefix: CommandPrefix,
    pub admin_roles: Vec<RoleId>,
    pub moderator_roles: Vec<RoleId>,
    pub leave_message: Option<LeaveMessage>,
    pub time_zone: Option<TimeZoneSetting>,
    pub no_xp_role: Option<RoleId>,
}

/// Typed accessors for the named guild settings. Setters validate through the
/// value types above and report every change to the audit sink.
#[derive(Clone)]
pub struct GuildConfig<'a> {
    db: &'a Db,
    audit: &'a dyn AuditSink,
}

impl<'a> GuildConfig<'a> {
    pub fn new(db: &'a Db, audit: &'a dyn AuditSink) -> Self {
        Self { db, audit }
    }

    fn settings(&self) -> SettingsRepo<'a> {
        SettingsRepo::new(self.db)
    }

    // ---------- channels & roles ----------

    pub async fn pin_channel(&self, guild_id: GuildId) -> Result<Option<ChannelId>> {
        let id = self.settings().get_id(guild_id, SettingKey::PinChannel).await?;
        Ok(id.map(ChannelId::new))
    }

    pub async fn set_pin_channel(
        &self,
        guild_id: GuildId,
        channel: Option<ChannelId>,
    ) -> Result<()> {
        let value = channel.map(|c| (c.get(), format!("<#{c}>")));
        self.set_id(guild_id, SettingKey::PinChannel, "pin channel", value).await
    }

    pub async fn log_channel(&self, guild_id: GuildId) -> Result<Option<ChannelId>> {
        let id = self.settings().get_id(guild_id, SettingKey::LogChannel).await?;
        Ok(id.map(ChannelId::new))
    }

    pub async fn set_log_channel(
        &self,
        guild_id: GuildId,
        channel: Option<ChannelId>,
    ) -> Result<()> {
        let value = channel.map(|c| (c.get(), format!("<#{c}>")));
        self.set_id(guild_id, SettingKey::LogChannel, "log channel", value).await
    }

    pub async fn no_xp_role(&self, guild_id: GuildId) -> Result<Option<RoleId>> {
        let id = self.settings().get_id(guild_id, SettingKey::NoXpRole).await?;
        Ok(id.map(RoleId::new))
    }

    pub async fn set_no_xp_role(&self, guild_id: GuildId, role: Option<RoleId>) -> Result<()> {
        let value = role.map(|r| (r.get(), format!("<@&{r}>")));
        self.set_id(guild_id, SettingKey::NoXpRole, "no xp role", value).await
    }

    /// Clearing a key that was never set changes nothing and is not audited.
    async fn set_id(
        &self,
        guild_id: GuildId,
        key: SettingKey,
        label: &str,
        value: Option<(u64, String)>,
    ) -> Result<()> {
        match value {
            Some((id, mention)) => {
                self.settings().set(guild_id, key, &id.to_string()).await?;
                self.audit
                    .record(guild_id, format!("Setting {label} to {mention}"))
                    .await;
            }
            None => {
                if self.settings().clear(guild_id, key).await? {
                    self.audit.record(guild_id, format!("Clearing {label}")).await;
                }
            }
        }
        Ok(())
    }

    // ---------- command prefix ----------

    /// Falls back to `!` when no prefix has been configured.
    pub async fn command_prefix(&self, guild_id: GuildId) -> Result<CommandPrefix> {
        let raw = self.settings().get(guild_id, SettingKey::CommandPrefix).await?;
        Ok(raw
            .as_deref()
            .and_then(|p| CommandPrefix::new(p).ok())
            .unwrap_or_default())
    }

    pub async fn set_command_prefix(
        &self,
        guild_id: GuildId,
        prefix: &CommandPrefix,
    ) -> Result<()> {
        self.settings()
            .set(guild_id, SettingKey::CommandPrefix, prefix.as_str())
            .await?;
        self.audit
            .record(guild_id, format!("Setting command prefix to {}", prefix.as_str()))
            .await;
        Ok(())
    }

    // ---------- leave message ----------

    /// `None` unless both the channel and the text are configured.
    pub async fn leave_message(&self, guild_id: GuildId) -> Result<Option<LeaveMessage>> {
        let settings = self.settings();
        let channel = settings.get_id(guild_id, SettingKey::LeaveMessageChannel).await?;
        let text = settings.get(guild_id, SettingKey::LeaveMessageText).await?;
        Ok(match (channel, text) {
            (Some(channel), Some(text)) => LeaveMessage::new(ChannelId::new(channel), text).ok(),
            _ => None,
        })
    }

    pub async fn set_leave_message(&self, guild_id: GuildId, message: &LeaveMessage) -> Result<()> {
        let channel = message.channel_id.to_string();
        self.settings()
            .set_many(
                guild_id,
                &[
                    (SettingKey::LeaveMessageChannel, channel.as_str()),
                    (SettingKey::LeaveMessageText, message.template()),
                ],
            )
            .await?;
        self.audit
            .record(
                guild_id,
                format!(
                    "Setting leave message to {} for channel <#{}>",
                    message.template(),
                    message.channel_id
                ),
            )
            .await;
        Ok(())
    }

    pub async fn clear_leave_message(&self, guild_id: GuildId) -> Result<()> {
        self.settings()
            .clear_many(
                guild_id,
                &[SettingKey::LeaveMessageChannel, SettingKey::LeaveMessageText],
            )
            .await?;
        self.audit.record(guild_id, "Clearing leave message".to_string()).await;
        Ok(())
    }

    // ---------- time zone ----------

    /// A stored value that no longer parses reads as unset.
    pub async fn time_zone(&self, guild_id: GuildId) -> Result<Option<TimeZoneSetting>> {
        let raw = self.settings().get(guild_id, SettingKey::TimeZone).await?;
        Ok(raw.as_deref().and_then(|tz| match TimeZoneSetting::parse(tz) {
            Ok(tz) => Some(tz),
            Err(e) => {
                tracing::warn!("Ignoring stored time zone {tz:?} for guild {guild_id}: {e}");
                None
            }
        }))
    }

    pub async fn set_time_zone(
        &self,
        guild_id: GuildId,
        time_zone: &TimeZoneSetting,
    ) -> Result<()> {
        let serialized = time_zone.to_string();
        self.settings()
            .set(guild_id, SettingKey::TimeZone, &serialized)
            .await?;
        self.audit
            .record(guild_id, format!("Setting time zone to {serialized}"))
            .await;
        Ok(())
    }

    // ---------- overview ----------

    pub async fn snapshot(
        &self,
        guild_id: GuildId,
        roles: &impl RoleLookup,
    ) -> Result<GuildConfigSnapshot> {
        let modranks = ModranksRepo::new(self.db, self.audit)
            .list(guild_id, roles)
            .await?
            .items;
        let roles_at = |level: ModrankLevel| {
            modranks
                .iter()
                .filter(|m| m.level == level)
                .map(|m| m.role_id)
                .collect::<Vec<_>>()
        };

        Ok(GuildConfigSnapshot {
            pin_channel: self.pin_channel(guild_id).await?,
            log_channel: self.log_channel(guild_id).await?,
            command_prefix: self.command_prefix(guild_id).await?,
            admin_roles: roles_at(ModrankLevel::Administrator),
            moderator_roles: roles_at(ModrankLevel::Moderator),
            leave_message: self.leave_message(guild_id).await?,
            time_zone: self.time_zone(guild_id).await?,
            no_xp_role: self.no_xp_role(guild_id).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::audit::MemoryAudit;

    #[test]
    fn leave_message_requires_placeholder() {
        let err = LeaveMessage::new(ChannelId::new(1), "Goodbye!").unwrap_err();
        assert_eq!(err, ConfigError::MissingPlaceholder("$user"));
        assert_eq!(err.to_string(), "The message must contain the placeholder $user");
    }

    #[test]
    fn leave_message_renders_every_placeholder() {
        let msg = LeaveMessage::new(ChannelId::new(1), "Bye $user").unwrap();
        assert_eq!(msg.render("@member"), "Bye @member");
        let twice = LeaveMessage::new(ChannelId::new(1), "$user left. RIP $user").unwrap();
        assert_eq!(twice.render("<@5>"), "<@5> left. RIP <@5>");
    }

    #[test]
    fn prefix_validation() {
        assert_eq!(CommandPrefix::new("  ?? ").unwrap().as_str(), "??");
        assert_eq!(CommandPrefix::new(" "), Err(ConfigError::EmptyPrefix));
        assert_eq!(
            CommandPrefix::new("toolongprefix"),
            Err(ConfigError::PrefixTooLong { max: MAX_PREFIX_LEN })
        );
        assert_eq!(CommandPrefix::default().as_str(), "!");
    }

    #[tokio::test]
    async fn prefix_defaults_until_set() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let config = GuildConfig::new(&db, &audit);
        let g = GuildId::new(1);

        assert_eq!(config.command_prefix(g).await.unwrap().as_str(), "!");
        config
            .set_command_prefix(g, &CommandPrefix::new("?").unwrap())
            .await
            .unwrap();
        assert_eq!(config.command_prefix(g).await.unwrap().as_str(), "?");
        assert_eq!(audit.lines(), vec!["Setting command prefix to ?"]);
    }

    #[tokio::test]
    async fn channels_set_and_clear() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let config = GuildConfig::new(&db, &audit);
        let g = GuildId::new(1);

        assert_eq!(config.pin_channel(g).await.unwrap(), None);
        config.set_pin_channel(g, Some(ChannelId::new(11))).await.unwrap();
        config.set_log_channel(g, Some(ChannelId::new(22))).await.unwrap();
        assert_eq!(config.pin_channel(g).await.unwrap(), Some(ChannelId::new(11)));
        assert_eq!(config.log_channel(g).await.unwrap(), Some(ChannelId::new(22)));

        config.set_pin_channel(g, None).await.unwrap();
        assert_eq!(config.pin_channel(g).await.unwrap(), None);
        assert_eq!(
            audit.lines(),
            vec![
                "Setting pin channel to <#11>",
                "Setting log channel to <#22>",
                "Clearing pin channel",
            ]
        );
    }

    #[tokio::test]
    async fn unchanged_or_failed_writes_are_not_audited() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let config = GuildConfig::new(&db, &audit);
        let g = GuildId::new(1);

        config.set_log_channel(g, None).await.unwrap();
        assert!(audit.lines().is_empty());

        sqlx::query("DROP TABLE settings").execute(&db.pool).await.unwrap();
        assert!(config.set_pin_channel(g, Some(ChannelId::new(11))).await.is_err());
        let prefix = CommandPrefix::new("?").unwrap();
        assert!(config.set_command_prefix(g, &prefix).await.is_err());
        assert!(audit.lines().is_empty());
    }

    #[tokio::test]
    async fn no_xp_role_round_trip() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let config = GuildConfig::new(&db, &audit);
        let g = GuildId::new(1);

        config.set_no_xp_role(g, Some(RoleId::new(33))).await.unwrap();
        assert_eq!(config.no_xp_role(g).await.unwrap(), Some(RoleId::new(33)));
    }

    #[tokio::test]
    async fn leave_message_round_trip() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let config = GuildConfig::new(&db, &audit);
        let g = GuildId::new(1);
        let channel = ChannelId::new(44);

        assert_eq!(config.leave_message(g).await.unwrap(), None);
        let msg = LeaveMessage::new(channel, "Bye $user").unwrap();
        config.set_leave_message(g, &msg).await.unwrap();

        let stored = config.leave_message(g).await.unwrap().unwrap();
        assert_eq!(stored.channel_id, channel);
        assert_eq!(stored.template(), "Bye $user");
        assert_eq!(stored.render("@member"), "Bye @member");

        config.clear_leave_message(g).await.unwrap();
        assert_eq!(config.leave_message(g).await.unwrap(), None);
    }

    #[tokio::test]
    async fn half_configured_leave_message_is_absent() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let config = GuildConfig::new(&db, &audit);
        let g = GuildId::new(1);

        SettingsRepo::new(&db)
            .set(g, SettingKey::LeaveMessageText, "Bye $user")
            .await
            .unwrap();
        assert_eq!(config.leave_message(g).await.unwrap(), None);
    }

    #[tokio::test]
    async fn time_zone_round_trip() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let config = GuildConfig::new(&db, &audit);
        let g = GuildId::new(1);

        let tz = TimeZoneSetting::parse("UTC+5:30").unwrap();
        config.set_time_zone(g, &tz).await.unwrap();
        assert_eq!(config.time_zone(g).await.unwrap(), Some(tz));
        assert_eq!(
            SettingsRepo::new(&db).get(g, SettingKey::TimeZone).await.unwrap().as_deref(),
            Some("UTC+05:30")
        );

        SettingsRepo::new(&db)
            .set(g, SettingKey::TimeZone, "garbage")
            .await
            .unwrap();
        assert_eq!(config.time_zone(g).await.unwrap(), None);
    }

    #[tokio::test]
    async fn snapshot_groups_modranks_by_level() {
        let db = Db::in_memory().await.unwrap();
        let audit = MemoryAudit::default();
        let config = GuildConfig::new(&db, &audit);
        let g = GuildId::new(1);
        let modranks = ModranksRepo::new(&db, &audit);
        modranks.set(g, RoleId::new(10), ModrankLevel::Administrator).await.unwrap();
        modranks.set(g, RoleId::new(20), ModrankLevel::Moderator).await.unwrap();
        modranks.set(g, RoleId::new(30), ModrankLevel::Moderator).await.unwrap();
        config.set_log_channel(g, Some(ChannelId::new(5))).await.unwrap();

        let roles: HashSet<RoleId> = [10, 20].into_iter().map(RoleId::new).collect();
        let snapshot = config.snapshot(g, &roles).await.unwrap();

        assert_eq!(snapshot.admin_roles, vec![RoleId::new(10)]);
        assert_eq!(snapshot.moderator_roles, vec![RoleId::new(20)]);
        assert_eq!(snapshot.log_channel, Some(ChannelId::new(5)));
        assert_eq!(snapshot.pin_channel, None);
        assert_eq!(snapshot.command_prefix.as_str(), "!");
        assert!(snapshot.leave_message.is_none());
        assert!(snapshot.time_zone.is_none());
    }
}
