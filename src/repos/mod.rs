pub mod autoroles_repo;
pub mod guild_config;
pub mod modranks_repo;
pub mod settings_repo;

pub use autoroles_repo::AutorolesRepo;
pub use guild_config::{CommandPrefix, GuildConfig, GuildConfigSnapshot, LeaveMessage};
pub use modranks_repo::ModranksRepo;
pub use settings_repo::{SettingKey, SettingsRepo};

/// Result of a listing that also purged rows pointing at deleted roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Healed<T> {
    pub items: T,
    /// Number of stale rows deleted during the listing.
    pub repaired: usize,
}
