/// Rejections raised while building a config value, before anything is persisted.
/// The `Display` text is meant to be shown to the member who issued the change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("The message must contain the placeholder {0}")]
    MissingPlaceholder(&'static str),

    #[error("Command prefix cannot be empty")]
    EmptyPrefix,

    #[error("Command prefix can be at most {max} characters long")]
    PrefixTooLong { max: usize },

    #[error("Time zone is not specified")]
    TimeZoneUnspecified,

    #[error("Unknown time zone `{0}`")]
    InvalidTimeZone(String),

    #[error("The Owner modrank cannot be assigned to a role")]
    OwnerNotAssignable,
}
