//! Error types for the bot
//!
//! Platform failures are classified once (see [`PlatformError`]) and carried
//! upward inside [`BotError`]. Commands turn them into a [`crate::status::CommandStatus`]
//! at the call site instead of letting them escape to the framework.

use crate::config::ConfigError;
use crate::platform::PlatformError;
use thiserror::Error;

/// Errors that can occur while running features and workflows
#[derive(Debug, Error)]
pub enum BotError {
    /// The platform refused or failed an operation
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Configuration could not be loaded or parsed
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Inactive member records could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// A remote lookup service failed
    #[error("Lookup failed: {0}")]
    Lookup(String),

    /// A feature setting is present but unusable (bad regex, bad id)
    #[error("Invalid feature setting: {0}")]
    InvalidSetting(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<poise::serenity_prelude::Error> for BotError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::Platform(PlatformError::from(error))
    }
}

impl From<reqwest::Error> for BotError {
    fn from(error: reqwest::Error) -> Self {
        Self::Lookup(error.to_string())
    }
}

impl From<String> for BotError {
    fn from(message: String) -> Self {
        Self::Other(message)
    }
}

/// Result type for bot operations
pub type BotResult<T> = Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = BotError::Storage("disk full".to_string());
        assert_eq!(error.to_string(), "Storage error: disk full");

        let error = BotError::from("Something went wrong".to_string());
        assert_eq!(error.to_string(), "Something went wrong");

        let error = BotError::from(PlatformError::Forbidden("delete message".to_string()));
        assert_eq!(error.to_string(), "Missing access: delete message");
    }
}
