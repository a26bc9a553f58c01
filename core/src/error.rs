//! Error types for modmail

use std::path::PathBuf;
use thiserror::Error;

/// Result type for modmail operations
pub type Result<T> = std::result::Result<T, ModmailError>;

/// Main error type for modmail
#[derive(Error, Debug)]
pub enum ModmailError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Chat platform errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Channel runner errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required configuration: {0}")]
    Missing(String),
}

/// Failures reported by the chat platform collaborator.
///
/// Every platform call maps its native failure onto one of these kinds so the
/// router can decide who gets told about it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The bot lacks the rights to perform the call
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The parent category for ticket channels does not exist
    #[error("category not found: {0}")]
    CategoryNotFound(u64),

    /// The user refuses direct messages or has blocked the bot
    #[error("target unreachable: {0}")]
    TargetUnreachable(String),

    /// The channel or message no longer exists
    #[error("not found: {0}")]
    NotFound(String),

    /// Anything else (network, rate limit, malformed response)
    #[error("{0}")]
    Other(String),
}

impl PlatformError {
    /// Whether this failure means the addressed channel is gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound(_))
    }
}

/// Channel runner errors
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Channel connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Event bus closed")]
    BusClosed,
}

/// Why a relay or close operation did not go through.
///
/// These are outcomes reported back to the caller, never reasons to stop the
/// dispatcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The bot lacks rights to create or send
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The other side of the relay cannot be reached
    #[error("target unreachable: {0}")]
    TargetUnreachable(String),

    /// The channel is not bound to an open ticket
    #[error("not a ticket channel")]
    NotATicket,

    /// A required category or role is missing
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    /// The platform failed for another reason (server error, rate limit, bad request)
    #[error("platform failure: {0}")]
    Platform(String),
}

impl From<PlatformError> for RelayError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::PermissionDenied(reason) => RelayError::PermissionDenied(reason),
            PlatformError::CategoryNotFound(id) => {
                RelayError::ConfigurationMissing(format!("ticket category {}", id))
            }
            PlatformError::TargetUnreachable(reason) | PlatformError::NotFound(reason) => {
                RelayError::TargetUnreachable(reason)
            }
            PlatformError::Other(reason) => RelayError::Platform(reason),
        }
    }
}

impl From<anyhow::Error> for ModmailError {
    fn from(err: anyhow::Error) -> Self {
        ModmailError::Other(err.to_string())
    }
}

impl From<serde_json::Error> for ModmailError {
    fn from(err: serde_json::Error) -> Self {
        ModmailError::Other(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        match err.status().map(|s| s.as_u16()) {
            Some(403) => PlatformError::PermissionDenied(err.to_string()),
            Some(404) => PlatformError::NotFound(err.to_string()),
            _ => PlatformError::Other(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::Missing("discord.token".to_string());
        assert_eq!(err.to_string(), "Missing required configuration: discord.token");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ModmailError = io_err.into();
        assert!(matches!(err, ModmailError::Io(_)));
    }

    #[test]
    fn test_platform_to_relay_error() {
        let err: RelayError = PlatformError::CategoryNotFound(42).into();
        assert_eq!(err, RelayError::ConfigurationMissing("ticket category 42".to_string()));

        let err: RelayError = PlatformError::TargetUnreachable("dms closed".to_string()).into();
        assert!(matches!(err, RelayError::TargetUnreachable(_)));

        let err: RelayError = PlatformError::PermissionDenied("missing access".to_string()).into();
        assert!(matches!(err, RelayError::PermissionDenied(_)));

        let err: RelayError = PlatformError::NotFound("channel 9".to_string()).into();
        assert!(matches!(err, RelayError::TargetUnreachable(_)));

        let err: RelayError = PlatformError::Other("HTTP 500".to_string()).into();
        assert_eq!(err, RelayError::Platform("HTTP 500".to_string()));
    }
}
