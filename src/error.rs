//! Custom error types for patrologia

use thiserror::Error;

/// Main error type for crawl and persistence operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error for {url} after {attempts} attempt(s): {reason}")]
    Transport {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Cancelled")]
    Cancelled,

    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Persistence error on {table}: {reason}")]
    Persistence { table: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Errors that must stop the whole run instead of skipping one item
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Cancelled | Error::Config(_))
    }
}

/// Result type alias for patrologia
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_cancel_and_config_are_fatal() {
        assert!(Error::Cancelled.is_fatal());
        assert!(Error::Config("bad".into()).is_fatal());
        assert!(!Error::Structural("no toc".into()).is_fatal());
        assert!(!Error::Transport {
            url: "https://example.com".into(),
            attempts: 5,
            reason: "timeout".into(),
        }
        .is_fatal());
    }
}
