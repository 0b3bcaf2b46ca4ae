//! Configuration management for patrologia
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Source site configuration
    #[serde(default)]
    pub source: SourceConfig,

    /// Fetch transport configuration
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Synthetic division probing
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Persistence backend configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// QA report configuration
    #[serde(default)]
    pub report: ReportConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Source site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Works index page where discovery starts
    #[serde(default = "default_start_url")]
    pub start_url: String,

    /// Path prefix every TOC link must carry (e.g., /de)
    #[serde(default = "default_locale_prefix")]
    pub locale_prefix: String,

    /// Language code stored on each Work
    #[serde(default = "default_language")]
    pub language: String,

    /// Text inside a version's `<small>` label that marks the wanted translation
    #[serde(default = "default_language_marker")]
    pub language_marker: String,

    /// Stop discovery after this many versions
    #[serde(default)]
    pub max_works: Option<usize>,
}

/// Fetch transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum requests per second
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Request timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Attempts per page before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay (milliseconds)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single retry delay (milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Relative jitter applied to each delay, in [0, 1)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

/// Synthetic division probing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Highest division number to probe
    #[serde(default = "default_max_divisions")]
    pub max_divisions: usize,

    /// A probe whose main text is shorter than this ends the sequence
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,

    /// Case-insensitive phrases that mark a probe response as missing
    #[serde(default = "default_not_found_phrases")]
    pub not_found_phrases: Vec<String>,
}

/// Persistence backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Rest,
    Sqlite,
    None,
}

impl std::str::FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "rest" => Ok(StoreBackend::Rest),
            "sqlite" => Ok(StoreBackend::Sqlite),
            "none" => Ok(StoreBackend::None),
            other => Err(Error::Config(format!("Unknown store backend: {}", other))),
        }
    }
}

/// Persistence backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Which backend receives the upserts
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,

    /// Base URL of the REST endpoint (`{rest_url}/rest/v1/{table}`)
    #[serde(default = "default_rest_url")]
    pub rest_url: String,

    /// Environment variable name for the REST service key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// SQLite database path, relative to the config directory unless absolute
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// Rows per upsert request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Attempts per batch before the batch is reported as failed
    #[serde(default = "default_max_batch_attempts")]
    pub max_batch_attempts: u32,
}

/// QA report configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Path of the per-work QA summary CSV
    #[serde(default = "default_qa_csv")]
    pub qa_csv: String,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for patrologia data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            start_url: default_start_url(),
            locale_prefix: default_locale_prefix(),
            language: default_language(),
            language_marker: default_language_marker(),
            max_works: None,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            timeout_secs: default_fetch_timeout(),
            user_agent: default_user_agent(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter: default_jitter(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_divisions: default_max_divisions(),
            min_content_chars: default_min_content_chars(),
            not_found_phrases: default_not_found_phrases(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            rest_url: default_rest_url(),
            api_key_env: default_api_key_env(),
            sqlite_path: default_sqlite_path(),
            batch_size: default_batch_size(),
            max_batch_attempts: default_max_batch_attempts(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            qa_csv: default_qa_csv(),
        }
    }
}

impl FetchConfig {
    /// Request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Get the default base directory for patrologia (~/.patrologia)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".patrologia")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Default configuration rooted at `base_dir`, without touching disk
    pub fn at(base_dir: PathBuf) -> Self {
        let mut config = Config::default();
        config.init_paths(Some(base_dir));
        config
    }

    /// Initialize paths configuration
    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a base directory, falling back to defaults
    /// when no config file exists there yet
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the REST service key from environment
    pub fn rest_api_key(&self) -> Option<String> {
        std::env::var(&self.store.api_key_env).ok()
    }

    /// Resolved SQLite database path
    pub fn sqlite_file(&self) -> PathBuf {
        let path = PathBuf::from(&self.store.sqlite_path);
        if path.is_absolute() {
            path
        } else {
            self.paths.base_dir.join(path)
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.fetch.requests_per_second <= 0.0 || !self.fetch.requests_per_second.is_finite() {
            return Err(Error::Config(
                "fetch.requests_per_second must be positive".to_string(),
            ));
        }

        if self.fetch.max_attempts == 0 {
            return Err(Error::Config(
                "fetch.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.fetch.initial_backoff_ms > self.fetch.max_backoff_ms {
            return Err(Error::Config(
                "fetch.initial_backoff_ms must be <= fetch.max_backoff_ms".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.fetch.jitter) {
            return Err(Error::Config(
                "fetch.jitter must be in [0.0, 1.0)".to_string(),
            ));
        }

        if self.probe.max_divisions == 0 {
            return Err(Error::Config(
                "probe.max_divisions must be at least 1".to_string(),
            ));
        }

        if self.store.batch_size == 0 {
            return Err(Error::Config("store.batch_size must be at least 1".to_string()));
        }

        if self.store.max_batch_attempts == 0 {
            return Err(Error::Config(
                "store.max_batch_attempts must be at least 1".to_string(),
            ));
        }

        if self.store.backend == StoreBackend::Rest && self.store.rest_url.trim().is_empty() {
            return Err(Error::Config(
                "store.rest_url is required when store.backend = \"rest\"".to_string(),
            ));
        }

        Ok(())
    }
}

/// Get the database URL for sqlx
pub fn database_url(config: &Config) -> String {
    format!("sqlite://{}?mode=rwc", config.sqlite_file().display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.source.locale_prefix, "/de");
        assert_eq!(config.fetch.max_attempts, 5);
        assert_eq!(config.probe.max_divisions, 20);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.probe.min_content_chars = 250;
        config.source.max_works = Some(3);

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.probe.min_content_chars, 250);
        assert_eq!(loaded.source.max_works, Some(3));
        assert_eq!(loaded.sqlite_file(), tmp.path().join("corpus.db"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[fetch]\nrequests_per_second = 2.5\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.fetch.requests_per_second, 2.5);
        assert_eq!(config.fetch.max_backoff_ms, 5000);
        assert_eq!(
            config.probe.not_found_phrases,
            vec!["not found".to_string(), "nicht gefunden".to_string()]
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.fetch.requests_per_second = 0.0;
        assert!(config.validate().is_err());
        config.fetch.requests_per_second = 1.0;

        config.fetch.jitter = 1.0;
        assert!(config.validate().is_err());
        config.fetch.jitter = 0.1;

        config.store.batch_size = 0;
        assert!(config.validate().is_err());
        config.store.batch_size = 10;

        config.store.backend = StoreBackend::Rest;
        config.store.rest_url = String::new();
        assert!(config.validate().is_err());
        config.store.rest_url = "https://db.example.org".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("REST".parse::<StoreBackend>().unwrap(), StoreBackend::Rest);
        assert_eq!("none".parse::<StoreBackend>().unwrap(), StoreBackend::None);
        assert!("postgres".parse::<StoreBackend>().is_err());
    }
}
