use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::core::{MatchmakerConfig, SessionConfig, SettlePolicy, DEFAULT_PAGE_SIZE};

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub rest: RestSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub conversation: ConversationSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }

/// Which backend the store port is wired to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
    Rest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 { 30 }

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RestSettings {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_settle_initial_ms")]
    pub settle_initial_ms: u64,
    #[serde(default = "default_settle_max_backoff_ms")]
    pub settle_max_backoff_ms: u64,
    #[serde(default = "default_settle_deadline_ms")]
    pub settle_deadline_ms: u64,
    #[serde(default = "default_feed_default_limit")]
    pub feed_default_limit: usize,
    #[serde(default = "default_feed_max_limit")]
    pub feed_max_limit: usize,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            settle_initial_ms: default_settle_initial_ms(),
            settle_max_backoff_ms: default_settle_max_backoff_ms(),
            settle_deadline_ms: default_settle_deadline_ms(),
            feed_default_limit: default_feed_default_limit(),
            feed_max_limit: default_feed_max_limit(),
        }
    }
}

fn default_settle_initial_ms() -> u64 { 100 }
fn default_settle_max_backoff_ms() -> u64 { 800 }
fn default_settle_deadline_ms() -> u64 { 2000 }
fn default_feed_default_limit() -> usize { DEFAULT_PAGE_SIZE }
fn default_feed_max_limit() -> usize { 100 }

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default = "default_poll_lookback_ms")]
    pub poll_lookback_ms: u64,
    #[serde(default = "default_unread_poll_interval_secs")]
    pub unread_poll_interval_secs: u64,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
            poll_lookback_ms: default_poll_lookback_ms(),
            unread_poll_interval_secs: default_unread_poll_interval_secs(),
        }
    }
}

fn default_poll_interval_ms() -> u64 { 2000 }
fn default_poll_timeout_ms() -> u64 { 5000 }
fn default_poll_lookback_ms() -> u64 { 2000 }
fn default_unread_poll_interval_secs() -> u64 { 10 }

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_profile_cache_size")]
    pub profile_cache_size: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            profile_cache_size: default_profile_cache_size(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_profile_cache_size() -> u64 { 1000 }
fn default_cache_ttl_secs() -> u64 { 300 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Serde defaults
    /// 2. Configuration file (config/default.toml, then config/local.toml)
    /// 3. Environment variables (prefixed with STUDYMATCH__)
    /// 4. DATABASE_URL
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., STUDYMATCH__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("STUDYMATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        apply_database_url(settings)?.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("STUDYMATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    pub fn settle_policy(&self) -> SettlePolicy {
        SettlePolicy {
            initial: Duration::from_millis(self.matching.settle_initial_ms),
            max_backoff: Duration::from_millis(self.matching.settle_max_backoff_ms),
            deadline: Duration::from_millis(self.matching.settle_deadline_ms),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            poll_interval: Duration::from_millis(self.conversation.poll_interval_ms),
            poll_timeout: Duration::from_millis(self.conversation.poll_timeout_ms),
            poll_lookback: Duration::from_millis(self.conversation.poll_lookback_ms),
        }
    }

    pub fn matchmaker_config(&self) -> MatchmakerConfig {
        MatchmakerConfig {
            settle: self.settle_policy(),
            feed_max_limit: self.matching.feed_max_limit,
            session: self.session_config(),
            unread_poll_interval: Duration::from_secs(self.conversation.unread_poll_interval_secs),
            profile_cache_size: self.cache.profile_cache_size,
            profile_cache_ttl_secs: self.cache.ttl_secs,
        }
    }
}

/// DATABASE_URL takes precedence over the file and prefixed variables
fn apply_database_url(settings: Config) -> Result<Config, ConfigError> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => Config::builder()
            .add_source(settings)
            .set_override("database.url", url)?
            .build(),
        Err(_) => Ok(settings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_logging() {
        let level = default_log_level();
        let format = default_log_format();
        assert_eq!(level, "info");
        assert_eq!(format, "json");
    }

    #[test]
    fn test_defaults_match_core_defaults() {
        let settings = Settings::default();

        assert_eq!(settings.settle_policy(), SettlePolicy::default());
        assert_eq!(settings.session_config().poll_interval, Duration::from_secs(2));
        assert_eq!(
            settings.session_config().poll_lookback,
            SessionConfig::default().poll_lookback
        );
        assert_eq!(settings.matching.feed_default_limit, 20);
        assert_eq!(
            settings.matchmaker_config().unread_poll_interval,
            Duration::from_secs(10)
        );
        assert_eq!(settings.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("studymatch-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[store]
backend = "rest"

[rest]
endpoint = "https://example.supabase.co"
api_key = "anon"

[conversation]
poll_interval_ms = 500
"#
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();

        assert_eq!(settings.store.backend, StoreBackend::Rest);
        assert_eq!(settings.rest.api_key, "anon");
        assert_eq!(settings.session_config().poll_interval, Duration::from_millis(500));
        assert_eq!(settings.server.port, 8080);
        std::fs::remove_dir_all(dir).ok();
    }
}
