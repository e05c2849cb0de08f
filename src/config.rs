// Configuration File Support
//
// TOML configuration for the pingboard service with environment variable
// overrides. The default file lives in the XDG config directory:
// ~/.config/pingboard/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// HTTP listener
    pub server: ServerConfig,

    /// Shared state store
    pub store: StoreConfig,

    /// Session lifetime and cookie
    pub session: SessionConfig,

    /// Per-caller call cadence
    pub rate_limit: RateLimitConfig,

    /// Leaderboard and distinct-caller sketch
    pub leaderboard: LeaderboardConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,

    /// Accepted credentials
    pub users: Vec<UserCredential>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Listen port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Store backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Single-process in-memory store
    #[default]
    Memory,
    /// Redis or Dragonfly
    Redis,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "redis" => Ok(StoreBackend::Redis),
            other => anyhow::bail!("Unknown store backend: {}. Must be 'memory' or 'redis'", other),
        }
    }
}

/// Shared state store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Which backend to use
    pub backend: StoreBackend,

    /// Connection URL (redis backend only)
    pub url: String,

    /// Per-operation timeout in milliseconds
    pub operation_timeout_ms: u64,

    /// Namespace prepended to every key
    pub key_prefix: String,

    /// Seconds between sweeps of expired in-memory entries
    pub cleanup_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: "redis://127.0.0.1:6379".to_string(),
            operation_timeout_ms: 2000,
            key_prefix: "pingboard".to_string(),
            cleanup_interval_secs: 60,
        }
    }
}

impl StoreConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Session lifetime in seconds, fixed at creation
    pub ttl_secs: u64,

    /// Cookie carrying the session token
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            cookie_name: "sessionID".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Longest accepted rate limit window (one year)
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Block window in seconds
    pub window_secs: u64,

    /// Calls permitted per window; only 1 is supported
    pub max_calls_per_window: u32,

    /// Compare-and-set rounds before a contended acquire gives up
    pub max_acquire_attempts: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_calls_per_window: 1,
            max_acquire_attempts: 3,
        }
    }
}

/// Leaderboard configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LeaderboardConfig {
    /// Largest k served by top-k reads
    pub size: usize,

    /// Ordered set key (before prefixing)
    pub key: String,

    /// Distinct-caller sketch key (before prefixing)
    pub sketch_key: String,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            size: 10,
            key: "leaderboard".to_string(),
            sketch_key: "distinct_callers".to_string(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to serve /metrics
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// One accepted username/password pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserCredential {
    pub username: String,
    pub password: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            session: SessionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            leaderboard: LeaderboardConfig::default(),
            metrics: MetricsConfig::default(),
            users: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// Environment overrides are applied and the result validated whether
    /// or not the file exists.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;

            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/pingboard/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "pingboard", "pingboard") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("pingboard")
                .join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - PINGBOARD_LOG_LEVEL
    /// - PINGBOARD_LOG_FORMAT
    /// - PINGBOARD_PORT
    /// - PINGBOARD_STORE_BACKEND
    /// - PINGBOARD_STORE_URL
    /// - PINGBOARD_SESSION_TTL_SECS
    /// - PINGBOARD_RATE_LIMIT_WINDOW_SECS
    /// - PINGBOARD_LEADERBOARD_SIZE
    /// - PINGBOARD_METRICS_ENABLED
    ///
    /// Unparseable values are ignored.
    fn apply_env_overrides(mut self) -> Self {
        // Logging overrides
        if let Ok(level) = std::env::var("PINGBOARD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("PINGBOARD_LOG_FORMAT") {
            self.logging.format = format;
        }

        // Server overrides
        if let Ok(port) = std::env::var("PINGBOARD_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        // Store overrides
        if let Ok(backend) = std::env::var("PINGBOARD_STORE_BACKEND") {
            if let Ok(backend) = backend.parse::<StoreBackend>() {
                self.store.backend = backend;
            }
        }
        if let Ok(url) = std::env::var("PINGBOARD_STORE_URL") {
            self.store.url = url;
        }

        // Usage overrides
        if let Ok(ttl) = std::env::var("PINGBOARD_SESSION_TTL_SECS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                if ttl > 0 {
                    self.session.ttl_secs = ttl;
                }
            }
        }
        if let Ok(window) = std::env::var("PINGBOARD_RATE_LIMIT_WINDOW_SECS") {
            if let Ok(window) = window.parse::<u64>() {
                if window > 0 {
                    self.rate_limit.window_secs = window;
                }
            }
        }
        if let Ok(size) = std::env::var("PINGBOARD_LEADERBOARD_SIZE") {
            if let Ok(size) = size.parse::<usize>() {
                if size > 0 {
                    self.leaderboard.size = size;
                }
            }
        }

        // Metrics overrides
        if let Ok(enabled) = std::env::var("PINGBOARD_METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        // Validate logging level
        if self.logging.log_level().is_err() {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            );
        }

        // Validate logging format
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        // Validate store configuration
        if self.store.operation_timeout_ms == 0 {
            anyhow::bail!("Store operation timeout must be > 0");
        }
        if self.store.cleanup_interval_secs == 0 {
            anyhow::bail!("Store cleanup interval must be > 0");
        }
        if self.store.backend == StoreBackend::Redis && self.store.url.is_empty() {
            anyhow::bail!("Redis store backend requires a URL");
        }

        // Validate usage configuration
        if self.session.ttl_secs == 0 {
            anyhow::bail!("Session TTL must be > 0");
        }
        if self.session.cookie_name.is_empty() {
            anyhow::bail!("Session cookie name must not be empty");
        }
        if self.rate_limit.window_secs == 0 {
            anyhow::bail!("Rate limit window must be > 0");
        }
        if self.rate_limit.window_secs > MAX_WINDOW_SECS {
            anyhow::bail!(
                "Rate limit window of {}s exceeds the maximum of {}s",
                self.rate_limit.window_secs,
                MAX_WINDOW_SECS
            );
        }
        if self.rate_limit.max_calls_per_window != 1 {
            anyhow::bail!(
                "max_calls_per_window = {} is not supported; only 1 call per window is implemented",
                self.rate_limit.max_calls_per_window
            );
        }
        if self.rate_limit.max_acquire_attempts == 0 {
            anyhow::bail!("Rate limit acquire attempts must be > 0");
        }
        if self.leaderboard.size == 0 {
            anyhow::bail!("Leaderboard size must be > 0");
        }
        if self.leaderboard.key.is_empty() || self.leaderboard.sketch_key.is_empty() {
            anyhow::bail!("Leaderboard and sketch keys must not be empty");
        }

        // Validate credentials
        for user in &self.users {
            if user.username.is_empty() {
                anyhow::bail!("Configured user has empty username");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    const ENV_VARS: &[&str] = &[
        "PINGBOARD_LOG_LEVEL",
        "PINGBOARD_LOG_FORMAT",
        "PINGBOARD_PORT",
        "PINGBOARD_STORE_BACKEND",
        "PINGBOARD_STORE_URL",
        "PINGBOARD_SESSION_TTL_SECS",
        "PINGBOARD_RATE_LIMIT_WINDOW_SECS",
        "PINGBOARD_LEADERBOARD_SIZE",
        "PINGBOARD_METRICS_ENABLED",
    ];

    // Tests touching process environment run one at a time
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.session.ttl_secs, 300);
        assert_eq!(config.session.cookie_name, "sessionID");
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.rate_limit.max_calls_per_window, 1);
        assert_eq!(config.leaderboard.size, 10);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.users.is_empty());
    }

    #[test]
    fn test_config_validation_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_multiple_calls_per_window() {
        let mut config = Config::default();
        config.rate_limit.max_calls_per_window = 2;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_calls_per_window"));

        config.rate_limit.max_calls_per_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_oversized_window() {
        let mut config = Config::default();
        config.rate_limit.window_secs = MAX_WINDOW_SECS;
        assert!(config.validate().is_ok());

        config.rate_limit.window_secs = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds the maximum"));
    }

    #[test]
    fn test_config_validation_zero_values() {
        let mut config = Config::default();
        config.session.ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rate_limit.window_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.leaderboard.size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.store.cleanup_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.store.operation_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_nonexistent_file() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().with_extension("nonexistent");
        let config = Config::load_from_path(&path);
        assert!(config.is_ok());
    }

    #[test]
    fn test_load_valid_toml_config() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let temp_file = NamedTempFile::new().unwrap();
        let toml_content = r#"
[logging]
level = "debug"
format = "json"

[server]
port = 9000

[store]
backend = "redis"
url = "redis://cache:6379"
key_prefix = "pb"

[session]
ttl_secs = 120

[rate_limit]
window_secs = 30

[leaderboard]
size = 5

[[users]]
username = "alice"
password = "wonderland"

[[users]]
username = "bob"
password = "builder"
"#;

        fs::write(temp_file.path(), toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.url, "redis://cache:6379");
        assert_eq!(config.store.key_prefix, "pb");
        assert_eq!(config.session.ttl_secs, 120);
        assert_eq!(config.rate_limit.window_secs, 30);
        assert_eq!(config.leaderboard.size, 5);
        assert_eq!(config.users.len(), 2);
        assert_eq!(config.users[0].username, "alice");
    }

    #[test]
    fn test_load_invalid_toml_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let toml_content = r#"
[logging
level = "debug"
"#; // Invalid TOML

        fs::write(temp_file.path(), toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path());
        assert!(config.is_err());
    }

    #[test]
    fn test_load_rejects_invalid_rate_limit() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let temp_file = NamedTempFile::new().unwrap();
        fs::write(
            temp_file.path(),
            "[rate_limit]\nmax_calls_per_window = 5\n",
        )
        .unwrap();

        assert!(Config::load_from_path(temp_file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        std::env::set_var("PINGBOARD_LOG_LEVEL", "debug");
        std::env::set_var("PINGBOARD_STORE_BACKEND", "redis");
        std::env::set_var("PINGBOARD_STORE_URL", "redis://other:6380");
        std::env::set_var("PINGBOARD_SESSION_TTL_SECS", "45");
        std::env::set_var("PINGBOARD_LEADERBOARD_SIZE", "3");
        std::env::set_var("PINGBOARD_METRICS_ENABLED", "false");

        let config = Config::default().apply_env_overrides();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.url, "redis://other:6380");
        assert_eq!(config.session.ttl_secs, 45);
        assert_eq!(config.leaderboard.size, 3);
        assert!(!config.metrics.enabled);

        clear_env();
    }

    #[test]
    fn test_env_overrides_invalid_values() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        std::env::set_var("PINGBOARD_RATE_LIMIT_WINDOW_SECS", "0");
        std::env::set_var("PINGBOARD_PORT", "not-a-port");
        std::env::set_var("PINGBOARD_STORE_BACKEND", "etcd");

        let config = Config::default().apply_env_overrides();

        // Should keep defaults for invalid values
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.store.backend, StoreBackend::Memory);

        clear_env();
    }

    #[test]
    fn test_store_backend_parsing() {
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!("Redis".parse::<StoreBackend>().unwrap(), StoreBackend::Redis);
        assert!("etcd".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(path.ends_with("config.toml"));
    }

    #[test]
    fn test_log_level_parsing() {
        let mut config = Config::default();
        config.logging.level = "debug".to_string();
        assert_eq!(config.logging.log_level().unwrap(), tracing::Level::DEBUG);

        config.logging.level = "WARN".to_string();
        assert_eq!(config.logging.log_level().unwrap(), tracing::Level::WARN);

        config.logging.level = "invalid".to_string();
        assert!(config.logging.log_level().is_err());
    }

    #[test]
    fn test_session_ttl_duration() {
        let config = SessionConfig::default();
        assert_eq!(config.ttl(), Duration::from_secs(300));
    }
}
