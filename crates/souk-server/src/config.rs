//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Credential settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Relay and history tunables.
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS. Empty allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Credential configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret shared with the storefront's login service.
    #[serde(default)]
    pub jwt_secret: String,

    /// Lifetime of tokens issued by this server.
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
}

/// Messaging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingConfig {
    /// Page size used when the client does not pass `limit`.
    #[serde(default = "default_history_page_size")]
    pub history_page_size: u32,

    /// Upper bound applied to a client-supplied `limit`.
    #[serde(default = "default_max_history_page_size")]
    pub max_history_page_size: u32,

    /// Maximum message length in bytes, after trimming.
    #[serde(default = "default_max_content_len")]
    pub max_content_len: usize,

    /// Outbound frames buffered per connection before frames are dropped.
    #[serde(default = "default_session_buffer")]
    pub session_buffer: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "souk_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "souk.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_token_ttl_days() -> i64 {
    30
}

fn default_history_page_size() -> u32 {
    20
}

fn default_max_history_page_size() -> u32 {
    100
}

fn default_max_content_len() -> usize {
    65_536
}

fn default_session_buffer() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_days: default_token_ttl_days(),
        }
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            history_page_size: default_history_page_size(),
            max_history_page_size: default_max_history_page_size(),
            max_content_len: default_max_content_len(),
            session_buffer: default_session_buffer(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Rejects settings the server cannot start with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "auth.jwt_secret must be set (or SOUK_JWT_SECRET)".to_string(),
            ));
        }
        if self.auth.token_ttl_days <= 0 {
            return Err(ConfigError::Invalid(
                "auth.token_ttl_days must be positive".to_string(),
            ));
        }
        if self.messaging.history_page_size == 0
            || self.messaging.history_page_size > self.messaging.max_history_page_size
        {
            return Err(ConfigError::Invalid(
                "messaging.history_page_size must be in 1..=max_history_page_size".to_string(),
            ));
        }
        if self.messaging.session_buffer == 0 {
            return Err(ConfigError::Invalid(
                "messaging.session_buffer must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A setting is out of range or missing.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `SOUK_HOST` overrides `server.host`
/// - `SOUK_PORT` overrides `server.port`
/// - `SOUK_DB_PATH` overrides `database.path`
/// - `SOUK_JWT_SECRET` (or `JWT_SECRET`) overrides `auth.jwt_secret`
/// - `SOUK_LOG_LEVEL` overrides `logging.level`
/// - `SOUK_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("SOUK_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("SOUK_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(db_path) = var("SOUK_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(secret) = var("SOUK_JWT_SECRET").or_else(|| var("JWT_SECRET")) {
        config.auth.jwt_secret = secret;
    }
    if let Some(level) = var("SOUK_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("SOUK_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.path, "souk.db");
        assert_eq!(config.auth.token_ttl_days, 30);
        assert_eq!(config.messaging.history_page_size, 20);
        assert_eq!(config.messaging.session_buffer, 256);
        assert!(config.server.allowed_origins.is_empty());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 4100

            [auth]
            jwt_secret = "s3cret"

            [messaging]
            history_page_size = 50
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.server.port, 4100);
        assert_eq!(config.server.host, default_host());
        assert_eq!(config.messaging.history_page_size, 50);
        assert_eq!(config.messaging.max_history_page_size, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).expect("missing file is not an error");
        assert_eq!(config.database.busy_timeout_ms, 5_000);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(matches!(
            load_config(path.to_str()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_take_precedence() {
        let env: HashMap<&str, &str> = [
            ("SOUK_PORT", "8080"),
            ("SOUK_HOST", "0.0.0.0"),
            ("JWT_SECRET", "from-legacy-var"),
            ("SOUK_LOG_JSON", "1"),
            ("SOUK_DB_PATH", "/tmp/x.db"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.auth.jwt_secret, "from-legacy-var");
        assert!(config.logging.json);
        assert_eq!(config.database.path, "/tmp/x.db");
    }

    #[test]
    fn souk_secret_wins_over_legacy_name() {
        let env: HashMap<&str, &str> = [("SOUK_JWT_SECRET", "primary"), ("JWT_SECRET", "legacy")]
            .into_iter()
            .collect();
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.auth.jwt_secret, "primary");
    }

    #[test]
    fn unparseable_port_is_ignored() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| (k == "SOUK_PORT").then(|| "nope".to_string()));
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn empty_secret_fails_validation() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn page_size_above_maximum_fails_validation() {
        let mut config = Config::default();
        config.auth.jwt_secret = "x".to_string();
        config.messaging.history_page_size = 500;
        assert!(config.validate().is_err());
    }
}
