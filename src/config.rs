//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `PROJECT_RED_*` environment overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub matching: MatchingConfig,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub geocoding: GeocodingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// SQLite database location
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("project-red").join("project-red.db"))
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "./project_red_data/project-red.db".to_string())
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Cap on simultaneous WebSocket connections
    #[serde(default = "default_max_ws_connections")]
    pub max_ws_connections: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

fn default_max_ws_connections() -> usize {
    1000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            max_ws_connections: default_max_ws_connections(),
        }
    }
}

impl ApiConfig {
    /// `host:port` to bind
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Token lifetimes, hashing cost and reset links
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    #[serde(default = "default_access_minutes")]
    pub access_token_minutes: i64,

    #[serde(default = "default_refresh_days")]
    pub refresh_token_days: i64,

    #[serde(default = "default_reset_ttl")]
    pub reset_token_ttl_hours: i64,

    #[serde(default = "default_password_iterations")]
    pub password_iterations: u32,

    /// Base URL used in password-reset links
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
}

fn default_jwt_secret() -> String {
    "change-me-in-production".to_string()
}

fn default_access_minutes() -> i64 {
    60
}

fn default_refresh_days() -> i64 {
    7
}

fn default_reset_ttl() -> i64 {
    72
}

fn default_password_iterations() -> u32 {
    260_000
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            access_token_minutes: default_access_minutes(),
            refresh_token_days: default_refresh_days(),
            reset_token_ttl_hours: default_reset_ttl(),
            password_iterations: default_password_iterations(),
            frontend_url: default_frontend_url(),
        }
    }
}

/// Search radii and blood-group policy
#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_notify_radius")]
    pub notify_radius_km: f64,

    #[serde(default = "default_nearby_radius")]
    pub nearby_radius_km: f64,

    #[serde(default = "default_best_donor_radius")]
    pub best_donor_radius_km: f64,

    #[serde(default = "default_available_request_radius")]
    pub available_request_radius_km: f64,

    /// Match any compatible donor group instead of the exact group
    #[serde(default)]
    pub compatible_blood_groups: bool,
}

fn default_notify_radius() -> f64 {
    50.0
}

fn default_nearby_radius() -> f64 {
    50.0
}

fn default_best_donor_radius() -> f64 {
    100.0
}

fn default_available_request_radius() -> f64 {
    20.0
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            notify_radius_km: default_notify_radius(),
            nearby_radius_km: default_nearby_radius(),
            best_donor_radius_km: default_best_donor_radius(),
            available_request_radius_km: default_available_request_radius(),
            compatible_blood_groups: false,
        }
    }
}

/// Completion model used for hospital selection and health predictions
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_ai_base_url")]
    pub base_url: String,

    #[serde(default = "default_ai_model")]
    pub model: String,

    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,
}

fn default_ai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_ai_timeout() -> u64 {
    30
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            base_url: default_ai_base_url(),
            model: default_ai_model(),
            timeout_secs: default_ai_timeout(),
        }
    }
}

impl AiConfig {
    /// Key to use, if the model is enabled and configured
    pub fn active_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .filter(|key| self.enabled && !key.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_geocoding_url")]
    pub base_url: String,
}

fn default_geocoding_url() -> String {
    "https://maps.googleapis.com/maps/api/geocode/json".to_string()
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_geocoding_url(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from an explicit path, the default locations, or the environment
    pub fn load_from(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_with_env(path),
            None => Ok(Self::load_default()),
        }
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("project-red").join("config.toml")),
            Some(PathBuf::from("/etc/project-red/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(format!("PROJECT_RED_{name}")).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("DATABASE_PATH") {
            self.database.path = path;
        }

        if let Some(host) = var("API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = var("API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        if let Some(secret) = var("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(url) = var("FRONTEND_URL") {
            self.auth.frontend_url = url;
        }

        // A key in the environment switches the model on
        if let Some(key) = var("OPENAI_API_KEY") {
            self.ai.api_key = Some(key);
            self.ai.enabled = true;
        }
        if let Some(key) = var("GOOGLE_MAPS_API_KEY") {
            self.geocoding.api_key = Some(key);
        }

        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Project RED Configuration
#
# Environment variables override these settings:
# - PROJECT_RED_DATABASE_PATH
# - PROJECT_RED_API_HOST
# - PROJECT_RED_API_PORT
# - PROJECT_RED_JWT_SECRET
# - PROJECT_RED_FRONTEND_URL
# - PROJECT_RED_OPENAI_API_KEY
# - PROJECT_RED_GOOGLE_MAPS_API_KEY
# - PROJECT_RED_LOG_LEVEL
# - PROJECT_RED_LOG_FORMAT

[database]
# SQLite database file
path = "~/.local/share/project-red/project-red.db"

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8000

# Allowed CORS origins
cors_origins = ["http://localhost:3000", "http://127.0.0.1:3000", "http://localhost:5173"]

# Maximum simultaneous WebSocket connections
max_ws_connections = 1000

[auth]
# Signing key for access, refresh and password-reset tokens
jwt_secret = "change-me-in-production"

access_token_minutes = 60
refresh_token_days = 7
reset_token_ttl_hours = 72

# PBKDF2 iterations for new password hashes
password_iterations = 260000

# Base URL of the web client, used in reset links
frontend_url = "http://localhost:3000"

[matching]
# Donors notified about a new request (km)
notify_radius_km = 50.0

# Default radius of the nearby donor/hospital searches (km)
nearby_radius_km = 50.0

# Radius of the best-donor list (km)
best_donor_radius_km = 100.0

# Radius of requests shown to a donor (km)
available_request_radius_km = 20.0

# Match any compatible blood group instead of the exact group
compatible_blood_groups = false

[ai]
# Use a chat-completion model for hospital selection and health analysis
enabled = false
# api_key = "sk-..."
base_url = "https://api.openai.com/v1"
model = "gpt-3.5-turbo"
timeout_secs = 30

[geocoding]
# Google Maps key; addresses are not geocoded without one
# api_key = "..."

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty, json
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.port, 8000);
        assert_eq!(config.matching.notify_radius_km, 50.0);
        assert_eq!(config.matching.available_request_radius_km, 20.0);
        assert!(!config.matching.compatible_blood_groups);
        assert!(config.ai.active_key().is_none());
    }

    #[test]
    fn test_generated_config_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();
        assert_eq!(config.api.port, 8000);
        assert_eq!(config.auth.reset_token_ttl_hours, 72);
        assert_eq!(config.matching.best_donor_radius_km, 100.0);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = Config::parse("[api]\nport = 9000\n").unwrap();
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.auth.access_token_minutes, 60);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("API_PORT", "9100"),
            ("JWT_SECRET", "from-env"),
            ("OPENAI_API_KEY", "sk-test"),
            ("LOG_FORMAT", "json"),
            ("DATABASE_PATH", ":memory:"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.api.port, 9100);
        assert_eq!(config.auth.jwt_secret, "from-env");
        assert_eq!(config.ai.active_key(), Some("sk-test"));
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.database.path, ":memory:");
    }

    #[test]
    fn test_bad_port_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|name| (name == "API_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.api.port, 8000);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[matching]\ncompatible_blood_groups = true\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert!(config.matching.compatible_blood_groups);
    }
}
