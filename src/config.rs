use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::pricing::providers::{litellm, openrouter};

/// Environment variable prefix, e.g. `AGENT_PRICING__SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "AGENT_PRICING";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub refresh_on_startup: bool,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
    #[serde(default)]
    pub litellm: LiteLlmConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenRouterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_openrouter_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LiteLlmConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_litellm_url")]
    pub url: String,
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_database_url() -> String {
    "sqlite://./data/pricing.db".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cleanup_interval() -> u64 {
    3600
}

fn default_openrouter_url() -> String {
    openrouter::DEFAULT_BASE_URL.to_string()
}

fn default_litellm_url() -> String {
    litellm::DEFAULT_URL.to_string()
}

fn default_provider_timeout() -> u64 {
    30
}

fn default_refresh_interval() -> u64 {
    6 * 3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_on_startup: true,
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_openrouter_url(),
            api_key: None,
            timeout_seconds: default_provider_timeout(),
            refresh_interval_seconds: default_refresh_interval(),
        }
    }
}

impl Default for LiteLlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_litellm_url(),
            timeout_seconds: default_provider_timeout(),
            refresh_interval_seconds: default_refresh_interval(),
        }
    }
}

/// Load configuration from an optional TOML file overlaid with environment variables.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.server.host.trim().is_empty() {
        anyhow::bail!("server.host cannot be empty");
    }
    if cfg.server.port == 0 {
        anyhow::bail!("server.port must be non-zero");
    }
    if cfg.server.request_timeout_seconds == 0 {
        anyhow::bail!("server.request_timeout_seconds must be positive");
    }
    match cfg.server.log_format.as_str() {
        "text" | "json" => {}
        other => anyhow::bail!("Invalid log format: {} (expected text or json)", other),
    }

    if cfg.database.url.trim().is_empty() {
        anyhow::bail!("database.url cannot be empty");
    }

    if cfg.refresh.cleanup_interval_seconds == 0 {
        anyhow::bail!("refresh.cleanup_interval_seconds must be positive");
    }

    let openrouter = &cfg.providers.openrouter;
    if openrouter.enabled {
        if openrouter.base_url.trim().is_empty() {
            anyhow::bail!("providers.openrouter.base_url cannot be empty");
        }
        if openrouter.timeout_seconds == 0 || openrouter.refresh_interval_seconds == 0 {
            anyhow::bail!("providers.openrouter timeouts and intervals must be positive");
        }
    }

    let litellm = &cfg.providers.litellm;
    if litellm.enabled {
        if litellm.url.trim().is_empty() {
            anyhow::bail!("providers.litellm.url cannot be empty");
        }
        if litellm.timeout_seconds == 0 || litellm.refresh_interval_seconds == 0 {
            anyhow::bail!("providers.litellm timeouts and intervals must be positive");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        assert!(validate_config(&cfg).is_ok());
        assert!(cfg.providers.openrouter.enabled);
        assert!(!cfg.providers.litellm.enabled);
    }

    #[test]
    fn test_validate_config_rejects_zero_port() {
        let mut cfg = Config::default();
        cfg.server.port = 0;

        let result = validate_config(&cfg);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("server.port"));
    }

    #[test]
    fn test_validate_config_rejects_unknown_log_format() {
        let mut cfg = Config::default();
        cfg.server.log_format = "yaml".to_string();

        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_disabled_provider_is_not_validated() {
        let mut cfg = Config::default();
        cfg.providers.litellm.url = String::new();
        assert!(validate_config(&cfg).is_ok());

        cfg.providers.litellm.enabled = true;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_load_config_from_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pricing.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9191

[providers.litellm]
enabled = true
refresh_interval_seconds = 60
"#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.port, 9191);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert!(cfg.providers.litellm.enabled);
        assert_eq!(cfg.providers.litellm.refresh_interval_seconds, 60);
        assert_eq!(cfg.providers.openrouter.base_url, "https://openrouter.ai/api/v1");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.database.url, "sqlite://./data/pricing.db");
    }
}
