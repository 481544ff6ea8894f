//! Configuration management for SectorSite services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use crate::errors::{AppError, Result};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Placeholder key shipped in sample env files; must never reach production.
pub const DEFAULT_ENCRYPTION_KEY: &str = "ai-cozumler-2024-secure-key-change-in-production";

/// Minimum encryption key length before a warning is logged
pub const MIN_ENCRYPTION_KEY_LEN: usize = 32;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Application environment and version
    #[serde(default)]
    pub app: AppSection,

    /// Backing store (row store + auth API)
    pub store: StoreConfig,

    /// Field encryption
    pub security: SecurityConfig,

    /// Multi-tenant routing
    #[serde(default)]
    pub tenancy: TenancyConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Deployment environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppEnvironment::Development => "development",
            AppEnvironment::Staging => "staging",
            AppEnvironment::Production => "production",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppSection {
    #[serde(default)]
    pub environment: AppEnvironment,

    #[serde(default = "default_app_version")]
    pub version: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Project URL, e.g. https://your-project.supabase.co
    pub url: String,

    /// Public (anon) API key sent as `apikey`
    pub anon_key: String,

    /// Secret used to verify store-issued access tokens
    pub jwt_secret: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures
    #[serde(default = "default_store_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityConfig {
    /// Process-wide master secret for field encryption
    pub encryption_key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TenancyConfig {
    #[serde(default = "default_main_domain")]
    pub main_domain: String,

    #[serde(default)]
    pub enable_subdomains: bool,

    #[serde(default = "default_sector")]
    pub default_sector: String,

    #[serde(default = "default_tenant_table")]
    pub tenant_table: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_concurrent() -> usize { 100 }
fn default_app_version() -> String { "1.0.0".to_string() }
fn default_store_timeout() -> u64 { 15 }
fn default_store_retries() -> u32 { 3 }
fn default_main_domain() -> String { "sitem.com".to_string() }
fn default_sector() -> String { "dentist".to_string() }
fn default_tenant_table() -> String { "tenants".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "sectorsite".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl Default for AppSection {
    fn default() -> Self {
        Self {
            environment: AppEnvironment::default(),
            version: default_app_version(),
        }
    }
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            main_domain: default_main_domain(),
            enable_subdomains: false,
            default_sector: default_sector(),
            tenant_table: default_tenant_table(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("app.environment", env.as_str())?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__STORE__URL=https://xyz.supabase.co
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate values that cannot be expressed through serde defaults.
    ///
    /// Missing store credentials or encryption key are fatal. A short key only
    /// warns. The shipped placeholder key is fatal in production.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.store.url.trim().is_empty() {
            missing.push("store.url");
        }
        if self.store.anon_key.trim().is_empty() {
            missing.push("store.anon_key");
        }
        if self.security.encryption_key.is_empty() {
            missing.push("security.encryption_key");
        }
        if !missing.is_empty() {
            return Err(AppError::Configuration {
                message: format!(
                    "Missing required configuration values: {}",
                    missing.join(", ")
                ),
            });
        }

        if self.server.request_timeout_secs == 0 || self.server.max_concurrent_requests == 0 {
            return Err(AppError::Configuration {
                message: "server.request_timeout_secs and server.max_concurrent_requests must be positive"
                    .to_string(),
            });
        }

        let url = url::Url::parse(&self.store.url).map_err(|e| AppError::Configuration {
            message: format!("Invalid store.url '{}': {}", self.store.url, e),
        })?;
        if url.scheme() != "https" && !self.is_development() {
            return Err(AppError::Configuration {
                message: "store.url must use https outside development".to_string(),
            });
        }

        if self.security.encryption_key.len() < MIN_ENCRYPTION_KEY_LEN {
            tracing::warn!(
                length = self.security.encryption_key.len(),
                minimum = MIN_ENCRYPTION_KEY_LEN,
                "Encryption key is shorter than recommended"
            );
        }

        if self.is_production() && self.security.encryption_key == DEFAULT_ENCRYPTION_KEY {
            return Err(AppError::Configuration {
                message: "The default encryption key must be changed in production".to_string(),
            });
        }

        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.app.environment == AppEnvironment::Development
    }

    pub fn is_staging(&self) -> bool {
        self.app.environment == AppEnvironment::Staging
    }

    pub fn is_production(&self) -> bool {
        self.app.environment == AppEnvironment::Production
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get store timeout as Duration
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store.timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                max_concurrent_requests: default_max_concurrent(),
            },
            app: AppSection::default(),
            store: StoreConfig {
                url: "http://localhost:54321".to_string(),
                anon_key: String::new(),
                jwt_secret: None,
                timeout_secs: default_store_timeout(),
                max_retries: default_store_retries(),
            },
            security: SecurityConfig {
                encryption_key: String::new(),
            },
            tenancy: TenancyConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.store.url = "https://demo.supabase.co".to_string();
        config.store.anon_key = "anon".to_string();
        config.security.encryption_key = "0123456789abcdef0123456789abcdef".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.tenancy.tenant_table, "tenants");
        assert!(config.is_development());
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_reports_missing_values() {
        let err = AppConfig::default().validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("store.anon_key"));
        assert!(message.contains("security.encryption_key"));
    }

    #[test]
    fn test_validate_requires_https_outside_development() {
        let mut config = valid_config();
        config.store.url = "http://demo.supabase.co".to_string();
        assert!(config.validate().is_ok());

        config.app.environment = AppEnvironment::Staging;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_key_rejected_in_production() {
        let mut config = valid_config();
        config.app.environment = AppEnvironment::Production;
        config.security.encryption_key = DEFAULT_ENCRYPTION_KEY.to_string();
        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration { .. })
        ));

        config.app.environment = AppEnvironment::Staging;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_server_limits() {
        let mut config = valid_config();
        config.server.max_concurrent_requests = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.server.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
