//! Configuration management for Bookshelf services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Hosted platform (identity, documents, blobs)
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Open Library metadata API
    #[serde(default)]
    pub openlibrary: OpenLibraryConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
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

    /// Largest accepted request body (cover uploads)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Which platform backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformProvider {
    Appwrite,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformConfig {
    /// Backend selection: appwrite, memory
    #[serde(default = "default_provider")]
    pub provider: PlatformProvider,

    /// API endpoint, including the version prefix
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Project identifier sent with every request
    #[serde(default)]
    pub project_id: String,

    /// Server API key (required to mint session secrets)
    pub api_key: Option<String>,

    /// Database holding the catalog collection
    #[serde(default)]
    pub database_id: String,

    /// Catalog collection
    #[serde(default)]
    pub books_collection_id: String,

    /// Bucket for cover images
    #[serde(default)]
    pub bucket_id: String,

    /// Request timeout in seconds
    #[serde(default = "default_platform_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenLibraryConfig {
    /// API base URL
    #[serde(default = "default_openlibrary_url")]
    pub base_url: String,

    /// Covers CDN base URL
    #[serde(default = "default_covers_url")]
    pub covers_url: String,

    /// Maximum results kept from a free-text search
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Request timeout in seconds
    #[serde(default = "default_openlibrary_timeout")]
    pub timeout_secs: u64,

    /// User agent sent with each request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Where callers are sent after logging out or when a login is required
    #[serde(default = "default_login_path")]
    pub login_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
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

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_upload_bytes() -> usize { 10 * 1024 * 1024 }
fn default_provider() -> PlatformProvider { PlatformProvider::Appwrite }
fn default_endpoint() -> String { "https://cloud.appwrite.io/v1".to_string() }
fn default_platform_timeout() -> u64 { 15 }
fn default_openlibrary_url() -> String { "https://openlibrary.org".to_string() }
fn default_covers_url() -> String { "https://covers.openlibrary.org".to_string() }
fn default_search_limit() -> usize { 20 }
fn default_openlibrary_timeout() -> u64 { 10 }
fn default_user_agent() -> String { format!("Bookshelf/{}", crate::VERSION) }
fn default_login_path() -> String { "/login".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "bookshelf".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__PLATFORM__PROJECT_ID=abc
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the remote platform cannot be addressed with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.platform.provider == PlatformProvider::Memory {
            return Ok(());
        }

        let required = [
            ("platform.project_id", &self.platform.project_id),
            ("platform.database_id", &self.platform.database_id),
            ("platform.books_collection_id", &self.platform.books_collection_id),
            ("platform.bucket_id", &self.platform.bucket_id),
        ];

        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::NotFound(key.to_string()));
            }
        }

        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

impl PlatformConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Endpoint without a trailing slash
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}

impl OpenLibraryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            endpoint: default_endpoint(),
            project_id: String::new(),
            api_key: None,
            database_id: String::new(),
            books_collection_id: String::new(),
            bucket_id: String::new(),
            timeout_secs: default_platform_timeout(),
        }
    }
}

impl Default for OpenLibraryConfig {
    fn default() -> Self {
        Self {
            base_url: default_openlibrary_url(),
            covers_url: default_covers_url(),
            search_limit: default_search_limit(),
            timeout_secs: default_openlibrary_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_path: default_login_path(),
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
