//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: TOURBOOK_, nested keys separated by `__`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/tourbook/{service_name}/config.toml
//! 4. System directory: /etc/tourbook/{service_name}/config.toml
//! 5. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// JWT configuration
    pub jwt: JwtConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,

    /// Middleware configuration
    #[serde(default)]
    pub middleware: MiddlewareConfig,

    /// Password hashing and reset configuration
    #[serde(default)]
    pub password: PasswordConfig,

    /// Outgoing email configuration
    #[serde(default)]
    pub email: EmailConfig,

    /// Payment gateway configuration (optional)
    #[serde(default)]
    pub payments: Option<PaymentsConfig>,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Environment (development, production)
    #[serde(default = "default_environment")]
    pub environment: Environment,
}

/// Deployment environment, controls error verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Error bodies carry debug detail
    Development,
    /// Error bodies carry only status and message
    Production,
}

impl Environment {
    /// Whether this is a production deployment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HMAC secret used to sign tokens
    pub secret: String,

    /// Token lifetime in seconds
    #[serde(default = "default_jwt_expires_secs")]
    pub expires_in_secs: u64,

    /// Lifetime of the `jwt` cookie in days
    #[serde(default = "default_cookie_expires_days")]
    pub cookie_expires_days: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: "change-me-in-production-please-32b".to_string(),
            expires_in_secs: default_jwt_expires_secs(),
            cookie_expires_days: default_cookie_expires_days(),
        }
    }
}

impl JwtConfig {
    /// Token lifetime as Duration
    pub fn expires_in(&self) -> Duration {
        Duration::from_secs(self.expires_in_secs)
    }
}

/// Rate limiting configuration for the `/api` surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per client within the window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Window as Duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Middleware configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Request tracking configuration (request IDs, header propagation)
    #[serde(default)]
    pub request_tracking: RequestTrackingConfig,

    /// Request body size limit in KB
    #[serde(default = "default_body_limit_kb")]
    pub body_limit_kb: usize,

    /// Enable panic recovery middleware
    #[serde(default = "default_true")]
    pub catch_panic: bool,

    /// Enable compression
    #[serde(default = "default_true")]
    pub compression: bool,

    /// Enable security response headers
    #[serde(default = "default_true")]
    pub security_headers: bool,

    /// CORS configuration
    #[serde(default = "default_cors_mode")]
    pub cors_mode: String,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            request_tracking: RequestTrackingConfig::default(),
            body_limit_kb: default_body_limit_kb(),
            catch_panic: true,
            compression: true,
            security_headers: true,
            cors_mode: default_cors_mode(),
        }
    }
}

/// Request tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTrackingConfig {
    /// Enable request ID generation
    #[serde(default = "default_true")]
    pub request_id_enabled: bool,

    /// Request ID header name
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,

    /// Enable sensitive header masking in logs
    #[serde(default = "default_true")]
    pub mask_sensitive_headers: bool,
}

impl Default for RequestTrackingConfig {
    fn default() -> Self {
        Self {
            request_id_enabled: true,
            request_id_header: default_request_id_header(),
            mask_sensitive_headers: true,
        }
    }
}

/// Password hashing (Argon2id) and reset-token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordConfig {
    /// Memory cost in KiB
    #[serde(default = "default_memory_cost_kib")]
    pub memory_cost_kib: u32,

    /// Number of iterations
    #[serde(default = "default_time_cost")]
    pub time_cost: u32,

    /// Degree of parallelism
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,

    /// Minimum accepted password length
    #[serde(default = "default_min_password_length")]
    pub min_length: usize,

    /// Password reset token lifetime in seconds
    #[serde(default = "default_reset_token_ttl")]
    pub reset_token_ttl_secs: i64,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost_kib: default_memory_cost_kib(),
            time_cost: default_time_cost(),
            parallelism: default_parallelism(),
            min_length: default_min_password_length(),
            reset_token_ttl_secs: default_reset_token_ttl(),
        }
    }
}

/// Outgoing email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Sender address
    #[serde(default = "default_email_from")]
    pub from: String,

    /// Public base URL used in links sent to users
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from: default_email_from(),
            public_url: default_public_url(),
        }
    }
}

/// Payment gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentsConfig {
    /// Gateway API base URL
    #[serde(default = "default_payments_api_url")]
    pub api_url: String,

    /// Gateway secret key
    pub secret_key: String,

    /// ISO currency code for line items
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Gateway request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            api_url: default_payments_api_url(),
            secret_key: String::new(),
            currency: default_currency(),
            timeout_secs: default_timeout(),
        }
    }
}

impl PaymentsConfig {
    /// Request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_environment() -> Environment {
    Environment::Development
}

fn default_jwt_expires_secs() -> u64 {
    90 * 24 * 60 * 60
}

fn default_cookie_expires_days() -> i64 {
    90
}

fn default_max_requests() -> u32 {
    100
}

fn default_window_secs() -> u64 {
    60 * 60
}

fn default_true() -> bool {
    true
}

fn default_body_limit_kb() -> usize {
    10
}

fn default_cors_mode() -> String {
    "permissive".to_string()
}

fn default_request_id_header() -> String {
    "x-request-id".to_string()
}

// OWASP minimum for Argon2id
fn default_memory_cost_kib() -> u32 {
    19_456
}

fn default_time_cost() -> u32 {
    2
}

fn default_parallelism() -> u32 {
    1
}

fn default_min_password_length() -> usize {
    8
}

fn default_reset_token_ttl() -> i64 {
    10 * 60
}

fn default_email_from() -> String {
    "tourbook <hello@tourbook.io>".to_string()
}

fn default_public_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_payments_api_url() -> String {
    "https://api.stripe.com/v1".to_string()
}

fn default_currency() -> String {
    "usd".to_string()
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Searches for config files in this order (first found is used):
    /// 1. Current working directory: ./config.toml
    /// 2. XDG config directory: ~/.config/tourbook/{service_name}/config.toml
    /// 3. System directory: /etc/tourbook/{service_name}/config.toml
    ///
    /// Environment variables (TOURBOOK_ prefix) override all file-based configs.
    pub fn load() -> Result<Self> {
        Self::load_for_service("tourbook")
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Lowest priority first so later files override earlier ones
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("TOURBOOK_").split("__"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// This bypasses XDG directories and loads directly from the given path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("TOURBOOK_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// Find all possible config file paths for a service, highest priority first
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix("tourbook");
        if let Some(path) = xdg_dirs.find_config_file(Path::new(service_name).join("config.toml")) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc/tourbook")
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }

    /// Whether error responses should hide internal detail
    pub fn is_production(&self) -> bool {
        self.service.environment.is_production()
    }

    /// Request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.service.timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "tourbook".to_string(),
                port: default_port(),
                log_level: default_log_level(),
                timeout_secs: default_timeout(),
                environment: default_environment(),
            },
            jwt: JwtConfig::default(),
            rate_limit: RateLimitConfig::default(),
            middleware: MiddlewareConfig::default(),
            password: PasswordConfig::default(),
            email: EmailConfig::default(),
            payments: None,
        }
    }
}
