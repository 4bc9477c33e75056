use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_SIGNATURE_HEADER: &str = "x-razorpay-signature";
const DEFAULT_CARRIER_BASE_URL: &str = "https://staging-express.delhivery.com";
const DEFAULT_SHIPPING_MODE: &str = "Surface";
const DEFAULT_PRODUCT_CACHE_TTL_SECS: u64 = 300;

/// Payment gateway secrets.
///
/// Both secrets are optional at load time so the server can boot for browsing
/// and cart traffic; the verification paths fail closed with a configuration
/// error when the secret they need is absent.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentConfig {
    /// Gateway API key secret used to sign `order_id|payment_id` on client confirmation
    #[serde(default)]
    pub key_secret: Option<String>,

    /// Secret configured on the gateway dashboard for webhook deliveries
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Header carrying the webhook signature
    #[serde(default = "default_signature_header")]
    pub signature_header: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            key_secret: None,
            webhook_secret: None,
            signature_header: default_signature_header(),
        }
    }
}

/// Carrier (Delhivery-style) shipment API settings
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CarrierConfig {
    #[serde(default = "default_carrier_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_token: Option<String>,

    /// Registered warehouse name; absent means the account is not provisioned
    #[serde(default)]
    pub pickup_location: Option<String>,

    #[serde(default = "default_outbound_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_weight_grams")]
    pub default_weight_grams: f64,

    #[serde(default = "default_dimension_cm")]
    pub default_length_cm: f64,

    #[serde(default = "default_dimension_cm")]
    pub default_breadth_cm: f64,

    #[serde(default = "default_dimension_cm")]
    pub default_height_cm: f64,

    #[serde(default = "default_shipping_mode")]
    pub default_shipping_mode: String,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            base_url: default_carrier_base_url(),
            api_token: None,
            pickup_location: None,
            timeout_secs: default_outbound_timeout_secs(),
            default_weight_grams: default_weight_grams(),
            default_length_cm: default_dimension_cm(),
            default_breadth_cm: default_dimension_cm(),
            default_height_cm: default_dimension_cm(),
            default_shipping_mode: default_shipping_mode(),
        }
    }
}

impl CarrierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Transactional email API settings. Without `api_url` mails are only logged.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailConfig {
    #[serde(default)]
    pub api_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_from_address")]
    pub from_address: String,

    #[serde(default = "default_outbound_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            from_address: default_from_address(),
            timeout_secs: default_outbound_timeout_secs(),
        }
    }
}

/// Product catalog collaborator and its cache
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_product_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_outbound_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            cache_ttl_secs: default_product_cache_ttl_secs(),
            timeout_secs: default_outbound_timeout_secs(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1))]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Whole-request timeout applied by the HTTP layer (seconds)
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub payment: PaymentConfig,

    #[serde(default)]
    pub carrier: CarrierConfig,

    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl AppConfig {
    /// Creates a new configuration with defaults for every optional section
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            payment: PaymentConfig::default(),
            carrier: CarrierConfig::default(),
            email: EmailConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_min_connections");
            err.message = Some("db_min_connections must not exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        if self.is_production() && self.payment.webhook_secret.is_none() {
            let mut err = ValidationError::new("payment_webhook_secret_required");
            err.message = Some(
                "Set APP__PAYMENT__WEBHOOK_SECRET in production; webhooks are rejected without it"
                    .into(),
            );
            errors.add("payment", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_signature_header() -> String {
    DEFAULT_SIGNATURE_HEADER.to_string()
}

fn default_carrier_base_url() -> String {
    DEFAULT_CARRIER_BASE_URL.to_string()
}

fn default_outbound_timeout_secs() -> u64 {
    15
}

fn default_weight_grams() -> f64 {
    500.0
}

fn default_dimension_cm() -> f64 {
    10.0
}

fn default_shipping_mode() -> String {
    DEFAULT_SHIPPING_MODE.to_string()
}

fn default_from_address() -> String {
    "orders@storefront.local".to_string()
}

fn default_product_cache_ttl_secs() -> u64 {
    DEFAULT_PRODUCT_CACHE_TTL_SECS
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    if app_config.payment.key_secret.is_none() {
        info!("Payment key secret not configured; client payment confirmation will be rejected");
    }
    if app_config.carrier.pickup_location.is_none() {
        info!("Carrier pickup location not configured; shipments will use demo waybills");
    }

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let mut cfg = base_config();
        cfg.payment.webhook_secret = Some("whsec".into());
        let errors = cfg.validate_additional_constraints().unwrap_err();
        assert!(errors.errors().contains_key("cors_allowed_origins"));
    }

    #[test]
    fn production_requires_webhook_secret() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://shop.example.com".into());
        let errors = cfg.validate_additional_constraints().unwrap_err();
        assert!(errors.errors().contains_key("payment"));

        cfg.payment.webhook_secret = Some("whsec".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn development_allows_missing_secrets() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn pool_bounds_are_checked() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.db_min_connections = 20;
        cfg.db_max_connections = 4;
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut cfg = base_config();
        cfg.log_level = "verbose".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn carrier_defaults_match_fallback_parcel() {
        let carrier = CarrierConfig::default();
        assert_eq!(carrier.default_weight_grams, 500.0);
        assert_eq!(carrier.default_shipping_mode, "Surface");
        assert!(carrier.pickup_location.is_none());
    }
}
