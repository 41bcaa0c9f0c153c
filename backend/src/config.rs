//! Configuration management for the IEEP ERP platform
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with ERP__ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::models::{AlertPolicy, RoleName};

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT authentication configuration
    pub jwt: JwtConfig,

    /// Reorder alerting and forecasting
    pub alerts: AlertsConfig,

    /// Where reorder notifications are delivered
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key for signing JWT tokens
    pub secret: String,

    /// Access token expiration in seconds
    pub access_token_expiry: i64,

    /// Refresh token expiration in seconds
    pub refresh_token_expiry: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    /// Minimum hours between two notifications for one stock item
    pub cooldown_hours: i64,

    /// Trailing window for the usage rate
    pub usage_lookback_days: i64,

    /// Days before expiry at which a batch is reported as near expiry
    pub near_expiry_days: i64,

    /// Roles whose active members receive reorder alerts
    pub recipient_roles: Vec<RoleName>,
}

impl AlertsConfig {
    pub fn policy(&self) -> AlertPolicy {
        AlertPolicy::with_cooldown_hours(self.cooldown_hours)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Log,
    InApp,
    Webhook,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationsConfig {
    pub sink: SinkKind,

    /// Target of the webhook sink
    pub webhook_url: Option<String>,

    /// HMAC key used to sign webhook bodies
    pub webhook_secret: Option<String>,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("ERP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 8000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("jwt.access_token_expiry", 3600)?
            .set_default("jwt.refresh_token_expiry", 604800)?
            .set_default("alerts.cooldown_hours", shared::models::ALERT_COOLDOWN_HOURS)?
            .set_default("alerts.usage_lookback_days", shared::models::USAGE_LOOKBACK_DAYS)?
            .set_default("alerts.near_expiry_days", shared::models::NEAR_EXPIRY_DAYS)?
            .set_default("alerts.recipient_roles", vec!["inventory_clerk", "procurement"])?
            .set_default("notifications.sink", "log")?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (ERP__ prefix)
            .add_source(
                Environment::with_prefix("ERP")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("alerts.recipient_roles")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
