//! Application configuration loaded from environment variables.

use std::str::FromStr;

use domain::BookingRules;
use domain::rules::DEFAULT_MAX_PARTY_SIZE;
use settlement::GatewayConfig;

/// Deployment environment. Production hides internal error details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `APP_ENV`: `development` or `production` (default: `development`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset runs in memory
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `MAX_PARTY_SIZE`: largest party per reservation (default: `20`)
/// - `PAYMENT_LATENCY_MS`: simulated gateway delay (default: `1500`)
/// - `NOTIFICATION_BUFFER`: outbox queue length (default: `256`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub environment: Environment,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub max_party_size: u32,
    pub payment_latency_ms: u64,
    pub notification_buffer: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            environment: lookup("APP_ENV")
                .map(|v| Environment::parse(&v))
                .unwrap_or(defaults.environment),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            max_party_size: parse_var(&lookup, "MAX_PARTY_SIZE")
                .unwrap_or(defaults.max_party_size),
            payment_latency_ms: parse_var(&lookup, "PAYMENT_LATENCY_MS")
                .unwrap_or(defaults.payment_latency_ms),
            notification_buffer: parse_var(&lookup, "NOTIFICATION_BUFFER")
                .unwrap_or(defaults.notification_buffer),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn expose_error_details(&self) -> bool {
        self.environment != Environment::Production
    }

    pub fn booking_rules(&self) -> BookingRules {
        BookingRules {
            max_party_size: self.max_party_size,
        }
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig::with_latency_ms(self.payment_latency_ms)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            environment: Environment::Development,
            database_url: None,
            database_max_connections: 5,
            max_party_size: DEFAULT_MAX_PARTY_SIZE,
            payment_latency_ms: 1500,
            notification_buffer: 256,
        }
    }
}
