//! Application configuration

use std::env;
use std::time::Duration;

use crate::websocket::PumpSettings;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub log_format: LogFormat,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Authentication
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub chat_token_expiry_minutes: i64,

    // WebSocket
    pub ws_write_wait_secs: u64,
    pub ws_pong_wait_secs: u64,
    pub ws_max_message_bytes: usize,
    pub ws_outbound_queue_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5),

            // Authentication
            jwt_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            jwt_expiry_hours: parse_or("JWT_EXPIRY_HOURS", 24),
            chat_token_expiry_minutes: parse_or("CHAT_TOKEN_EXPIRY_MINUTES", 120),

            // WebSocket
            ws_write_wait_secs: parse_or("WS_WRITE_WAIT_SECS", 10),
            ws_pong_wait_secs: parse_or("WS_PONG_WAIT_SECS", 60),
            ws_max_message_bytes: parse_or("WS_MAX_MESSAGE_BYTES", 8192),
            ws_outbound_queue_capacity: parse_or("WS_OUTBOUND_QUEUE_CAPACITY", 256),
        };

        if config.ws_pong_wait_secs == 0 {
            return Err(ConfigError::Invalid("WS_PONG_WAIT_SECS must be greater than 0"));
        }
        if config.ws_outbound_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "WS_OUTBOUND_QUEUE_CAPACITY must be greater than 0",
            ));
        }

        Ok(config)
    }

    /// Socket pump timings derived from this configuration
    pub fn pump_settings(&self) -> PumpSettings {
        PumpSettings::new(
            Duration::from_secs(self.ws_write_wait_secs),
            Duration::from_secs(self.ws_pong_wait_secs),
            self.ws_max_message_bytes,
            self.ws_outbound_queue_capacity,
        )
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn setup_minimal_config() {
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
    }

    fn cleanup_config() {
        for key in [
            "DATABASE_URL",
            "JWT_SECRET",
            "WS_PONG_WAIT_SECS",
            "WS_OUTBOUND_QUEUE_CAPACITY",
            "WS_MAX_MESSAGE_BYTES",
            "LOG_FORMAT",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        setup_minimal_config();
        let config = Config::from_env().expect("config should load");
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.ws_pong_wait_secs, 60);
        assert_eq!(config.ws_outbound_queue_capacity, 256);
        assert_eq!(config.log_format, LogFormat::Pretty);

        let settings = config.pump_settings();
        assert_eq!(settings.ping_period, Duration::from_secs(54));
        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_missing_database_url() {
        cleanup_config();
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));
        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_weak_jwt_secret_rejected() {
        setup_minimal_config();
        env::set_var("JWT_SECRET", "short");
        assert!(matches!(Config::from_env(), Err(ConfigError::WeakSecret(_))));
        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_zero_queue_capacity_rejected() {
        setup_minimal_config();
        env::set_var("WS_OUTBOUND_QUEUE_CAPACITY", "0");
        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid(_))));
        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_unparseable_values_fall_back_to_defaults() {
        setup_minimal_config();
        env::set_var("WS_MAX_MESSAGE_BYTES", "lots");
        env::set_var("LOG_FORMAT", "json");
        let config = Config::from_env().expect("config should load");
        assert_eq!(config.ws_max_message_bytes, 8192);
        assert_eq!(config.log_format, LogFormat::Json);
        cleanup_config();
    }
}
