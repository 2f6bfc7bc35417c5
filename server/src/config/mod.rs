use std::env;
use std::str::FromStr;
use std::time::Duration;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

use crate::services::retry::RetryPolicy;

const DEV_JWT_SECRET: &str = "pace-development-secret-change-me";

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// `None` runs the service against the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub cors_allowed_origins: Vec<String>,
    /// Emit `Strict-Transport-Security`; only behind HTTPS.
    pub include_hsts: bool,
    pub waitlist_batch_size: i64,
    /// Run a waitlist batch whenever a seat goes back to `available`.
    pub waitlist_auto_notify: bool,
    /// Upper bound on the total quantity of a single booking.
    pub max_tickets_per_booking: i32,
    pub retry: RetryPolicy,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

impl Config {
    /// Reads configuration from the environment.
    ///
    /// `JWT_SECRET` may only be omitted outside production, in which case a
    /// fixed development secret is used.
    pub fn from_env() -> Result<Self, ConfigError> {
        let production = is_production();

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ if production => return Err(ConfigError::Missing("JWT_SECRET")),
            _ => {
                tracing::warn!("JWT_SECRET not set, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let retry = RetryPolicy {
            max_attempts: parse_var("STORE_RETRY_ATTEMPTS", 3)?,
            base_delay: Duration::from_millis(parse_var("STORE_RETRY_BASE_MS", 50)?),
        };

        let max_tickets_per_booking: i32 = parse_var("MAX_TICKETS_PER_BOOKING", 10)?;
        if max_tickets_per_booking < 1 {
            return Err(ConfigError::Invalid {
                name: "MAX_TICKETS_PER_BOOKING",
                value: max_tickets_per_booking.to_string(),
            });
        }

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_var("PORT", 3001)?,
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5)?,
            jwt_secret,
            cors_allowed_origins: split_origins(
                &env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_ALLOWED_ORIGINS.to_string()),
            ),
            include_hsts: production,
            waitlist_batch_size: parse_var("WAITLIST_BATCH_SIZE", 5)?,
            waitlist_auto_notify: parse_var("WAITLIST_AUTO_NOTIFY", false)?,
            max_tickets_per_booking,
            retry,
        })
    }

    /// Configuration for tests and local tooling: in-memory store, fixed secret.
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: None,
            database_max_connections: 1,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            cors_allowed_origins: split_origins(DEFAULT_ALLOWED_ORIGINS),
            include_hsts: false,
            waitlist_batch_size: 5,
            waitlist_auto_notify: false,
            max_tickets_per_booking: 10,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            },
        }
    }
}

pub fn is_production() -> bool {
    env::var("RUST_ENV")
        .map(|v| v.to_lowercase() == "production")
        .unwrap_or(false)
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_uses_default_when_unset() {
        std::env::remove_var("PACE_TEST_UNSET_VAR");
        let value: u16 = parse_var("PACE_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        std::env::set_var("PACE_TEST_BAD_PORT", "not-a-port");
        let result: Result<u16, _> = parse_var("PACE_TEST_BAD_PORT", 3001);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
        std::env::remove_var("PACE_TEST_BAD_PORT");
    }

    #[test]
    fn test_split_origins_skips_blanks() {
        let origins = split_origins(" http://a.test, ,http://b.test ");
        assert_eq!(origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn test_config_for_tests_has_no_database() {
        let config = Config::for_tests();
        assert!(config.database_url.is_none());
        assert_eq!(config.waitlist_batch_size, 5);
    }
}
