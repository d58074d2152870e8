//! Application configuration loaded from environment variables.

use std::time::Duration;

use engine::EngineConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `DATABASE_URL` — Postgres connection string; the in-memory store
///   is used when unset
/// - `PAYMENT_SECRET` — shared secret for payment callback signatures
/// - `OP_TIMEOUT_MS` — bound on one engine operation (default: `5000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub payment_secret: Option<String>,
    pub op_timeout_ms: u64,
    pub log_level: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            database_url: std::env::var("DATABASE_URL").ok(),
            payment_secret: std::env::var("PAYMENT_SECRET").ok(),
            op_timeout_ms: std::env::var("OP_TIMEOUT_MS")
                .ok()
                .and_then(|ms| ms.parse().ok())
                .unwrap_or(5000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the engine configuration derived from the environment.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default().with_op_timeout(Duration::from_millis(self.op_timeout_ms))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            payment_secret: None,
            op_timeout_ms: 5000,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.database_url, None);
        assert_eq!(config.payment_secret, None);
        assert_eq!(config.op_timeout_ms, 5000);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_engine_config_uses_timeout() {
        let config = Config {
            op_timeout_ms: 250,
            ..Config::default()
        };
        assert_eq!(
            config.engine_config().op_timeout,
            Duration::from_millis(250)
        );
    }
}
