use std::env;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::time::Duration;

/// Configuration errors with descriptive messages.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Process-wide configuration, loaded once at startup (§6.1).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub redis_target: String,
    pub workers: usize,
    pub debug: bool,
    pub http_max_connections: usize,
    pub http_timeout: Duration,
    pub control_addr: SocketAddr,
}

fn env_parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var: name.into(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let redis_target =
            env::var("REDIS_TARGET").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
        let workers: usize = env_parse_or("WORKERS", 1)?;
        let debug = env_bool("DEBUG", false);
        let http_max_connections: usize = env_parse_or("HTTP_MAX_CONNECTIONS", 4096)?;
        let http_timeout_secs: u64 = env_parse_or("HTTP_TIMEOUT", 5)?;
        let control_addr_str =
            env::var("CONTROL_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let control_addr: SocketAddr =
            control_addr_str
                .parse()
                .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
                    var: "CONTROL_ADDR".into(),
                    message: e.to_string(),
                })?;

        let config = AppConfig {
            redis_target,
            workers,
            debug,
            http_max_connections,
            http_timeout: Duration::from_secs(http_timeout_secs),
            control_addr,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                var: "WORKERS".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.http_max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                var: "HTTP_MAX_CONNECTIONS".into(),
                message: "must be greater than 0".into(),
            });
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn for_testing() -> Self {
        AppConfig {
            redis_target: "redis://127.0.0.1/".into(),
            workers: 1,
            debug: false,
            http_max_connections: 4096,
            http_timeout: Duration::from_secs(5),
            control_addr: "0.0.0.0:8080".parse().unwrap(),
        }
    }
}
