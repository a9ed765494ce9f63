//! Environment-variable configuration for both roles. Every knob has a
//! default; an unparsable value fails startup naming the variable.

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("duplicate secondary '{0}' in SECONDARIES")]
    DuplicateSecondary(String),
}

/// Configuration of the primary process.
#[derive(Debug, Clone)]
pub struct PrimaryEnvConfig {
    pub bind_addr: SocketAddr,
    /// Base URLs of all secondaries. Defines N and each secondary's identity.
    pub secondaries: Vec<String>,
    pub log_level: slog::Level,
    pub health_interval: Duration,
    /// Per-probe request timeout.
    pub health_timeout: Duration,
    /// Per-replicate request timeout.
    pub replicate_timeout: Duration,
}

impl PrimaryEnvConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(PrimaryEnvConfig {
            bind_addr: parse_bind_addr(
                &env_or("HOST", "0.0.0.0"),
                &env_or("PORT", "8000"),
            )?,
            secondaries: parse_secondaries(&env_or("SECONDARIES", ""))?,
            log_level: parse_log_level(&env_or("LOG_LEVEL", "info"))?,
            health_interval: parse_ms("HEALTH_INTERVAL_MS", 1_000)?,
            health_timeout: parse_ms("HEALTH_TIMEOUT_MS", 1_000)?,
            replicate_timeout: parse_ms("REPLICATE_TIMEOUT_MS", 30_000)?,
        })
    }
}

/// Configuration of a secondary process.
#[derive(Debug, Clone)]
pub struct SecondaryEnvConfig {
    pub bind_addr: SocketAddr,
    /// Artificial ingress delay (test hook), zero by default.
    pub delay: Duration,
    pub log_level: slog::Level,
}

impl SecondaryEnvConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(SecondaryEnvConfig {
            bind_addr: parse_bind_addr(
                &env_or("HOST", "0.0.0.0"),
                &env_or("PORT", "8001"),
            )?,
            delay: parse_ms("DELAY_MS", 0)?,
            log_level: parse_log_level(&env_or("LOG_LEVEL", "info"))?,
        })
    }
}

fn env_or(var: &'static str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_string())
}

fn parse_bind_addr(host: &str, port: &str) -> Result<SocketAddr, ConfigError> {
    let ip: IpAddr = host.parse().map_err(|_| ConfigError::Invalid {
        var: "HOST",
        reason: format!("'{}' is not an IP address", host),
    })?;
    let port: u16 = port.parse().map_err(|_| ConfigError::Invalid {
        var: "PORT",
        reason: format!("'{}' is not a port number", port),
    })?;

    Ok(SocketAddr::new(ip, port))
}

fn parse_secondaries(raw: &str) -> Result<Vec<String>, ConfigError> {
    // Unset or blank means a primary with no secondaries; an empty entry
    // inside a non-empty list is a typo worth failing on.
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut secondaries: Vec<String> = Vec::new();

    for part in raw.split(',') {
        let url = part.trim().trim_end_matches('/');
        if url.is_empty() {
            return Err(ConfigError::Invalid {
                var: "SECONDARIES",
                reason: "empty entry in comma-separated list".to_string(),
            });
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                var: "SECONDARIES",
                reason: format!("'{}' is not an http(s) base URL", url),
            });
        }
        if secondaries.iter().any(|existing| existing == url) {
            return Err(ConfigError::DuplicateSecondary(url.to_string()));
        }
        secondaries.push(url.to_string());
    }

    Ok(secondaries)
}

fn parse_log_level(raw: &str) -> Result<slog::Level, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "trace" => Ok(slog::Level::Trace),
        "debug" => Ok(slog::Level::Debug),
        "info" => Ok(slog::Level::Info),
        "warn" | "warning" => Ok(slog::Level::Warning),
        "error" => Ok(slog::Level::Error),
        "critical" => Ok(slog::Level::Critical),
        other => Err(ConfigError::Invalid {
            var: "LOG_LEVEL",
            reason: format!("unknown level '{}'", other),
        }),
    }
}

fn parse_ms(var: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match env::var(var) {
        Ok(raw) => {
            let ms: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var,
                reason: format!("'{}' is not a millisecond count", raw),
            })?;
            Ok(Duration::from_millis(ms))
        }
        Err(_) => Ok(Duration::from_millis(default)),
    }
}
