//! Configuration loading and resolution.
//!
//! Every setting resolves as: command-line flag, then environment variable,
//! then built-in default.

use std::time::Duration;

use duplex_core::exchange::DEFAULT_REQUEST_TIMEOUT;
use duplex_core::session::DEFAULT_DRAIN_TIMEOUT;

pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

pub const ENV_REQUEST_TIMEOUT_MS: &str = "DUPLEX_REQUEST_TIMEOUT_MS";
pub const ENV_DRAIN_TIMEOUT_MS: &str = "DUPLEX_DRAIN_TIMEOUT_MS";
pub const ENV_ADDR: &str = "DUPLEX_ADDR";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a whole number of milliseconds, got '{value}'")]
    InvalidMillis { var: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub request_timeout_ms: Option<u64>,
    pub drain_timeout_ms: Option<u64>,
    pub addr: Option<String>,
}

/// Fully resolved server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub request_timeout: Duration,
    pub drain_timeout: Duration,
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            addr: DEFAULT_ADDR.to_string(),
        }
    }
}

impl ServerConfig {
    /// Resolve against the process environment.
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        Self::resolve_with(overrides, |var| std::env::var(var).ok())
    }

    /// Resolve against an arbitrary variable lookup.
    pub fn resolve_with<F>(overrides: &ConfigOverrides, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let request_timeout = resolve_millis(
            overrides.request_timeout_ms,
            ENV_REQUEST_TIMEOUT_MS,
            &env,
            defaults.request_timeout,
        )?;
        let drain_timeout = resolve_millis(
            overrides.drain_timeout_ms,
            ENV_DRAIN_TIMEOUT_MS,
            &env,
            defaults.drain_timeout,
        )?;
        let addr = overrides
            .addr
            .clone()
            .or_else(|| env(ENV_ADDR).filter(|addr| !addr.trim().is_empty()))
            .unwrap_or(defaults.addr);

        Ok(Self {
            request_timeout,
            drain_timeout,
            addr,
        })
    }
}

fn resolve_millis<F>(
    explicit: Option<u64>,
    var: &'static str,
    env: &F,
    default: Duration,
) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let millis = match explicit {
        Some(ms) => ms,
        None => match env(var) {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidMillis { var, value })?,
            None => return Ok(default),
        },
    };
    if millis == 0 {
        return Err(ConfigError::ZeroTimeout(var));
    }
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = ServerConfig::resolve_with(&ConfigOverrides::default(), env_of(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.drain_timeout, Duration::from_secs(5));
        assert_eq!(config.addr, "127.0.0.1:8080");
    }

    #[test]
    fn test_env_overrides_default() {
        let env = env_of(&[(ENV_REQUEST_TIMEOUT_MS, "1500"), (ENV_ADDR, "0.0.0.0:9000")]);
        let config = ServerConfig::resolve_with(&ConfigOverrides::default(), env).unwrap();
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert_eq!(config.drain_timeout, DEFAULT_DRAIN_TIMEOUT);
        assert_eq!(config.addr, "0.0.0.0:9000");
    }

    #[test]
    fn test_flag_beats_env() {
        let env = env_of(&[(ENV_DRAIN_TIMEOUT_MS, "9000"), (ENV_ADDR, "0.0.0.0:9000")]);
        let overrides = ConfigOverrides {
            drain_timeout_ms: Some(250),
            addr: Some("127.0.0.1:7000".into()),
            ..Default::default()
        };
        let config = ServerConfig::resolve_with(&overrides, env).unwrap();
        assert_eq!(config.drain_timeout, Duration::from_millis(250));
        assert_eq!(config.addr, "127.0.0.1:7000");
    }

    #[test]
    fn test_malformed_env_is_rejected() {
        let env = env_of(&[(ENV_REQUEST_TIMEOUT_MS, "soon")]);
        let err = ServerConfig::resolve_with(&ConfigOverrides::default(), env).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidMillis {
                var: ENV_REQUEST_TIMEOUT_MS,
                value: "soon".into()
            }
        );
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let overrides = ConfigOverrides {
            request_timeout_ms: Some(0),
            ..Default::default()
        };
        let err = ServerConfig::resolve_with(&overrides, env_of(&[])).unwrap_err();
        assert_eq!(err, ConfigError::ZeroTimeout(ENV_REQUEST_TIMEOUT_MS));
    }
}
