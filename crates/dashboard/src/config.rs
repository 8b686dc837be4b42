use std::time::Duration;

use optiboard_client::DEFAULT_API_ROOT;
use optiboard_core::PollConfig;

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Dashboard configuration loaded from environment variables.
///
/// All fields have defaults suitable for a server on the local machine.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    /// Base URL of the server's REST API.
    pub api_root: String,
    /// Per-request HTTP timeout (default: 30 s).
    pub request_timeout: Duration,
    /// Job status polling.
    pub poll: PollConfig,
}

impl DashboardConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                     |
    /// |------------------------|-----------------------------|
    /// | `OPTIBOARD_API_ROOT`   | `http://localhost:5543/api` |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                        |
    /// | `POLL_INTERVAL_MS`     | `1000`                      |
    /// | `POLL_MAX_FAILURES`    | `3`                         |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_root = lookup("OPTIBOARD_API_ROOT")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_ROOT.into());

        let request_timeout_secs: u64 =
            parse(&lookup, "REQUEST_TIMEOUT_SECS", 30, "a positive integer")?;
        let poll_interval_ms: u64 = parse(&lookup, "POLL_INTERVAL_MS", 1000, "a positive integer")?;
        let max_consecutive_failures: u32 =
            parse(&lookup, "POLL_MAX_FAILURES", 3, "a positive integer")?;

        Ok(Self {
            api_root,
            request_timeout: Duration::from_secs(request_timeout_secs),
            poll: PollConfig {
                interval: Duration::from_millis(poll_interval_ms),
                max_consecutive_failures,
            },
        })
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value != T::default() => Ok(value),
        _ => Err(ConfigError::Invalid {
            var,
            expected,
            value: raw,
        }),
    }
}
