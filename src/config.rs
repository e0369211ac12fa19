//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default number of background workers.
pub const DEFAULT_WORKER_COUNT: usize = 5;

/// Default queue poll interval. Also the upper bound on shutdown latency
/// for an idle worker.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handler configuration.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Number of background workers for queued actions.
    pub worker_count: usize,
    /// How long a worker waits on an empty queue before re-checking its stop flag.
    pub poll_interval: Duration,
    /// Topic discover events are published on.
    pub discover_topic: String,
    /// Topic launch events are published on.
    pub launch_topic: String,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            discover_topic: "ftrack.action.discover".to_string(),
            launch_topic: "ftrack.action.launch".to_string(),
        }
    }
}

impl HandlerConfig {
    /// Build a config from `ACTION_HANDLER_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("ACTION_HANDLER_WORKERS") {
            config.worker_count = parse_worker_count(&raw)?;
        }

        if let Ok(raw) = std::env::var("ACTION_HANDLER_POLL_MS") {
            let ms: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "ACTION_HANDLER_POLL_MS".to_string(),
                message: format!("expected milliseconds, got {raw:?}"),
            })?;
            if ms == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "ACTION_HANDLER_POLL_MS".to_string(),
                    message: "poll interval must be positive".to_string(),
                });
            }
            config.poll_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse_worker_count(raw: &str) -> Result<usize, ConfigError> {
    match raw.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            key: "ACTION_HANDLER_WORKERS".to_string(),
            message: format!("expected a positive integer, got {raw:?}"),
        }),
    }
}

/// Credentials a session authenticates with. Cloned sessions reuse them.
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    pub server_url: String,
    pub api_user: String,
    pub api_key: SecretString,
}

impl SessionCredentials {
    pub fn new(
        server_url: impl Into<String>,
        api_user: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            api_user: api_user.into(),
            api_key: SecretString::from(api_key.into()),
        }
    }

    /// Read `ACTION_SERVER_URL`, `ACTION_API_USER` and `ACTION_API_KEY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
        };
        Ok(Self::new(
            var("ACTION_SERVER_URL")?,
            var("ACTION_API_USER")?,
            var("ACTION_API_KEY")?,
        ))
    }
}
