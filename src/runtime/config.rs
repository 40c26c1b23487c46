//! Runtime tuning knobs, loadable from the environment.

use std::time::Duration;

/// Engine configuration. Defaults are sensible for interactive use; the
/// environment overrides them via `TIMELOOM_*` variables.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Per-node wall clock budget. A node that exceeds it is treated as a
    /// failed node, not a failed run.
    pub node_timeout: Duration,
    /// Hard cap on supersteps per run. The circuit breaker should always
    /// terminate routing well before this.
    pub max_steps: u64,
    /// Checkpoint database URL for the sqlite store, if configured.
    pub database_url: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            node_timeout: Duration::from_secs(60),
            max_steps: 100,
            database_url: None,
        }
    }
}

impl RuntimeConfig {
    /// Read overrides from the environment (and a `.env` file if present).
    ///
    /// Recognized variables:
    /// - `TIMELOOM_NODE_TIMEOUT_SECS`
    /// - `TIMELOOM_MAX_STEPS`
    /// - `TIMELOOM_DATABASE_URL`
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Ok(secs) = std::env::var("TIMELOOM_NODE_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) => config.node_timeout = Duration::from_secs(secs),
                Err(_) => tracing::warn!(value = %secs, "ignoring invalid TIMELOOM_NODE_TIMEOUT_SECS"),
            }
        }
        if let Ok(steps) = std::env::var("TIMELOOM_MAX_STEPS") {
            match steps.parse::<u64>() {
                Ok(steps) => config.max_steps = steps,
                Err(_) => tracing::warn!(value = %steps, "ignoring invalid TIMELOOM_MAX_STEPS"),
            }
        }
        if let Ok(url) = std::env::var("TIMELOOM_DATABASE_URL") {
            config.database_url = Some(url);
        }
        config
    }
}
