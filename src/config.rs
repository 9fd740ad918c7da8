//! Resilience policy knobs.
//!
//! Defaults match the production tuning; hosts can override single values
//! through `policy.toml` in the platform config directory.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// All tunable middleware policy values. Durations are stored as
/// milliseconds for TOML friendliness; use the accessor methods in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Bounded retry count per action, across all retriable error classes.
    pub max_retry_attempts: u32,
    /// Base retry delay; also the fixed delay for network retries.
    pub retry_delay_ms: u64,
    /// Upper bound on any computed backoff or Retry-After wait.
    pub backoff_cap_ms: u64,
    /// Proactively refresh when less than this much token lifetime remains.
    pub token_refresh_buffer_ms: u64,
    /// Maximum concurrent in-flight requests.
    pub concurrent_requests_limit: usize,
    /// How long a request may wait for a free slot before self-rejecting.
    pub queue_timeout_ms: u64,
    /// Refresh failures tolerated before the circuit breaker opens and the
    /// user is signed out.
    pub max_consecutive_refresh_attempts: u32,
    /// Breaker cooldown; also the post-failure refresh cooldown.
    pub refresh_cooldown_ms: u64,
    /// Lifetime of the middleware before it locks into safe state.
    pub global_timeout_ms: u64,
    /// Window for duplicate-dispatch suppression.
    pub request_debounce_ms: u64,
    /// Debounce map entry cap; pruning kicks in past this.
    pub debounce_map_cap: usize,
    /// Circuit-breaker trips tolerated before entering safe state.
    pub safe_state_trip_limit: u32,
    /// Retry-After assumed when a 429 carries no hint.
    pub rate_limit_default_ms: u64,
    /// Token lifetime assumed when a grant carries no expiry.
    pub default_token_lifetime_ms: u64,
    /// Route the sign-out redirect targets.
    pub login_path: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            retry_delay_ms: 1_000,
            backoff_cap_ms: 30_000,
            token_refresh_buffer_ms: 5 * 60 * 1_000,
            concurrent_requests_limit: 5,
            queue_timeout_ms: 30_000,
            max_consecutive_refresh_attempts: 2,
            refresh_cooldown_ms: 30_000,
            global_timeout_ms: 5 * 60 * 1_000,
            request_debounce_ms: 1_000,
            debounce_map_cap: 100,
            safe_state_trip_limit: 3,
            rate_limit_default_ms: 60_000,
            default_token_lifetime_ms: 30 * 60 * 1_000,
            login_path: "/login".to_string(),
        }
    }
}

impl PolicyConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }

    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_millis(self.token_refresh_buffer_ms)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    pub fn refresh_cooldown(&self) -> Duration {
        Duration::from_millis(self.refresh_cooldown_ms)
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_millis(self.global_timeout_ms)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.request_debounce_ms)
    }

    pub fn rate_limit_default(&self) -> Duration {
        Duration::from_millis(self.rate_limit_default_ms)
    }

    pub fn default_token_lifetime(&self) -> Duration {
        Duration::from_millis(self.default_token_lifetime_ms)
    }

    fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "farmwire", "farmwire")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().join("policy.toml"))
    }

    /// Load overrides from disk; a missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read policy file")?;
        toml::from_str(&content).context("Failed to parse policy file")
    }
}
