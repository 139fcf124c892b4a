//! Reconciler configuration.
//!
//! By default a failed render attempt is retried immediately and without
//! limit, usage errors included. That loops
//! forever on a deterministic failure, so embedders that cannot tolerate it
//! should set [`ReconcilerConfig::max_render_retries`].

use serde::{Deserialize, Serialize};

/// Tunables for a single root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Upper bound on retries after a failed attempt. `None` retries forever.
    pub max_render_retries: Option<u32>,

    /// Retry hook-discipline violations like any other failure.
    ///
    /// When false, a usage error abandons the lane immediately.
    pub retry_fatal_usage_errors: bool,

    /// Yield to a higher-priority lane between units of work.
    pub check_preemption: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_render_retries: None,
            retry_fatal_usage_errors: true,
            check_preemption: true,
        }
    }
}

impl ReconcilerConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Cap retries at `max`.
    pub fn with_max_render_retries(mut self, max: u32) -> Self {
        self.max_render_retries = Some(max);
        self
    }

    /// Whether another attempt is allowed after `attempts` failures.
    pub(crate) fn allows_retry(&self, attempts: u32, fatal: bool) -> bool {
        if fatal && !self.retry_fatal_usage_errors {
            return false;
        }
        self.max_render_retries.map_or(true, |max| attempts <= max)
    }
}
