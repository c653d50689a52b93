//! Ambient runtime configuration.
//!
//! Deliberately not a YAML/profile loader (that machinery is out of scope,
//! see DESIGN.md) — just the handful of process-wide defaults the cluster
//! and exporter layers consult, overridable from environment variables the
//! same way the teacher's config layer treats env as the highest-priority
//! source.
use std::time::Duration;

const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Process-wide defaults consulted by the cluster and registry-protocol layers.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeSettings {
    /// Default value for the url `retries` parameter (total attempts = retries + 1).
    pub default_retries: u32,
    /// How long `Exporter::unexport` waits before destroying the underlying invoker.
    pub shutdown_timeout: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self { default_retries: DEFAULT_RETRIES, shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT }
    }
}

impl RuntimeSettings {
    /// Build settings from `RCE_DEFAULT_RETRIES` / `RCE_SHUTDOWN_TIMEOUT_MS`,
    /// falling back to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_retries: std::env::var("RCE_DEFAULT_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_retries),
            shutdown_timeout: std::env::var("RCE_SHUTDOWN_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.shutdown_timeout),
        }
    }
}
