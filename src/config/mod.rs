//! Service Configuration
//!
//! TOML-loaded configuration for the pipeline engine, circuit breakers,
//! retention policy, and HTTP server.
//!
//! ## Loading Order
//!
//! 1. Explicit path (`--config` flag / `BLOBSCOPE_CONFIG` env var)
//! 2. `blobscope.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! The loaded config is owned by the application context built in `main`
//! and passed by reference to whatever needs it — there is no process-wide
//! mutable config state.

pub mod defaults;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub retention: RetentionConfig,
    pub detectors: DetectorConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address, e.g. `0.0.0.0:8080`.
    pub bind_addr: String,
    /// Maximum accepted submission body in bytes.
    pub max_submission_bytes: usize,
    /// Per-client request burst allowed by the rate limiter.
    pub rate_limit_burst: u32,
    /// Milliseconds to replenish one rate-limiter cell.
    pub rate_limit_replenish_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: defaults::DEFAULT_BIND_ADDR.to_string(),
            max_submission_bytes: defaults::MAX_SUBMISSION_BYTES,
            rate_limit_burst: defaults::RATE_LIMIT_BURST,
            rate_limit_replenish_ms: defaults::RATE_LIMIT_REPLENISH_MS,
        }
    }
}

/// Pipeline engine and circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum concurrent in-flight jobs (the admission semaphore capacity).
    pub max_concurrent_jobs: usize,
    /// Failures before a stage's breaker opens.
    pub breaker_failure_threshold: u32,
    /// Seconds before an open breaker admits a half-open trial.
    pub breaker_recovery_timeout_secs: u64,
    /// Seconds to wait for in-flight jobs on shutdown before aborting them.
    pub shutdown_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: defaults::MAX_CONCURRENT_JOBS,
            breaker_failure_threshold: defaults::BREAKER_FAILURE_THRESHOLD,
            breaker_recovery_timeout_secs: defaults::BREAKER_RECOVERY_TIMEOUT_SECS,
            shutdown_timeout_secs: defaults::SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl PipelineConfig {
    pub fn breaker_recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.breaker_recovery_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Retention policy for terminal job records and diagnostic results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Seconds a terminal record/result is retained before eviction.
    pub result_ttl_secs: u64,
    /// Interval between eviction sweeps, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            result_ttl_secs: defaults::RESULT_TTL_SECS,
            sweep_interval_secs: defaults::RETENTION_SWEEP_INTERVAL_SECS,
        }
    }
}

impl RetentionConfig {
    pub fn result_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.result_ttl_secs as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Anomaly detector thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Max |z| before the z-score detector flags an input.
    pub zscore_threshold: f64,
    /// Neighbours consulted by the nearest-neighbour detector.
    pub neighbor_count: usize,
    /// Distance-ratio threshold for the nearest-neighbour detector.
    pub neighbor_ratio_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            zscore_threshold: defaults::ZSCORE_THRESHOLD,
            neighbor_count: defaults::NEIGHBOR_COUNT,
            neighbor_ratio_threshold: defaults::NEIGHBOR_RATIO_THRESHOLD,
        }
    }
}

impl ServiceConfig {
    /// Load configuration following the documented precedence order.
    ///
    /// A missing file is not an error (defaults apply); a file that exists
    /// but fails to parse is.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let candidate = explicit_path
            .map(|p| p.to_path_buf())
            .or_else(|| std::env::var("BLOBSCOPE_CONFIG").ok().map(Into::into))
            .unwrap_or_else(|| "blobscope.toml".into());

        if !candidate.exists() {
            if explicit_path.is_some() {
                anyhow::bail!("config file not found: {}", candidate.display());
            }
            info!("No config file found, using built-in defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&candidate)
            .with_context(|| format!("failed to read config file {}", candidate.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", candidate.display()))?;

        info!(path = %candidate.display(), "Configuration loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ServiceConfig::default();
        assert!(cfg.pipeline.max_concurrent_jobs > 0);
        assert!(cfg.pipeline.breaker_failure_threshold > 0);
        assert_eq!(cfg.server.bind_addr, defaults::DEFAULT_BIND_ADDR);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg: ServiceConfig = toml::from_str(
            r#"
            [pipeline]
            max_concurrent_jobs = 4
            "#,
        )
        .unwrap();
        assert_eq!(cfg.pipeline.max_concurrent_jobs, 4);
        assert_eq!(
            cfg.pipeline.breaker_failure_threshold,
            defaults::BREAKER_FAILURE_THRESHOLD
        );
        assert_eq!(cfg.retention.result_ttl_secs, defaults::RESULT_TTL_SECS);
    }
}
