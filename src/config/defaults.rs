//! Default values for every tunable in the service.
//!
//! Config files override these; the constants exist so the defaults are
//! named once instead of being scattered through `Default` impls.

/// Maximum number of jobs concurrently in flight inside the pipeline engine.
pub const MAX_CONCURRENT_JOBS: usize = 20;

/// Consecutive stage failures before a circuit breaker opens.
pub const BREAKER_FAILURE_THRESHOLD: u32 = 5;

/// Seconds an open breaker waits after the last failure before admitting a
/// half-open trial call.
pub const BREAKER_RECOVERY_TIMEOUT_SECS: u64 = 30;

/// Seconds the engine waits for in-flight jobs on shutdown before aborting.
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Capacity of the bounded completion channel between the engine and the
/// orchestrator's drain loop.
pub const COMPLETION_CHANNEL_CAPACITY: usize = 64;

/// Sliding-window size for windowed entropy, in bytes.
pub const ENTROPY_WINDOW_SIZE: usize = 256;

/// Step between consecutive entropy windows, in bytes.
pub const ENTROPY_WINDOW_STEP: usize = 128;

/// Max |z| before the z-score detector flags a feature vector.
pub const ZSCORE_THRESHOLD: f64 = 3.0;

/// Neighbours consulted by the nearest-neighbour detector.
pub const NEIGHBOR_COUNT: usize = 5;

/// Distance-ratio threshold for the nearest-neighbour detector.
pub const NEIGHBOR_RATIO_THRESHOLD: f64 = 1.5;

/// Seconds a terminal job record and its result are retained before eviction.
pub const RESULT_TTL_SECS: u64 = 3600;

/// Interval between retention sweeps, in seconds.
pub const RETENTION_SWEEP_INTERVAL_SECS: u64 = 60;

/// CPU / memory percent above which the system reports `Unhealthy`.
pub const TELEMETRY_UNHEALTHY_PERCENT: f64 = 90.0;

/// CPU / memory percent above which the system reports `Degraded`.
pub const TELEMETRY_DEGRADED_PERCENT: f64 = 75.0;

/// Maximum accepted submission body, in bytes (32 MiB).
pub const MAX_SUBMISSION_BYTES: usize = 32 * 1024 * 1024;

/// Per-client request burst allowed by the API rate limiter.
pub const RATE_LIMIT_BURST: u32 = 100;

/// Milliseconds to replenish one rate-limiter cell (600ms with a burst of
/// 100 approximates 100 requests per minute per client).
pub const RATE_LIMIT_REPLENISH_MS: u64 = 600;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
