//! Circuit Breaker
//!
//! Per-stage admission gate that fails fast after repeated failures and
//! trials recovery with a single request. One breaker instance belongs
//! to exactly one stage; it is consulted concurrently from every
//! in-flight job task, so its state machine lives behind a mutex.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Breaker state machine modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Requests allowed; failures are counted.
    Closed,
    /// Requests rejected until the recovery timeout elapses.
    Open,
    /// One trial request is in flight; its outcome decides the next state.
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failures: u32,
    last_failure: Option<Instant>,
}

/// Failure-rate gate guarding one pipeline stage.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: 0,
                last_failure: None,
            }),
        }
    }

    /// Whether a call may proceed right now.
    ///
    /// In `Open`, once `recovery_timeout` has elapsed since the last
    /// failure, the breaker transitions to `HalfOpen` and admits exactly
    /// one trial — concurrent callers racing on the same breaker see a
    /// single `true` until the trial's outcome is recorded.
    pub fn allow(&self) -> bool {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => false,
            BreakerState::Open => {
                let recovered = inner
                    .last_failure
                    .map(|t| t.elapsed() >= self.recovery_timeout)
                    .unwrap_or(true);
                if recovered {
                    debug!("Circuit breaker recovery timeout elapsed, admitting trial call");
                    inner.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call: clears the failure count and closes the
    /// breaker regardless of its previous mode.
    pub fn record_success(&self) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if inner.state != BreakerState::Closed {
            debug!("Circuit breaker closing after successful call");
        }
        inner.failures = 0;
        inner.state = BreakerState::Closed;
    }

    /// Record a failed call: increments the counter, refreshes the failure
    /// timestamp, and opens the breaker when the threshold is crossed or a
    /// half-open trial fails.
    pub fn record_failure(&self) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.failures = inner.failures.saturating_add(1);
        inner.last_failure = Some(Instant::now());

        let should_open = inner.state == BreakerState::HalfOpen
            || inner.failures >= self.failure_threshold;
        if should_open && inner.state != BreakerState::Open {
            warn!(
                failures = inner.failures,
                threshold = self.failure_threshold,
                "Circuit breaker opening"
            );
            inner.state = BreakerState::Open;
        }
    }

    /// Current breaker mode (for observability; racy by nature).
    pub fn state(&self) -> BreakerState {
        match self.inner.lock() {
            Ok(guard) => guard.state,
            Err(poisoned) => poisoned.into_inner().state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed_and_allows() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.allow());
    }

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.allow());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        // Two failures after the reset: still closed.
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_admits_exactly_one_trial() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        breaker.record_failure();
        assert!(!breaker.allow());

        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allow(), "first call after timeout is the trial");
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(!breaker.allow(), "second call must wait for trial outcome");
    }

    #[test]
    fn failed_trial_reopens_and_resets_timer() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allow());

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        // Timer was refreshed: no trial immediately.
        assert!(!breaker.allow());

        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allow());
    }

    #[test]
    fn successful_trial_fully_closes() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allow());

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.allow());
        assert!(breaker.allow());
    }
}
