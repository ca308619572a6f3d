//! Sliding-window circuit breaker: closed/open/half-open state machine guarding
//! calls to a failing downstream processor.
//!
//! Generalizes `fc-router::mediator::CircuitBreaker` (which only counts
//! consecutive failures) to the rate-and-throughput model the specification
//! requires, while keeping its state names and entry points.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_common::Clock;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Length of the sliding window used to evaluate throughput/failure rate.
    pub sampling_duration: Duration,
    /// Minimum number of calls in the window before the rate threshold applies.
    pub minimum_throughput: u32,
    /// Fraction of failures in the window (0.0-1.0) that trips the breaker.
    pub failure_rate_threshold: f64,
    /// Raw failure count in the window that trips the breaker regardless of
    /// rate, once `minimum_throughput` is also satisfied.
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a half-open probe.
    pub break_duration: Duration,
    /// Consecutive half-open successes required to close the breaker.
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            sampling_duration: Duration::from_secs(60),
            minimum_throughput: 10,
            failure_rate_threshold: 0.5,
            failure_threshold: u32::MAX,
            break_duration: Duration::from_secs(30),
            half_open_success_threshold: 3,
        }
    }
}

struct Window {
    samples: VecDeque<(DateTime<Utc>, bool)>,
}

/// Sliding-window circuit breaker. All timing goes through an injected `Clock`
/// so tests can drive the window deterministically.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<CircuitState>,
    window: Mutex<Window>,
    opened_at: Mutex<Option<DateTime<Utc>>>,
    half_open_successes: Mutex<u32>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(CircuitState::Closed),
            window: Mutex::new(Window { samples: VecDeque::new() }),
            opened_at: Mutex::new(None),
            half_open_successes: Mutex::new(0),
        }
    }

    pub fn state(&self) -> CircuitState {
        *self.state.lock()
    }

    /// Whether a call should be allowed through right now. Open transitions to
    /// HalfOpen automatically once `break_duration` has elapsed.
    pub fn allow_request(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let opened_at = *self.opened_at.lock();
                if let Some(opened_at) = opened_at {
                    let elapsed = self.clock.now() - opened_at;
                    if elapsed >= chrono::Duration::from_std(self.config.break_duration).unwrap() {
                        *state = CircuitState::HalfOpen;
                        *self.half_open_successes.lock() = 0;
                        debug!("circuit breaker transitioning to half-open");
                        return true;
                    }
                }
                false
            }
        }
    }

    /// Record a successful call outcome.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        match *state {
            CircuitState::HalfOpen => {
                let mut successes = self.half_open_successes.lock();
                *successes += 1;
                if *successes >= self.config.half_open_success_threshold {
                    *state = CircuitState::Closed;
                    self.window.lock().samples.clear();
                    info!(successes = *successes, "circuit breaker closed after half-open successes");
                }
            }
            CircuitState::Closed => {
                self.record_sample(true);
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call outcome.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        match *state {
            CircuitState::Closed => {
                let (count, rate) = self.record_sample(false);
                let throughput_ok = count >= self.config.minimum_throughput as usize;
                let rate_trip = rate >= self.config.failure_rate_threshold;
                let count_trip = (count as u32) >= self.config.failure_threshold;
                if throughput_ok && (rate_trip || count_trip) {
                    *state = CircuitState::Open;
                    *self.opened_at.lock() = Some(self.clock.now());
                    warn!(count, rate, "circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                *self.opened_at.lock() = Some(self.clock.now());
                *self.half_open_successes.lock() = 0;
                warn!("circuit breaker re-opened on failure in half-open state");
            }
            CircuitState::Open => {}
        }
    }

    /// Push a sample into the window, prune samples outside `sampling_duration`,
    /// and return `(count_in_window, failure_rate_in_window)`.
    fn record_sample(&self, success: bool) -> (usize, f64) {
        let now = self.clock.now();
        let mut window = self.window.lock();
        window.samples.push_back((now, success));

        let cutoff = now - chrono::Duration::from_std(self.config.sampling_duration).unwrap();
        while window.samples.front().map(|(t, _)| *t < cutoff).unwrap_or(false) {
            window.samples.pop_front();
        }

        let count = window.samples.len();
        let failures = window.samples.iter().filter(|(_, success)| !success).count();
        let rate = if count > 0 { failures as f64 / count as f64 } else { 0.0 };
        (count, rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_common::FakeClock;

    fn breaker(config: CircuitBreakerConfig) -> (Arc<FakeClock>, CircuitBreaker) {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let breaker = CircuitBreaker::new(config, clock.clone());
        (clock, breaker)
    }

    #[test]
    fn opens_only_when_throughput_and_rate_thresholds_both_met() {
        let (_clock, cb) = breaker(CircuitBreakerConfig {
            minimum_throughput: 3,
            failure_rate_threshold: 0.9,
            failure_threshold: 3,
            ..CircuitBreakerConfig::default()
        });

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn does_not_open_below_minimum_throughput_even_at_100_percent_failure() {
        let (_clock, cb) = breaker(CircuitBreakerConfig {
            minimum_throughput: 10,
            failure_rate_threshold: 0.5,
            failure_threshold: u32::MAX,
            ..CircuitBreakerConfig::default()
        });

        for _ in 0..5 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn full_lifecycle_closed_open_half_open_closed() {
        let (clock, cb) = breaker(CircuitBreakerConfig {
            minimum_throughput: 3,
            failure_rate_threshold: 0.9,
            failure_threshold: 3,
            break_duration: Duration::from_secs(30),
            half_open_success_threshold: 3,
            ..CircuitBreakerConfig::default()
        });

        cb.record_failure();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(chrono::Duration::seconds(31));
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn reopens_on_single_failure_in_half_open() {
        let (clock, cb) = breaker(CircuitBreakerConfig {
            minimum_throughput: 1,
            failure_rate_threshold: 0.1,
            failure_threshold: 1,
            break_duration: Duration::from_secs(10),
            ..CircuitBreakerConfig::default()
        });

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(chrono::Duration::seconds(11));
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
