//! Circuit breaker guarding outbound transport calls.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::BreakerConfig;

enum State {
    Closed { failures: u32 },
    Open { reopen_at: Instant },
    HalfOpen { probe_in_flight: bool },
}

/// Consecutive-failure circuit breaker.
///
/// The threshold opens the circuit for a fixed window; after the window a
/// single probe call is let through (half-open), and its outcome decides
/// whether the circuit closes again.
pub struct CircuitBreaker {
    state: Mutex<State>,
    failure_threshold: u32,
    open_window: Duration,
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            state: Mutex::new(State::Closed { failures: 0 }),
            failure_threshold: config.failure_threshold.max(1),
            open_window: config.open_window(),
        }
    }

    /// Whether a call may proceed. Returns the remaining cooldown when it may
    /// not.
    pub fn allow(&self) -> Option<Duration> {
        let mut state = self.state.lock().unwrap();
        match &mut *state {
            State::Closed { .. } => None,
            State::Open { reopen_at } => {
                let now = Instant::now();
                if now >= *reopen_at {
                    *state = State::HalfOpen {
                        probe_in_flight: true,
                    };
                    None
                } else {
                    Some(reopen_at.saturating_duration_since(now))
                }
            }
            State::HalfOpen { probe_in_flight } => {
                if *probe_in_flight {
                    Some(Duration::from_millis(10))
                } else {
                    *probe_in_flight = true;
                    None
                }
            }
        }
    }

    /// Record a successful call. Returns `true` when this closed the circuit.
    pub fn record_success(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match &mut *state {
            State::Closed { failures } => {
                *failures = 0;
                false
            }
            State::Open { .. } | State::HalfOpen { .. } => {
                *state = State::Closed { failures: 0 };
                true
            }
        }
    }

    /// Record a failed call. Returns `true` when this opened the circuit.
    pub fn record_failure(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match &mut *state {
            State::Closed { failures } => {
                *failures += 1;
                if *failures >= self.failure_threshold {
                    *state = State::Open {
                        reopen_at: Instant::now() + self.open_window,
                    };
                    true
                } else {
                    false
                }
            }
            State::Open { .. } | State::HalfOpen { .. } => {
                *state = State::Open {
                    reopen_at: Instant::now() + self.open_window,
                };
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, open_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(&BreakerConfig {
            failure_threshold: threshold,
            open_secs: 0,
        })
        .with_open_window(Duration::from_millis(open_ms))
    }

    impl CircuitBreaker {
        fn with_open_window(mut self, window: Duration) -> Self {
            self.open_window = window;
            self
        }
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let cb = breaker(3, 60_000);

        assert!(cb.allow().is_none());
        assert!(!cb.record_failure());
        assert!(!cb.record_failure());
        assert!(cb.record_failure()); // third failure opens

        assert!(cb.allow().is_some());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let cb = breaker(2, 60_000);

        cb.record_failure();
        cb.record_success();
        assert!(!cb.record_failure()); // streak restarted
        assert!(cb.allow().is_none());
    }

    #[test]
    fn test_half_open_probe_then_close() {
        let cb = breaker(1, 20);

        cb.record_failure();
        assert!(cb.allow().is_some());

        std::thread::sleep(Duration::from_millis(40));

        // the window elapsed: exactly one probe goes through
        assert!(cb.allow().is_none());
        assert!(cb.allow().is_some());

        assert!(cb.record_success()); // probe succeeded, circuit closed
        assert!(cb.allow().is_none());
    }

    #[test]
    fn test_half_open_probe_failure_reopens() {
        let cb = breaker(1, 20);

        cb.record_failure();
        std::thread::sleep(Duration::from_millis(40));
        assert!(cb.allow().is_none()); // probe admitted

        assert!(cb.record_failure()); // probe failed, circuit reopened
        assert!(cb.allow().is_some());
    }
}
