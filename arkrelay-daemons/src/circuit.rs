use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Per-daemon circuit breaker (spec §4.2): opens after `failure_threshold`
/// consecutive failures, moves to half-open after `cooldown`, and closes on
/// the first success seen while half-open or closed.
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<State>,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Closed { consecutive_failures: u32 },
    Open { opened_at: Instant },
    HalfOpen,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            state: Mutex::new(State::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    /// Returns `true` if a call may be attempted right now, transitioning
    /// `Open -> HalfOpen` once the cooldown has elapsed.
    pub async fn allow_call(&self) -> bool {
        let mut state = self.state.lock().await;
        match *state {
            State::Closed { .. } => true,
            State::HalfOpen => true,
            State::Open { opened_at } => {
                if opened_at.elapsed() >= self.cooldown {
                    *state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        *state = State::Closed {
            consecutive_failures: 0,
        };
    }

    pub async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        *state = match *state {
            State::Closed { consecutive_failures } => {
                let failures = consecutive_failures + 1;
                if failures >= self.failure_threshold {
                    State::Open {
                        opened_at: Instant::now(),
                    }
                } else {
                    State::Closed {
                        consecutive_failures: failures,
                    }
                }
            }
            State::HalfOpen => State::Open {
                opened_at: Instant::now(),
            },
            State::Open { opened_at } => State::Open { opened_at },
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_millis(50));
        assert!(breaker.allow_call().await);
        breaker.record_failure().await;
        breaker.record_failure().await;
        assert!(breaker.allow_call().await);
        breaker.record_failure().await;
        assert!(!breaker.allow_call().await);
    }

    #[tokio::test]
    async fn half_opens_after_cooldown_and_closes_on_success() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure().await;
        assert!(!breaker.allow_call().await);
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(breaker.allow_call().await);
        breaker.record_success().await;
        assert!(breaker.allow_call().await);
    }
}
