//! Circuit breaker around the token-refresh call.
//!
//! Closed → Open when consecutive refresh failures reach the limit;
//! Open → HalfOpen after the cooldown, admitting exactly one probe;
//! the probe's outcome closes or re-opens the breaker.

use serde::Serialize;
use tokio::time::Instant;

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: BreakerState,
    opened_at: Option<Instant>,
    /// Lifetime trip count; repeated trips escalate to safe state.
    trip_count: u32,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            opened_at: None,
            trip_count: 0,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn trip_count(&self) -> u32 {
        self.trip_count
    }

    /// Whether a refresh attempt may proceed right now. An Open breaker
    /// whose cooldown has elapsed moves to HalfOpen and admits the caller
    /// as the single probe.
    pub fn allows_refresh(&mut self, now: Instant, cooldown: Duration) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|t| now.duration_since(t))
                    .unwrap_or(Duration::ZERO);
                if elapsed >= cooldown {
                    tracing::warn!("circuit breaker half-open, allowing one probe");
                    self.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// The caller holds the half-open probe slot.
    pub fn is_probing(&self) -> bool {
        self.state == BreakerState::HalfOpen
    }

    pub fn trip(&mut self, now: Instant) {
        self.state = BreakerState::Open;
        self.opened_at = Some(now);
        self.trip_count += 1;
        tracing::warn!(trips = self.trip_count, "circuit breaker tripped");
    }

    pub fn record_success(&mut self) {
        self.state = BreakerState::Closed;
        self.opened_at = None;
    }

    /// Close without touching the trip count (safe-state entry).
    pub fn close(&mut self) {
        self.state = BreakerState::Closed;
        self.opened_at = None;
    }

    /// Full reset (manual recovery).
    pub fn reset(&mut self) {
        self.close();
        self.trip_count = 0;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const COOLDOWN: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn test_open_blocks_until_cooldown() {
        let mut cb = CircuitBreaker::new();
        assert!(cb.allows_refresh(Instant::now(), COOLDOWN));

        cb.trip(Instant::now());
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.allows_refresh(Instant::now(), COOLDOWN));

        advance(COOLDOWN - Duration::from_millis(1)).await;
        assert!(!cb.allows_refresh(Instant::now(), COOLDOWN));

        advance(Duration::from_millis(2)).await;
        assert!(cb.allows_refresh(Instant::now(), COOLDOWN));
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_outcomes() {
        let mut cb = CircuitBreaker::new();
        cb.trip(Instant::now());
        advance(COOLDOWN).await;
        assert!(cb.allows_refresh(Instant::now(), COOLDOWN));

        // Probe success closes the breaker.
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);

        // Probe failure re-opens it and counts a second trip.
        cb.trip(Instant::now());
        advance(COOLDOWN).await;
        assert!(cb.allows_refresh(Instant::now(), COOLDOWN));
        cb.trip(Instant::now());
        assert_eq!(cb.state(), BreakerState::Open);
        assert_eq!(cb.trip_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_keeps_trip_count_reset_clears_it() {
        let mut cb = CircuitBreaker::new();
        cb.trip(Instant::now());
        cb.close();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.trip_count(), 1);

        cb.reset();
        assert_eq!(cb.trip_count(), 0);
    }
}
