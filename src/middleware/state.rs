//! The single mutable middleware state object.
//!
//! All mutations happen under one lock with no awaits inside, mirroring
//! the event-loop-turn discipline of the policy design: observe, mutate,
//! release.

use serde::Serialize;
use tokio::time::Instant;

use crate::config::PolicyConfig;
use crate::middleware::breaker::{BreakerState, CircuitBreaker};
use crate::middleware::debounce::DebounceMap;
use crate::middleware::queue::PendingQueue;
use crate::middleware::retry::RetryLedger;

/// Lifecycle phase of the middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    Refreshing,
    /// Terminal lockout: queues cleared, no refreshes, all dispatches pass
    /// straight through. Only `recover()` leaves this phase.
    SafeState,
}

/// Outcome bookkeeping of a failed refresh.
#[derive(Debug, Clone, Copy)]
pub struct RefreshFailure {
    /// The consecutive-failure limit was reached: breaker tripped, the
    /// caller must sign the user out.
    pub threshold_reached: bool,
    /// The trip pushed the breaker past its trip limit into safe state.
    pub entered_safe_state: bool,
}

#[derive(Debug)]
pub struct ManagerState {
    pub phase: Phase,
    pub breaker: CircuitBreaker,
    pub queue: PendingQueue,
    pub retries: RetryLedger,
    pub debounce: DebounceMap,
    pub consecutive_refresh_failures: u32,
    pub cooldown_until: Option<Instant>,
    pub last_refresh_attempt: Option<Instant>,
    pub last_token_refresh: Option<Instant>,
    pub started_at: Instant,
    next_seq: u64,
}

impl ManagerState {
    pub fn new(policy: &PolicyConfig, now: Instant) -> Self {
        Self {
            phase: Phase::Idle,
            breaker: CircuitBreaker::new(),
            queue: PendingQueue::new(),
            retries: RetryLedger::new(policy.debounce_map_cap),
            debounce: DebounceMap::new(policy.debounce_window(), policy.debounce_map_cap),
            consecutive_refresh_failures: 0,
            cooldown_until: None,
            last_refresh_attempt: None,
            last_token_refresh: None,
            started_at: now,
            next_seq: 0,
        }
    }

    pub fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Gate for starting a refresh. A half-open probe bypasses the
    /// cooldown and consecutive-failure gates; without that, an opened
    /// breaker could never recover, because the very counters that tripped
    /// it would keep re-tripping it.
    pub fn can_attempt_refresh(&mut self, now: Instant, policy: &PolicyConfig) -> bool {
        if self.phase == Phase::SafeState {
            tracing::warn!("refresh blocked: middleware is in safe state");
            return false;
        }

        if !self
            .breaker
            .allows_refresh(now, policy.refresh_cooldown())
        {
            tracing::warn!("refresh blocked: circuit breaker is open");
            return false;
        }
        if self.breaker.is_probing() {
            return true;
        }

        if let Some(until) = self.cooldown_until {
            if now < until {
                tracing::warn!("refresh blocked: cooldown period active");
                return false;
            }
        }

        if self.consecutive_refresh_failures >= policy.max_consecutive_refresh_attempts {
            tracing::warn!(
                attempts = self.consecutive_refresh_failures,
                "refresh blocked: too many consecutive attempts"
            );
            self.trip_breaker(now, policy);
            return false;
        }

        true
    }

    pub fn record_refresh_success(&mut self, now: Instant) {
        self.last_refresh_attempt = Some(now);
        self.last_token_refresh = Some(now);
        self.consecutive_refresh_failures = 0;
        self.cooldown_until = None;
        self.breaker.record_success();
    }

    pub fn record_refresh_failure(&mut self, now: Instant, policy: &PolicyConfig) -> RefreshFailure {
        self.last_refresh_attempt = Some(now);
        self.consecutive_refresh_failures += 1;
        self.cooldown_until = Some(now + policy.refresh_cooldown());

        if self.consecutive_refresh_failures >= policy.max_consecutive_refresh_attempts {
            let entered_safe_state = self.trip_breaker(now, policy);
            return RefreshFailure {
                threshold_reached: true,
                entered_safe_state,
            };
        }
        RefreshFailure {
            threshold_reached: false,
            entered_safe_state: false,
        }
    }

    /// Trip the breaker; returns true when repeated trips escalate to
    /// safe state.
    fn trip_breaker(&mut self, now: Instant, policy: &PolicyConfig) -> bool {
        self.breaker.trip(now);
        if self.breaker.trip_count() >= policy.safe_state_trip_limit {
            self.enter_safe_state();
            return true;
        }
        false
    }

    /// Lock the middleware down. Safe state subsumes the breaker: the
    /// breaker closes and the refresh counters zero, since no refresh can
    /// run in this phase anyway. All parked work is rejected.
    pub fn enter_safe_state(&mut self) {
        self.phase = Phase::SafeState;
        self.consecutive_refresh_failures = 0;
        self.cooldown_until = None;
        self.breaker.close();
        self.queue.reject_all(crate::error::ApiError::QueueDropped);
        tracing::warn!("middleware entered safe state; manual recovery required");
    }

    pub fn global_timeout_elapsed(&self, now: Instant, policy: &PolicyConfig) -> bool {
        now.duration_since(self.started_at) > policy.global_timeout()
    }
}

/// Serializable snapshot of middleware internals, for logs/telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct MiddlewareStats {
    pub phase: Phase,
    pub breaker: BreakerState,
    pub breaker_trips: u32,
    pub queued_requests: usize,
    pub in_flight: usize,
    pub retry_entries: usize,
    pub debounce_entries: usize,
    pub consecutive_refresh_failures: u32,
    pub cooldown_active: bool,
    pub last_token_refresh_age_ms: Option<u64>,
}
