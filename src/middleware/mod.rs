//! The auth-resilience middleware.
//!
//! Observes every dispatched action and applies cross-cutting policies
//! without the call sites being aware: transparent token refresh with
//! single-flight semantics and FIFO replay, bounded retries with backoff,
//! rate-limit waits, duplicate suppression, a concurrency gate with a
//! bounded wait queue, and a circuit breaker that escalates into a
//! terminal safe state.

pub mod breaker;
pub mod debounce;
pub mod queue;
pub mod retry;
pub mod state;

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::{oneshot, watch, Semaphore};
use tokio::time::{sleep, Instant};

use crate::action::Action;
use crate::auth::{SessionHandle, TokenRefresher};
use crate::config::PolicyConfig;
use crate::dispatch::Dispatcher;
use crate::error::{ApiError, ErrorClass};
use crate::middleware::queue::WakeSignal;
use crate::middleware::retry::backoff_delay;
use crate::middleware::state::{ManagerState, MiddlewareStats, Phase};
use crate::notify::{login_url, LogNotifier, Notice, Notifier, NullRedirector, Redirector};

/// How a refresh attempt concluded, from the point of view of one caller.
enum RefreshOutcome {
    /// Tokens are fresh; replay the action.
    Refreshed,
    /// No refresh was allowed (safe state, breaker, cooldown, no token).
    Denied,
    /// The refresh ran and failed.
    Failed,
}

/// What a caller hitting an auth error should do next.
enum Claim {
    /// This caller runs the refresh, using the given refresh token.
    Run(String),
    /// A refresh is already in flight; park and await the signal.
    Wait(oneshot::Receiver<WakeSignal>),
    /// Tokens were already refreshed after this attempt started.
    AlreadyFresh,
    Denied,
    /// No refresh token; nothing to do but sign out.
    NoToken,
}

/// Explicitly constructed middleware state machine, owned by the host's
/// store-creation call and shared by reference.
pub struct AuthMiddleware {
    policy: PolicyConfig,
    session: SessionHandle,
    dispatcher: Arc<dyn Dispatcher>,
    refresher: Arc<dyn TokenRefresher>,
    notifier: Arc<dyn Notifier>,
    redirector: Arc<dyn Redirector>,
    state: Mutex<ManagerState>,
    limiter: Arc<Semaphore>,
    safe_flag: watch::Sender<bool>,
}

impl AuthMiddleware {
    pub fn new(
        policy: PolicyConfig,
        session: SessionHandle,
        dispatcher: Arc<dyn Dispatcher>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        let (safe_flag, _) = watch::channel(false);
        let limiter = Arc::new(Semaphore::new(policy.concurrent_requests_limit));
        let state = Mutex::new(ManagerState::new(&policy, Instant::now()));
        Self {
            policy,
            session,
            dispatcher,
            refresher,
            notifier: Arc::new(LogNotifier),
            redirector: Arc::new(NullRedirector),
            state,
            limiter,
            safe_flag,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_redirector(mut self, redirector: Arc<dyn Redirector>) -> Self {
        self.redirector = redirector;
        self
    }

    /// Dispatch an action through the policy pipeline.
    pub async fn dispatch(&self, action: Action) -> Result<Value, ApiError> {
        if self.check_lockout() {
            // Safe state: plain passthrough, no policies.
            return self.dispatcher.dispatch(&action).await;
        }

        {
            let mut st = self.state.lock().expect("state lock poisoned");
            if st.debounce.suppress(&action.dedupe_key(), Instant::now()) {
                tracing::warn!(action = %action.name, "duplicate dispatch suppressed");
                return Err(ApiError::Debounced);
            }
        }

        let _permit = self.acquire_slot().await?;
        self.refresh_proactively_if_due().await;
        self.run_policies(&action).await
    }

    /// Snapshot of middleware internals for logs/telemetry.
    pub fn stats(&self) -> MiddlewareStats {
        let st = self.state.lock().expect("state lock poisoned");
        let now = Instant::now();
        MiddlewareStats {
            phase: st.phase,
            breaker: st.breaker.state(),
            breaker_trips: st.breaker.trip_count(),
            queued_requests: st.queue.len(),
            in_flight: self
                .policy
                .concurrent_requests_limit
                .saturating_sub(self.limiter.available_permits()),
            retry_entries: st.retries.len(),
            debounce_entries: st.debounce.len(),
            consecutive_refresh_failures: st.consecutive_refresh_failures,
            cooldown_active: st.cooldown_until.map_or(false, |until| now < until),
            last_token_refresh_age_ms: st
                .last_token_refresh
                .map(|t| now.duration_since(t).as_millis() as u64),
        }
    }

    /// Clear transient state (queue, retry records, counters, breaker)
    /// without changing phase.
    pub fn reset(&self) {
        tracing::warn!("manual middleware reset triggered");
        let mut st = self.state.lock().expect("state lock poisoned");
        st.queue.reject_all(ApiError::QueueDropped);
        st.retries.clear_all();
        st.debounce.clear();
        st.consecutive_refresh_failures = 0;
        st.cooldown_until = None;
        st.breaker.reset();
        if st.phase == Phase::Refreshing {
            st.phase = Phase::Idle;
        }
    }

    /// Lock the middleware down until [`recover`](Self::recover).
    pub fn force_safe_state(&self) {
        self.state
            .lock()
            .expect("state lock poisoned")
            .enter_safe_state();
        let _ = self.safe_flag.send(true);
    }

    /// Explicit external recovery from safe state. Also restarts the
    /// global-timeout clock; without that, recovery would re-trip on the
    /// very next dispatch.
    pub fn recover(&self) {
        tracing::info!("recovering middleware from safe state");
        {
            let mut st = self.state.lock().expect("state lock poisoned");
            st.phase = Phase::Idle;
            st.consecutive_refresh_failures = 0;
            st.cooldown_until = None;
            st.breaker.reset();
            st.started_at = Instant::now();
        }
        let _ = self.safe_flag.send(false);
    }

    /// True when the middleware is (or just became) locked out.
    fn check_lockout(&self) -> bool {
        let mut st = self.state.lock().expect("state lock poisoned");
        if st.phase == Phase::SafeState {
            return true;
        }
        if st.global_timeout_elapsed(Instant::now(), &self.policy) {
            tracing::warn!("middleware global timeout reached");
            st.enter_safe_state();
            drop(st);
            let _ = self.safe_flag.send(true);
            return true;
        }
        false
    }

    /// Wait for a concurrency slot, bounded by the queue timeout and cut
    /// short if the middleware enters safe state meanwhile.
    async fn acquire_slot(&self) -> Result<tokio::sync::OwnedSemaphorePermit, ApiError> {
        let mut safe_rx = self.safe_flag.subscribe();
        tokio::select! {
            biased;
            permit = self.limiter.clone().acquire_owned() => {
                permit.map_err(|_| ApiError::QueueDropped)
            }
            _ = async { let _ = safe_rx.wait_for(|locked| *locked).await; } => {
                tracing::warn!("queued request dropped: safe state entered");
                Err(ApiError::QueueDropped)
            }
            _ = sleep(self.policy.queue_timeout()) => {
                tracing::warn!("request timed out waiting for a concurrency slot");
                Err(ApiError::QueueTimeout)
            }
        }
    }

    /// Refresh ahead of expiry when the token's remaining lifetime has
    /// dropped below the buffer window. Failures here only log; the
    /// request proceeds and the reactive path picks up the pieces.
    async fn refresh_proactively_if_due(&self) {
        let session = match self.session.snapshot() {
            Some(s) => s,
            None => return,
        };
        if !session.expires_within(self.policy.refresh_buffer()) {
            return;
        }

        {
            let mut st = self.state.lock().expect("state lock poisoned");
            if st.phase != Phase::Idle || !st.can_attempt_refresh(Instant::now(), &self.policy) {
                self.sync_safe_flag(&st);
                return;
            }
            st.phase = Phase::Refreshing;
        }

        tracing::info!("access token near expiry; refreshing proactively");
        if let Err(err) = self.run_refresh(session.refresh_token).await {
            tracing::warn!(error = %err, "proactive token refresh failed");
        }
    }

    /// The policy loop: dispatch, classify the failure, apply the matching
    /// policy, repeat until success or pass-through.
    async fn run_policies(&self, action: &Action) -> Result<Value, ApiError> {
        let mut replayed_after_refresh = false;
        loop {
            let attempt_started = Instant::now();
            let err = match self.dispatcher.dispatch(action).await {
                Ok(value) => {
                    let mut st = self.state.lock().expect("state lock poisoned");
                    st.retries.clear(&action.name);
                    return Ok(value);
                }
                Err(err) => err,
            };

            match err.class() {
                ErrorClass::Transient => {
                    self.notifier.notify(Notice::error(
                        "Network Error",
                        "Please check your internet connection and try again.",
                    ));
                    match self.begin_retry(&action.name) {
                        Some(attempt) => {
                            tracing::debug!(action = %action.name, attempt, "network retry");
                            sleep(self.policy.retry_delay()).await;
                        }
                        None => return Err(err),
                    }
                }
                ErrorClass::Auth => {
                    tracing::warn!(action = %action.name, error = %err, "authentication error");
                    if replayed_after_refresh {
                        // One replay per refresh; a second auth failure on
                        // fresh tokens is the caller's problem.
                        return Err(err);
                    }
                    match self.refresh_and_wait(attempt_started).await {
                        RefreshOutcome::Refreshed => replayed_after_refresh = true,
                        RefreshOutcome::Denied | RefreshOutcome::Failed => return Err(err),
                    }
                }
                ErrorClass::RateLimited => {
                    self.notifier.notify(Notice::info(
                        "Too Many Requests",
                        "Please wait a moment before trying again.",
                    ));
                    match self.begin_retry(&action.name) {
                        Some(_) => {
                            let hint = err
                                .retry_after()
                                .unwrap_or_else(|| self.policy.rate_limit_default());
                            sleep(hint.min(self.policy.backoff_cap())).await;
                        }
                        None => return Err(err),
                    }
                }
                ErrorClass::Server => {
                    tracing::warn!(action = %action.name, error = %err, "server error");
                    match self.begin_retry(&action.name) {
                        Some(attempt) => {
                            let delay = backoff_delay(
                                self.policy.retry_delay(),
                                attempt,
                                self.policy.backoff_cap(),
                            );
                            tracing::debug!(action = %action.name, attempt, ?delay, "server retry");
                            sleep(delay).await;
                        }
                        None => {
                            self.notifier.notify(Notice::error(
                                "Server Error",
                                "The server is experiencing issues. Please try again later.",
                            ));
                            return Err(err);
                        }
                    }
                }
                ErrorClass::Client | ErrorClass::Internal => return Err(err),
            }
        }
    }

    /// Spend one retry attempt for `key`, unless retries are blocked by
    /// the lockout machinery or the attempt budget is exhausted.
    fn begin_retry(&self, key: &str) -> Option<u32> {
        let mut st = self.state.lock().expect("state lock poisoned");
        if st.phase == Phase::SafeState {
            return None;
        }
        if st.breaker.state() == breaker::BreakerState::Open {
            return None;
        }
        st.retries
            .begin_attempt(key, Instant::now(), self.policy.max_retry_attempts)
    }

    /// Join the in-flight refresh or run one. `attempt_started` guards
    /// against a refresh that completed between this caller's failed
    /// dispatch and now; replaying on the fresh tokens is then enough.
    async fn refresh_and_wait(&self, attempt_started: Instant) -> RefreshOutcome {
        let claim = {
            let mut st = self.state.lock().expect("state lock poisoned");
            match st.phase {
                Phase::SafeState => Claim::Denied,
                Phase::Refreshing => {
                    let seq = st.next_seq();
                    Claim::Wait(st.queue.push(seq, Instant::now()))
                }
                Phase::Idle => {
                    if st
                        .last_token_refresh
                        .map_or(false, |t| t > attempt_started)
                    {
                        Claim::AlreadyFresh
                    } else if !st.can_attempt_refresh(Instant::now(), &self.policy) {
                        self.sync_safe_flag(&st);
                        Claim::Denied
                    } else {
                        match self.session.refresh_token() {
                            Some(token) => {
                                st.phase = Phase::Refreshing;
                                Claim::Run(token)
                            }
                            None => Claim::NoToken,
                        }
                    }
                }
            }
        };

        match claim {
            Claim::AlreadyFresh => RefreshOutcome::Refreshed,
            Claim::Denied => {
                tracing::warn!("refresh blocked by fail-safe mechanisms");
                RefreshOutcome::Denied
            }
            Claim::NoToken => {
                tracing::warn!("auth error with no refresh token; signing out");
                self.sign_out();
                RefreshOutcome::Denied
            }
            Claim::Wait(rx) => match rx.await {
                Ok(Ok(())) => RefreshOutcome::Refreshed,
                _ => RefreshOutcome::Failed,
            },
            Claim::Run(token) => match self.run_refresh(token).await {
                Ok(()) => RefreshOutcome::Refreshed,
                Err(_) => RefreshOutcome::Failed,
            },
        }
    }

    /// Perform the single in-flight refresh. The caller must have moved
    /// the phase to `Refreshing` first.
    async fn run_refresh(&self, refresh_token: String) -> Result<(), ApiError> {
        let result = self.refresher.refresh(&refresh_token).await;
        let now = Instant::now();

        match result {
            Ok(grant) => {
                self.session
                    .update_tokens(&grant, self.policy.default_token_lifetime());
                let mut st = self.state.lock().expect("state lock poisoned");
                if st.phase == Phase::Refreshing {
                    st.phase = Phase::Idle;
                }
                st.record_refresh_success(now);
                tracing::info!("token refresh successful");
                st.queue.release_all();
                Ok(())
            }
            Err(err) => {
                let disposition = {
                    let mut st = self.state.lock().expect("state lock poisoned");
                    if st.phase == Phase::Refreshing {
                        st.phase = Phase::Idle;
                    }
                    let disposition = st.record_refresh_failure(now, &self.policy);
                    st.queue.reject_all(err.clone());
                    self.sync_safe_flag(&st);
                    disposition
                };
                tracing::warn!(error = %err, "token refresh failed");

                if disposition.threshold_reached {
                    self.notifier.notify(Notice::error(
                        "Authentication Error",
                        "Unable to refresh session. Please log in again.",
                    ));
                    self.sign_out();
                }
                Err(err)
            }
        }
    }

    /// Clear the session and send the user to the login route, carrying
    /// the interrupted path. Skipped when already on the login page.
    fn sign_out(&self) {
        self.session.clear();
        let path = self.redirector.current_path();
        let on_login = path
            .as_deref()
            .map_or(false, |p| p.contains(&self.policy.login_path));
        if !on_login {
            let to = login_url(&self.policy, path.as_deref());
            tracing::info!(to = %to, "signing out; redirecting to login");
            self.redirector.redirect(&to);
        }
    }

    fn sync_safe_flag(&self, st: &ManagerState) {
        if st.phase == Phase::SafeState {
            let _ = self.safe_flag.send(true);
        }
    }
}
