//! farmwire - resilient API client middleware for the farm-management
//! backend.
//!
//! Hosts construct an [`AuthMiddleware`] around their dispatch seam and
//! route every backend action through it. The middleware transparently
//! refreshes expired session tokens (one refresh in flight at a time,
//! queued requests replayed in FIFO order), retries transient failures
//! with backoff, honors rate-limit hints, suppresses duplicate
//! dispatches, and trips a circuit breaker - escalating into a terminal
//! safe state - when refresh keeps failing.

pub mod action;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod middleware;
pub mod notify;

pub use action::{Action, Method};
pub use auth::{HttpRefresher, Session, SessionHandle, TokenGrant, TokenRefresher};
pub use config::PolicyConfig;
pub use dispatch::{Dispatcher, RestDispatcher};
pub use error::{ApiError, ErrorClass};
pub use middleware::state::{MiddlewareStats, Phase};
pub use middleware::AuthMiddleware;
pub use notify::{LogNotifier, Notice, NoticeLevel, Notifier, NullRedirector, Redirector};
