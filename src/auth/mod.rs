//! Session tokens and refresh.
//!
//! The session (access token, refresh token, expiry) lives in a shared
//! [`SessionHandle`]; the middleware refreshes it through the
//! [`TokenRefresher`] seam.

pub mod refresh;
pub mod session;

pub use refresh::{HttpRefresher, TokenGrant, TokenRefresher};
pub use session::{Session, SessionHandle};
