//! User-facing side effects: notifications and login redirects.
//!
//! The host wires these to its toast UI and navigation; the defaults here
//! only log.

use crate::config::PolicyConfig;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A user-facing notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub body: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Sink for user-facing notices.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Default notifier: routes notices to tracing.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => tracing::warn!(title = %notice.title, "{}", notice.body),
            NoticeLevel::Info => tracing::info!(title = %notice.title, "{}", notice.body),
        }
    }
}

/// Navigation primitive for the sign-out redirect.
pub trait Redirector: Send + Sync {
    /// Path the user is currently on, if the host tracks one. Used both to
    /// build the return URL and to skip redundant redirects to the login
    /// page itself.
    fn current_path(&self) -> Option<String>;

    fn redirect(&self, to: &str);
}

/// Default redirector: no known path, redirects only logged.
pub struct NullRedirector;

impl Redirector for NullRedirector {
    fn current_path(&self) -> Option<String> {
        None
    }

    fn redirect(&self, to: &str) {
        tracing::info!("redirect requested: {to}");
    }
}

/// Build the login URL, carrying the interrupted path as `returnUrl`.
pub(crate) fn login_url(policy: &PolicyConfig, return_to: Option<&str>) -> String {
    match return_to {
        Some(path) if !path.is_empty() => {
            let encoded: String = url::form_urlencoded::byte_serialize(path.as_bytes()).collect();
            format!("{}?returnUrl={}", policy.login_path, encoded)
        }
        _ => policy.login_path.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_url_encodes_return_path() {
        let policy = PolicyConfig::default();
        assert_eq!(
            login_url(&policy, Some("/farm/42?tab=events")),
            "/login?returnUrl=%2Ffarm%2F42%3Ftab%3Devents"
        );
    }

    #[test]
    fn test_login_url_without_return_path() {
        let policy = PolicyConfig::default();
        assert_eq!(login_url(&policy, None), "/login");
        assert_eq!(login_url(&policy, Some("")), "/login");
    }
}
