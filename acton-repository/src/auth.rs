//! Authentication context used for per-user cache tags
//!
//! An [`AuthContext`] holds named [`Guard`]s. Cached repositories probe the
//! guards listed in `repository.cache.guards`, in order, and tag entries with
//! the id of the first authenticated one.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// One authentication mechanism (session, token, ...)
pub trait Guard: Send + Sync {
    /// Whether a principal is authenticated
    fn check(&self) -> bool;

    /// Id of the authenticated principal
    fn id(&self) -> Option<String>;
}

/// Guard holding the principal id in memory
///
/// ```rust
/// use acton_repository::auth::{Guard, SessionGuard};
///
/// let guard = SessionGuard::new();
/// assert!(!guard.check());
/// guard.login("42");
/// assert_eq!(guard.id().as_deref(), Some("42"));
/// ```
#[derive(Debug, Default)]
pub struct SessionGuard {
    user: RwLock<Option<String>>,
}

impl SessionGuard {
    /// Guard with nobody logged in
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard with `id` logged in
    pub fn authenticated(id: impl Into<String>) -> Self {
        Self {
            user: RwLock::new(Some(id.into())),
        }
    }

    /// Log a principal in
    pub fn login(&self, id: impl Into<String>) {
        if let Ok(mut user) = self.user.write() {
            *user = Some(id.into());
        }
    }

    /// Log the current principal out
    pub fn logout(&self) {
        if let Ok(mut user) = self.user.write() {
            *user = None;
        }
    }
}

impl Guard for SessionGuard {
    fn check(&self) -> bool {
        self.id().is_some()
    }

    fn id(&self) -> Option<String> {
        self.user.read().ok().and_then(|user| user.clone())
    }
}

/// Named guards available to the repositories of one request
#[derive(Clone, Default)]
pub struct AuthContext {
    guards: HashMap<String, Arc<dyn Guard>>,
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.guards.keys().collect();
        names.sort();
        f.debug_struct("AuthContext").field("guards", &names).finish()
    }
}

impl AuthContext {
    /// Context without guards; every lookup yields no user
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a guard under a name
    #[must_use]
    pub fn with_guard(mut self, name: impl Into<String>, guard: Arc<dyn Guard>) -> Self {
        self.guards.insert(name.into(), guard);
        self
    }

    /// Look a guard up by name
    pub fn guard(&self, name: &str) -> Option<&Arc<dyn Guard>> {
        self.guards.get(name)
    }

    /// Id of the first authenticated guard among `names`, in order
    ///
    /// Names without a registered guard are skipped.
    pub fn user_id<S: AsRef<str>>(&self, names: &[S]) -> Option<String> {
        for name in names {
            let name = name.as_ref();
            let Some(guard) = self.guards.get(name) else {
                tracing::warn!(guard = name, "Configured auth guard is not registered");
                continue;
            };
            if guard.check() {
                if let Some(id) = guard.id() {
                    return Some(id);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_guard_login_logout() {
        let guard = SessionGuard::new();
        assert!(!guard.check());
        guard.login("7");
        assert!(guard.check());
        guard.logout();
        assert_eq!(guard.id(), None);
    }

    #[test]
    fn test_first_authenticated_guard_wins() {
        let auth = AuthContext::new()
            .with_guard("web", Arc::new(SessionGuard::new()))
            .with_guard("api", Arc::new(SessionGuard::authenticated("api-9")))
            .with_guard("admin", Arc::new(SessionGuard::authenticated("admin-1")));

        assert_eq!(auth.user_id(&["web", "api", "admin"]).as_deref(), Some("api-9"));
        assert_eq!(auth.user_id(&["admin", "api"]).as_deref(), Some("admin-1"));
        assert_eq!(auth.user_id(&["web"]), None);
        assert_eq!(auth.user_id::<&str>(&[]), None);
    }

    #[test]
    fn test_unknown_guards_are_skipped() {
        let auth = AuthContext::new().with_guard("api", Arc::new(SessionGuard::authenticated("3")));
        assert_eq!(auth.user_id(&["missing", "api"]).as_deref(), Some("3"));
    }
}
