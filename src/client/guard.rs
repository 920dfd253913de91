//! In-application evaluation point of the route policy.
//!
//! Runs on client-side navigation, using the same [`RoutePolicy`] as the
//! edge guard. Without a secret it cannot check signatures, so a session
//! counts as present when the jar still holds an unexpired access token and
//! a descriptor.

use std::sync::{Arc, Mutex};

use super::jar::SessionJar;
use crate::guard::{GuardDecision, RoutePolicy};

/// Where the client currently is and how it moves.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;

    fn navigate(&self, to: &str);
}

/// Navigator for headless runtimes: keeps the visited locations in memory.
#[derive(Debug)]
pub struct MemoryNavigator {
    history: Mutex<Vec<String>>,
}

impl MemoryNavigator {
    pub fn new(start: &str) -> Self {
        Self {
            history: Mutex::new(vec![start.to_string()]),
        }
    }

    /// Every location visited, starting location first.
    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Number of navigations performed after the starting location.
    pub fn navigations(&self) -> usize {
        self.history().len().saturating_sub(1)
    }
}

impl Navigator for MemoryNavigator {
    fn current_path(&self) -> String {
        let history = self.history();
        let current = history.last().map(String::as_str).unwrap_or("/");
        // Locations may carry a query string
        current.split('?').next().unwrap_or("/").to_string()
    }

    fn navigate(&self, to: &str) {
        let mut history = self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        history.push(to.to_string());
    }
}

impl<N: Navigator + ?Sized> Navigator for Arc<N> {
    fn current_path(&self) -> String {
        (**self).current_path()
    }

    fn navigate(&self, to: &str) {
        (**self).navigate(to)
    }
}

#[derive(Clone)]
pub struct AppGuard {
    policy: Arc<RoutePolicy>,
    jar: Arc<SessionJar>,
}

impl AppGuard {
    pub fn new(policy: Arc<RoutePolicy>, jar: Arc<SessionJar>) -> Self {
        Self { policy, jar }
    }

    pub fn check(&self, path: &str) -> GuardDecision {
        self.policy.evaluate(path, self.jar.read().is_present())
    }

    /// Apply the decision for a navigation to `path`. Returns `true` when the
    /// navigation may proceed; otherwise the navigator has been redirected.
    pub fn enforce<N: Navigator + ?Sized>(&self, path: &str, navigator: &N) -> bool {
        match self.check(path) {
            GuardDecision::Allow => true,
            decision => {
                let location = decision.location().unwrap_or(self.policy.login_path());
                tracing::debug!(path = %path, location = %location, "In-app guard redirect");
                navigator.navigate(location);
                false
            }
        }
    }

    /// Send the navigator to the honoured return target after a login.
    pub fn complete_login<N: Navigator + ?Sized>(&self, requested: Option<&str>, navigator: &N) {
        navigator.navigate(&self.policy.return_target(requested));
    }
}
