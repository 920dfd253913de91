//! Session cookie manager (client side).
//!
//! The jar is the only place the client runtime writes or clears session
//! cookies. It models what a browser cookie store gives the application:
//! HttpOnly cookies are kept and forwarded by the transport, but never handed
//! to application code through [`SessionJar::read`].
//!
//! Every session-level mutation is tagged with an epoch. Starting a session or
//! clearing one moves to a new epoch; writes carrying a stale epoch are
//! dropped, so a clear always wins over a persist that was already in flight.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::auth::{
    ACCESS_COOKIE_NAME, DESCRIPTOR_COOKIE_NAME, REFRESH_COOKIE_NAME, SessionDescriptor,
    SessionSnapshot, decode_descriptor, encode_descriptor,
};

/// Session identity counter. Changes on every login and every clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Epoch(u64);

#[derive(Debug, Clone)]
struct StoredCookie {
    value: String,
    path: String,
    http_only: bool,
    expires_at: Option<Instant>,
}

impl StoredCookie {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }

    fn path_matches(&self, request_path: &str) -> bool {
        if self.path == "/" || request_path == self.path {
            return true;
        }
        request_path
            .strip_prefix(self.path.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// A parsed `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub http_only: bool,
    pub max_age: Option<i64>,
}

impl SetCookie {
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = SetCookie {
            name: name.to_string(),
            value: value.trim().to_string(),
            path: "/".to_string(),
            http_only: false,
            max_age: None,
        };

        for attr in parts {
            let attr = attr.trim();
            let (key, val) = attr.split_once('=').unwrap_or((attr, ""));
            match key.to_ascii_lowercase().as_str() {
                "path" if !val.is_empty() => cookie.path = val.to_string(),
                "max-age" => cookie.max_age = val.trim().parse().ok(),
                "httponly" => cookie.http_only = true,
                _ => {}
            }
        }

        Some(cookie)
    }

    /// A non-positive Max-Age (or an empty value) deletes the cookie.
    fn is_removal(&self) -> bool {
        self.max_age.is_some_and(|secs| secs <= 0) || self.value.is_empty()
    }

    /// Expiry instant, or `None` for a session cookie. A Max-Age too large
    /// to represent never expires.
    fn expires_at(&self, now: Instant) -> Option<Instant> {
        let secs = u64::try_from(self.max_age?).ok()?;
        now.checked_add(Duration::from_secs(secs))
    }
}

#[derive(Debug, Default)]
struct JarInner {
    cookies: HashMap<String, StoredCookie>,
    epoch: u64,
}

impl JarInner {
    fn apply(&mut self, cookie: SetCookie, now: Instant) {
        if cookie.is_removal() {
            self.cookies.remove(&cookie.name);
            return;
        }
        let expires_at = cookie.expires_at(now);
        self.cookies.insert(
            cookie.name,
            StoredCookie {
                value: cookie.value,
                path: cookie.path,
                http_only: cookie.http_only,
                expires_at,
            },
        );
    }

    fn apply_all(&mut self, set_cookies: &[String], now: Instant) {
        for header in set_cookies {
            match SetCookie::parse(header) {
                Some(cookie) => self.apply(cookie, now),
                None => tracing::debug!("Ignoring malformed Set-Cookie header"),
            }
        }
    }

    /// Write a client-side cookie, keeping the expiry the server gave it.
    fn write_readable(&mut self, name: &str, value: String) {
        match self.cookies.get_mut(name) {
            Some(existing) if !existing.http_only => existing.value = value,
            _ => {
                self.cookies.insert(
                    name.to_string(),
                    StoredCookie {
                        value,
                        path: "/".to_string(),
                        http_only: false,
                        expires_at: None,
                    },
                );
            }
        }
    }

    fn live_value(&self, name: &str, now: Instant) -> Option<&str> {
        self.cookies
            .get(name)
            .filter(|c| !c.http_only && c.is_live(now))
            .map(|c| c.value.as_str())
    }

    fn snapshot(&self, now: Instant) -> SessionSnapshot {
        SessionSnapshot::new(
            self.live_value(ACCESS_COOKIE_NAME, now).map(str::to_string),
            self.live_value(DESCRIPTOR_COOKIE_NAME, now)
                .and_then(decode_descriptor),
        )
    }

    fn clear_session(&mut self) {
        for name in [ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, DESCRIPTOR_COOKIE_NAME] {
            self.cookies.remove(name);
        }
        self.epoch += 1;
    }
}

/// Client-side cookie store holding the session.
#[derive(Debug, Default)]
pub struct SessionJar {
    inner: Mutex<JarInner>,
}

impl SessionJar {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JarInner> {
        // A panic while holding the lock cannot leave the map half-written.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn epoch(&self) -> Epoch {
        Epoch(self.lock().epoch)
    }

    /// Epoch and application view taken under one lock, so the snapshot
    /// always belongs to the returned epoch.
    pub fn read_tagged(&self) -> (Epoch, SessionSnapshot) {
        let now = Instant::now();
        let inner = self.lock();
        (Epoch(inner.epoch), inner.snapshot(now))
    }

    /// Application view of the session. The descriptor is withheld whenever
    /// the access token is gone.
    pub fn read(&self) -> SessionSnapshot {
        self.lock().snapshot(Instant::now())
    }

    /// `Cookie` header the transport attaches for a request to `path`,
    /// HttpOnly cookies included.
    pub fn cookie_header(&self, path: &str) -> Option<String> {
        let now = Instant::now();
        let inner = self.lock();
        let mut pairs: Vec<String> = inner
            .cookies
            .iter()
            .filter(|(_, c)| c.is_live(now) && c.path_matches(path))
            .map(|(name, c)| format!("{}={}", name, c.value))
            .collect();
        if pairs.is_empty() {
            return None;
        }
        pairs.sort();
        Some(pairs.join("; "))
    }

    /// Start a new session: apply the server's cookies, then write the access
    /// token and descriptor. Dropped if the session changed since `expected`.
    pub fn persist(
        &self,
        expected: Epoch,
        access_token: &str,
        descriptor: &SessionDescriptor,
        set_cookies: &[String],
    ) -> bool {
        let now = Instant::now();
        let mut inner = self.lock();
        if inner.epoch != expected.0 {
            return false;
        }

        inner.apply_all(set_cookies, now);
        inner.write_readable(ACCESS_COOKIE_NAME, access_token.to_string());
        if let Some(encoded) = encode_descriptor(descriptor) {
            inner.write_readable(DESCRIPTOR_COOKIE_NAME, encoded);
        }
        inner.epoch += 1;
        true
    }

    /// Rewrite the access token within the current session (refresh cycle).
    pub fn persist_access(&self, expected: Epoch, access_token: &str, set_cookies: &[String]) -> bool {
        let now = Instant::now();
        let mut inner = self.lock();
        if inner.epoch != expected.0 {
            return false;
        }

        inner.apply_all(set_cookies, now);
        inner.write_readable(ACCESS_COOKIE_NAME, access_token.to_string());
        true
    }

    /// Remove all three session cookies unconditionally.
    pub fn clear(&self) {
        self.lock().clear_session();
    }

    /// Clear only if no other clear or login happened since `expected`.
    /// Returns whether this call performed the clear.
    pub fn clear_if(&self, expected: Epoch) -> bool {
        let mut inner = self.lock();
        if inner.epoch != expected.0 {
            return false;
        }
        inner.clear_session();
        true
    }
}
