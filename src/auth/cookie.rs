//! Session cookie manager (server side).
//!
//! Every Set-Cookie this server emits for the session goes through
//! [`SessionCookies`]. Three cookies make up a session:
//!
//! - `access_token`: readable by the client runtime (it attaches the token as a
//!   bearer header), short-lived. Not HttpOnly, an accepted risk.
//! - `refresh_token`: HttpOnly, scoped to the auth endpoints, long-lived.
//! - `session`: readable JSON descriptor, same lifetime as the refresh token.

use axum::http::{HeaderMap, HeaderName, header};
use axum::response::AppendHeaders;

use super::types::{SessionDescriptor, SessionSnapshot};
use crate::jwt::IssuedToken;

/// Cookie name for the access token.
pub const ACCESS_COOKIE_NAME: &str = "access_token";

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Cookie name for the session descriptor.
pub const DESCRIPTOR_COOKIE_NAME: &str = "session";

/// The refresh cookie is only sent to the auth endpoints.
pub const REFRESH_COOKIE_PATH: &str = "/api/auth";

/// Set-Cookie headers ready to be returned from a handler.
pub type SetCookies = AppendHeaders<Vec<(HeaderName, String)>>;

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(cookie_header) = value.to_str() else {
            continue;
        };
        for part in cookie_header.split(';') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                if key.trim() == name {
                    let value = value.trim();
                    return (!value.is_empty()).then_some(value);
                }
            }
        }
    }
    None
}

pub fn encode_descriptor(descriptor: &SessionDescriptor) -> Option<String> {
    let json = serde_json::to_string(descriptor).ok()?;
    Some(urlencoding::encode(&json).into_owned())
}

pub fn decode_descriptor(raw: &str) -> Option<SessionDescriptor> {
    let json = urlencoding::decode(raw).ok()?;
    serde_json::from_str(&json).ok()
}

/// Builds and reads the session cookies with a fixed security policy.
#[derive(Debug, Clone, Copy)]
pub struct SessionCookies {
    secure: bool,
}

impl SessionCookies {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    fn secure_attr(&self) -> &'static str {
        if self.secure { "; Secure" } else { "" }
    }

    fn access_cookie(&self, value: &str, max_age: u64) -> String {
        format!(
            "{}={}; SameSite=Strict; Path=/; Max-Age={}{}",
            ACCESS_COOKIE_NAME,
            value,
            max_age,
            self.secure_attr()
        )
    }

    fn refresh_cookie(&self, value: &str, max_age: u64) -> String {
        format!(
            "{}={}; HttpOnly; SameSite=Strict; Path={}; Max-Age={}{}",
            REFRESH_COOKIE_NAME,
            value,
            REFRESH_COOKIE_PATH,
            max_age,
            self.secure_attr()
        )
    }

    fn descriptor_cookie(&self, value: &str, max_age: u64) -> String {
        format!(
            "{}={}; SameSite=Strict; Path=/; Max-Age={}{}",
            DESCRIPTOR_COOKIE_NAME,
            value,
            max_age,
            self.secure_attr()
        )
    }

    /// Cookies for a new session: access token, refresh token and descriptor.
    pub fn persist(
        &self,
        access: &IssuedToken,
        refresh: &IssuedToken,
        descriptor: &SessionDescriptor,
    ) -> SetCookies {
        let mut cookies = vec![
            (
                header::SET_COOKIE,
                self.access_cookie(&access.token, access.duration),
            ),
            (
                header::SET_COOKIE,
                self.refresh_cookie(&refresh.token, refresh.duration),
            ),
        ];
        match encode_descriptor(descriptor) {
            Some(value) => cookies.push((
                header::SET_COOKIE,
                self.descriptor_cookie(&value, refresh.duration),
            )),
            None => tracing::error!("Failed to encode session descriptor"),
        }
        AppendHeaders(cookies)
    }

    /// Rewrite only the access token cookie (refresh cycle).
    pub fn persist_access(&self, access: &IssuedToken) -> SetCookies {
        AppendHeaders(vec![(
            header::SET_COOKIE,
            self.access_cookie(&access.token, access.duration),
        )])
    }

    /// Expire all three cookies in one response.
    pub fn clear(&self) -> SetCookies {
        AppendHeaders(vec![
            (header::SET_COOKIE, self.access_cookie("", 0)),
            (header::SET_COOKIE, self.refresh_cookie("", 0)),
            (header::SET_COOKIE, self.descriptor_cookie("", 0)),
        ])
    }

    /// Read the client-visible half of the session from request cookies.
    pub fn read(headers: &HeaderMap) -> SessionSnapshot {
        SessionSnapshot::new(
            get_cookie(headers, ACCESS_COOKIE_NAME).map(str::to_string),
            get_cookie(headers, DESCRIPTOR_COOKIE_NAME).and_then(decode_descriptor),
        )
    }

    pub fn refresh_token(headers: &HeaderMap) -> Option<&str> {
        get_cookie(headers, REFRESH_COOKIE_NAME)
    }
}
