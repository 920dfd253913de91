//! Client request interceptor.
//!
//! Every call to the server goes through [`ApiClient::send`], which attaches
//! the bearer credential and the jar's cookies on the way out and handles a
//! 401 on the way back: clear the session once, then leave for the login
//! page unless already there.

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};

use super::ClientError;
use super::guard::Navigator;
use super::jar::{Epoch, SessionJar};
use super::transport::{InboundResponse, OutboundRequest, Transport};
use crate::api::{AuthEnvelope, LoginCredentials, LoginData, LoginRequest, RefreshData};
use crate::auth::SessionDescriptor;
use crate::credentials::Principal;
use crate::envelope::EnvelopeCipher;
use crate::guard::{PathClass, RoutePolicy};

pub const LOGIN_ENDPOINT: &str = "/api/auth/login";
pub const REFRESH_ENDPOINT: &str = "/api/auth/refresh";
pub const LOGOUT_ENDPOINT: &str = "/api/auth/logout";

/// Pull a human-readable message out of either error body shape.
fn response_message(response: &InboundResponse) -> String {
    let value: serde_json::Value = response.json().unwrap_or_default();
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| {
            response
                .status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        })
}

pub struct ApiClient<T, N> {
    transport: T,
    navigator: N,
    jar: Arc<SessionJar>,
    cipher: EnvelopeCipher,
    policy: Arc<RoutePolicy>,
}

impl<T: Transport, N: Navigator> ApiClient<T, N> {
    pub fn new(
        transport: T,
        navigator: N,
        jar: Arc<SessionJar>,
        cipher: EnvelopeCipher,
        policy: Arc<RoutePolicy>,
    ) -> Self {
        Self {
            transport,
            navigator,
            jar,
            cipher,
            policy,
        }
    }

    pub fn jar(&self) -> &Arc<SessionJar> {
        &self.jar
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    /// Send a request through the interceptor.
    ///
    /// Returns the response for any status except 401. A response to a
    /// bearer-carrying request that arrives after the session was cleared or
    /// replaced is discarded as [`ClientError::SessionSuperseded`].
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<InboundResponse, ClientError> {
        let (epoch, snapshot) = self.jar.read_tagged();

        let mut headers = HeaderMap::new();
        let bearer = snapshot
            .access_token
            .as_deref()
            .and_then(|token| HeaderValue::from_str(&format!("Bearer {}", token)).ok());
        let authenticated = bearer.is_some();
        if let Some(value) = bearer {
            headers.insert(header::AUTHORIZATION, value);
        }
        if let Some(value) = self
            .jar
            .cookie_header(path)
            .and_then(|cookies| HeaderValue::from_str(&cookies).ok())
        {
            headers.insert(header::COOKIE, value);
        }
        if body.is_some() {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        let response = self
            .transport
            .send(OutboundRequest {
                method,
                path: path.to_string(),
                headers,
                body,
            })
            .await?;

        if response.status == StatusCode::UNAUTHORIZED {
            self.handle_unauthorized(epoch);
            return Err(ClientError::Unauthenticated(response_message(&response)));
        }

        if authenticated && self.jar.epoch() != epoch {
            debug!(path = %path, "Discarding response from a superseded session");
            return Err(ClientError::SessionSuperseded);
        }

        Ok(response)
    }

    /// Clear the session sent under `epoch` and leave for the login page.
    ///
    /// Simultaneous 401s from one session race on the epoch, so only the
    /// first clears and navigates.
    fn handle_unauthorized(&self, epoch: Epoch) {
        if !self.jar.clear_if(epoch) {
            return;
        }

        let current = self.navigator.current_path();
        if self.policy.is_login_path(&current) {
            debug!("Session cleared while on the login page");
            return;
        }

        let target = match self.policy.classify(&current) {
            PathClass::Protected => self.policy.login_url(&current),
            _ => self.policy.login_path().to_string(),
        };
        info!(from = %current, to = %target, "Session rejected, returning to login");
        self.navigator.navigate(&target);
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<InboundResponse, ClientError> {
        let body = body.map(|b| serde_json::to_vec(b)).transpose()?;
        self.send(method, path, body).await
    }

    fn expect_success(response: InboundResponse) -> Result<InboundResponse, ClientError> {
        if response.status.is_success() {
            Ok(response)
        } else {
            Err(ClientError::Rejected {
                status: response.status,
                message: response_message(&response),
            })
        }
    }

    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, ClientError> {
        let response = self.send(Method::GET, path, None).await?;
        Ok(Self::expect_success(response)?.json()?)
    }

    pub async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ClientError> {
        let response = self.send_json(Method::POST, path, Some(body)).await?;
        Ok(Self::expect_success(response)?.json()?)
    }

    /// Status-only call, for endpoints answering without a body.
    pub async fn call(&self, method: Method, path: &str) -> Result<StatusCode, ClientError> {
        let response = self.send(method, path, None).await?;
        Ok(Self::expect_success(response)?.status)
    }

    /// Seal the credentials, sign in, and persist the new session.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<Principal, ClientError> {
        let epoch = self.jar.epoch();
        let envelope = self.cipher.seal(&LoginCredentials {
            identifier: identifier.to_string(),
            secret: secret.to_string(),
        })?;

        let response = self
            .send_json(Method::POST, LOGIN_ENDPOINT, Some(&LoginRequest { envelope }))
            .await?;
        let response = Self::expect_success(response)?;

        let set_cookies = response.set_cookies();
        let data = response
            .json::<AuthEnvelope<LoginData>>()?
            .data
            .ok_or_else(|| ClientError::Rejected {
                status: response.status,
                message: "Login response carried no session".into(),
            })?;

        let descriptor = SessionDescriptor::from(&data.principal);
        if !self
            .jar
            .persist(epoch, &data.access_token, &descriptor, &set_cookies)
        {
            warn!("Session changed during login, discarding the new session");
            return Err(ClientError::SessionSuperseded);
        }

        info!(principal = %data.principal.id, "Signed in");
        Ok(data.principal)
    }

    /// Exchange the refresh cookie for a new access token.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let epoch = self.jar.epoch();
        let response = self.send(Method::POST, REFRESH_ENDPOINT, None).await?;
        let response = Self::expect_success(response)?;

        let set_cookies = response.set_cookies();
        let data = response
            .json::<AuthEnvelope<RefreshData>>()?
            .data
            .ok_or_else(|| ClientError::Rejected {
                status: response.status,
                message: "Refresh response carried no token".into(),
            })?;

        if !self.jar.persist_access(epoch, &data.access_token, &set_cookies) {
            debug!("Session cleared during refresh, discarding the new token");
            return Err(ClientError::SessionSuperseded);
        }
        Ok(())
    }

    /// Sign out. The local session is cleared even if the server is unreachable.
    pub async fn logout(&self) {
        if let Err(e) = self.send(Method::POST, LOGOUT_ENDPOINT, None).await {
            debug!(error = %e, "Logout request failed");
        }
        self.jar.clear();

        let current = self.navigator.current_path();
        if !self.policy.is_login_path(&current) {
            self.navigator.navigate(self.policy.login_path());
        }
    }
}
