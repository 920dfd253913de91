#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, Response, StatusCode, header},
};
use clinic_gate::{
    ServerConfig,
    api::LoginCredentials,
    client::{
        ApiClient, InboundResponse, MemoryNavigator, OutboundRequest, SessionJar, Transport,
        TransportError,
    },
    create_app,
    credentials::{InMemoryCredentialStore, PrincipalSeed, Role},
    envelope::EnvelopeCipher,
    guard::RoutePolicy,
    jwt::JwtConfig,
};
use tokio::sync::Barrier;
use tower::ServiceExt;

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-that-is-long-enough";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-that-is-long-enough";
pub const ENVELOPE_KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

pub const ADMIN_ID: &str = "admin-1";
pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_SECRET: &str = "s3cret";

pub const SUPERADMIN_ID: &str = "root-1";
pub const SUPERADMIN_EMAIL: &str = "root@example.com";
pub const SUPERADMIN_SECRET: &str = "r00t-pass";

pub fn store() -> InMemoryCredentialStore {
    InMemoryCredentialStore::from_seeds(vec![
        PrincipalSeed {
            id: Some(ADMIN_ID.into()),
            email: ADMIN_EMAIL.into(),
            name: "Front Desk".into(),
            role: Role::Admin,
            secret: ADMIN_SECRET.into(),
        },
        PrincipalSeed {
            id: Some(SUPERADMIN_ID.into()),
            email: SUPERADMIN_EMAIL.into(),
            name: "Clinic Owner".into(),
            role: Role::Superadmin,
            secret: SUPERADMIN_SECRET.into(),
        },
    ])
    .expect("valid seeds")
}

pub fn jwt() -> JwtConfig {
    JwtConfig::new(ACCESS_SECRET, REFRESH_SECRET)
}

pub fn cipher() -> EnvelopeCipher {
    EnvelopeCipher::new(ENVELOPE_KEY).expect("32-byte key")
}

pub fn config_with_jwt(jwt: JwtConfig) -> ServerConfig {
    ServerConfig {
        jwt,
        cipher: cipher(),
        store: Arc::new(store()),
        policy: RoutePolicy::default(),
        secure_cookies: false,
        trust_forwarded_for: false,
    }
}

/// Create a test app with default lifetimes.
pub fn test_app() -> Router {
    create_app(&config_with_jwt(jwt()))
}

pub fn peer(last_octet: u8) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, last_octet], 40000))
}

/// Attach the socket address axum would normally provide.
pub fn with_peer(mut request: Request<Body>, addr: SocketAddr) -> Request<Body> {
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

pub fn sealed_login_body(identifier: &str, secret: &str) -> String {
    let envelope = cipher()
        .seal(&LoginCredentials {
            identifier: identifier.into(),
            secret: secret.into(),
        })
        .expect("seal credentials");
    serde_json::json!({ "envelope": envelope }).to_string()
}

pub fn login_request(identifier: &str, secret: &str) -> Request<Body> {
    with_peer(
        Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(sealed_login_body(identifier, secret)))
            .unwrap(),
        peer(1),
    )
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// The full Set-Cookie line for `name`.
pub fn find_cookie<'a>(cookies: &'a [String], name: &str) -> Option<&'a str> {
    let prefix = format!("{}=", name);
    cookies
        .iter()
        .find(|c| c.starts_with(&prefix))
        .map(String::as_str)
}

/// Just the value part of the Set-Cookie line for `name`.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let line = find_cookie(cookies, name)?;
    let pair = line.split(';').next()?;
    pair.split_once('=').map(|(_, v)| v.to_string())
}

/// Log in through the router and return the Set-Cookie lines and access token.
pub async fn login(app: &Router, identifier: &str, secret: &str) -> (Vec<String>, String) {
    let response = app
        .clone()
        .oneshot(login_request(identifier, secret))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let cookies = set_cookies(&response);
    let json = body_json(response).await;
    let token = json["data"]["accessToken"].as_str().unwrap().to_string();
    (cookies, token)
}

/// Build a `Cookie` request header out of Set-Cookie lines.
pub fn cookie_header(cookies: &[String], names: &[&str]) -> String {
    names
        .iter()
        .filter_map(|name| cookie_value(cookies, name).map(|v| format!("{}={}", name, v)))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Transport driving the router in-process.
#[derive(Clone)]
pub struct RouterTransport {
    router: Router,
    peer: SocketAddr,
    barrier: Option<Arc<Barrier>>,
    sent: Arc<Mutex<Vec<OutboundRequest>>>,
}

impl RouterTransport {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            peer: peer(200),
            barrier: None,
            sent: Arc::default(),
        }
    }

    /// Hold every 401 until `parties` of them are ready, so they all come
    /// back at once.
    pub fn synchronized(router: Router, parties: usize) -> Self {
        Self {
            router,
            peer: peer(201),
            barrier: Some(Arc::new(Barrier::new(parties))),
            sent: Arc::default(),
        }
    }

    /// Every request sent so far, shared between clones.
    pub fn sent(&self) -> Vec<OutboundRequest> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for RouterTransport {
    async fn send(&self, outbound: OutboundRequest) -> Result<InboundResponse, TransportError> {
        self.sent.lock().unwrap().push(outbound.clone());

        let mut builder = Request::builder().method(outbound.method).uri(outbound.path);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(outbound.headers);
        }
        let request = builder
            .body(Body::from(outbound.body.unwrap_or_default()))
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let request = with_peer(request, self.peer);

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if parts.status == StatusCode::UNAUTHORIZED {
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
        }

        Ok(InboundResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

pub type TestClient = ApiClient<RouterTransport, Arc<MemoryNavigator>>;

pub fn client(transport: RouterTransport, start: &str) -> (TestClient, Arc<MemoryNavigator>) {
    let navigator = Arc::new(MemoryNavigator::new(start));
    let client = ApiClient::new(
        transport,
        navigator.clone(),
        Arc::new(SessionJar::new()),
        cipher(),
        Arc::new(RoutePolicy::default()),
    );
    (client, navigator)
}
