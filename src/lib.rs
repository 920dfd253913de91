pub mod api;
pub mod auth;
pub mod cli;
pub mod client;
pub mod credentials;
pub mod envelope;
pub mod guard;
pub mod jwt;
pub mod pages;
pub mod rate_limit;

use api::create_api_router;
use axum::{Router, middleware};
use credentials::CredentialStore;
use envelope::EnvelopeCipher;
use guard::RoutePolicy;
use guard::edge::{EdgeState, edge_guard};
use jwt::JwtConfig;
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Signing configuration for access and refresh tokens
    pub jwt: JwtConfig,
    /// Cipher for login envelopes
    pub cipher: EnvelopeCipher,
    /// Principals allowed to sign in
    pub store: Arc<dyn CredentialStore>,
    /// Public/protected page classification used by the edge guard
    pub policy: RoutePolicy,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Whether to read the client IP from X-Forwarded-For
    pub trust_forwarded_for: bool,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(config.jwt.clone());
    let rate_limit = Arc::new(RateLimitConfig::new(config.trust_forwarded_for));

    let api_router = create_api_router(
        jwt.clone(),
        Arc::new(config.cipher.clone()),
        config.store.clone(),
        config.secure_cookies,
        rate_limit,
    );

    // Every non-API navigation passes the edge guard before the shell is served
    let edge_state = EdgeState {
        policy: Arc::new(config.policy.clone()),
        jwt,
    };
    let pages = Router::new()
        .fallback(pages::shell)
        .layer(middleware::from_fn_with_state(edge_state, edge_guard));

    Router::new()
        .nest("/api", api_router)
        .fallback_service(pages)
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
