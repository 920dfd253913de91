//! CLI argument parsing, secret loading, and startup validation.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use clap::Parser;
use tracing::info;

use crate::ServerConfig;
use crate::credentials::InMemoryCredentialStore;
use crate::envelope::{EnvelopeCipher, KEY_LEN};
use crate::guard::RoutePolicy;
use crate::jwt::{
    ACCESS_TOKEN_DURATION_SECS, JwtConfig, MAX_TOKEN_DURATION_SECS, REFRESH_TOKEN_DURATION_SECS,
};

const MIN_JWT_SECRET_LENGTH: usize = 32;

pub const ACCESS_SECRET_VAR: &str = "ACCESS_TOKEN_SECRET";
pub const REFRESH_SECRET_VAR: &str = "REFRESH_TOKEN_SECRET";
pub const ENVELOPE_KEY_VAR: &str = "ENVELOPE_KEY";

/// Startup configuration is missing or unusable. The server refuses to run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required. Set the environment variable or pass the matching --*-file flag")]
    Missing(&'static str),
    #[error("{0}")]
    Invalid(String),
}

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "clinic-gate",
    about = "Session gateway for the clinic administration console"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7291")]
    pub port: u16,

    /// Access token lifetime in seconds
    #[arg(long, env = "ACCESS_TOKEN_TTL_SECS", default_value_t = ACCESS_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..))]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "REFRESH_TOKEN_TTL_SECS", default_value_t = REFRESH_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..))]
    pub refresh_ttl_secs: u64,

    /// Set the Secure flag on session cookies (required behind HTTPS)
    #[arg(long)]
    pub secure_cookies: bool,

    /// JSON file with the principals allowed to sign in
    #[arg(long)]
    pub principals_file: String,

    /// Take the client IP from X-Forwarded-For (only behind a trusted proxy)
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Path to file containing the access token secret. Prefer ACCESS_TOKEN_SECRET
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer REFRESH_TOKEN_SECRET
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Path to file containing the envelope key. Prefer ENVELOPE_KEY
    #[arg(long)]
    pub envelope_key_file: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a secret from the environment or from a file.
///
/// The environment variable wins and is removed once read.
pub fn load_secret(var: &'static str, file: Option<&str>) -> Result<String, ConfigError> {
    if let Ok(secret) = std::env::var(var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(var) };
        if secret.is_empty() {
            return Err(ConfigError::Missing(var));
        }
        return Ok(secret);
    }

    let Some(path) = file else {
        return Err(ConfigError::Missing(var));
    };

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read {} from {}: {}", var, path, e)))?;
    let content = content.trim().to_string();
    if content.is_empty() {
        return Err(ConfigError::Missing(var));
    }
    Ok(content)
}

/// Both signing secrets must be long enough and must not be the same value.
pub fn validate_signing_secrets(access: &str, refresh: &str) -> Result<(), ConfigError> {
    for (var, secret) in [(ACCESS_SECRET_VAR, access), (REFRESH_SECRET_VAR, refresh)] {
        if secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "{} is shorter than {} characters. Use a longer secret",
                var, MIN_JWT_SECRET_LENGTH
            )));
        }
    }

    if access == refresh {
        return Err(ConfigError::Invalid(format!(
            "{} and {} must be different",
            ACCESS_SECRET_VAR, REFRESH_SECRET_VAR
        )));
    }

    Ok(())
}

/// Accept the envelope key as exactly 32 raw bytes, or as base64 / base64url
/// text decoding to 32 bytes.
pub fn decode_envelope_key(raw: &str) -> Result<Vec<u8>, ConfigError> {
    if raw.len() == KEY_LEN {
        return Ok(raw.as_bytes().to_vec());
    }

    [STANDARD, URL_SAFE, URL_SAFE_NO_PAD]
        .iter()
        .filter_map(|engine| engine.decode(raw).ok())
        .find(|bytes| bytes.len() == KEY_LEN)
        .ok_or_else(|| {
            ConfigError::Invalid(format!(
                "{} must be {} raw bytes or base64 encoding {} bytes",
                ENVELOPE_KEY_VAR, KEY_LEN, KEY_LEN
            ))
        })
}

/// Both lifetimes must be positive, bounded, and ordered.
pub fn validate_lifetimes(access_ttl: u64, refresh_ttl: u64) -> Result<(), ConfigError> {
    for (name, ttl) in [("Access", access_ttl), ("Refresh", refresh_ttl)] {
        if ttl == 0 || ttl > MAX_TOKEN_DURATION_SECS {
            return Err(ConfigError::Invalid(format!(
                "{} token lifetime must be between 1 and {} seconds",
                name, MAX_TOKEN_DURATION_SECS
            )));
        }
    }
    if refresh_ttl < access_ttl {
        return Err(ConfigError::Invalid(
            "Refresh token lifetime must not be shorter than the access token lifetime".into(),
        ));
    }
    Ok(())
}

/// Build ServerConfig from arguments and the process environment.
pub fn build_config(args: &Args) -> Result<ServerConfig, ConfigError> {
    let access = load_secret(ACCESS_SECRET_VAR, args.access_secret_file.as_deref())?;
    let refresh = load_secret(REFRESH_SECRET_VAR, args.refresh_secret_file.as_deref())?;
    let envelope_key = load_secret(ENVELOPE_KEY_VAR, args.envelope_key_file.as_deref())?;

    validate_signing_secrets(&access, &refresh)?;
    let cipher = EnvelopeCipher::new(&decode_envelope_key(&envelope_key)?)?;

    validate_lifetimes(args.access_ttl_secs, args.refresh_ttl_secs)?;

    let jwt = JwtConfig::new(access.as_bytes(), refresh.as_bytes())
        .with_lifetimes(args.access_ttl_secs, args.refresh_ttl_secs);

    let store = InMemoryCredentialStore::from_file(&args.principals_file).map_err(|e| {
        ConfigError::Invalid(format!(
            "Failed to load principals from {}: {}",
            args.principals_file, e
        ))
    })?;
    info!(path = %args.principals_file, count = store.len(), "Principals loaded");

    Ok(ServerConfig {
        jwt,
        cipher,
        store: Arc::new(store),
        policy: RoutePolicy::default(),
        secure_cookies: args.secure_cookies,
        trust_forwarded_for: args.trust_forwarded_for,
    })
}
