//! JWT token generation and validation.
//!
//! Access and refresh tokens are signed with different secrets so that a leak
//! of one key cannot be used to forge the other kind of token. Validation is
//! stateless: signature plus expiry, nothing is looked up server-side.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::credentials::{Principal, Role};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// JWT ID
    pub jti: String,
    /// Subject (principal id)
    pub sub: String,
    pub role: Role,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// JWT claims for refresh tokens. Carries no role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub jti: String,
    pub sub: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: u64,
    pub exp: u64,
}

/// Default access token lifetime: 15 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// Default refresh token lifetime: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Longest lifetime accepted for either token: 365 days
pub const MAX_TOKEN_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// A freshly minted token with its lifetime.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: u64,
    pub expires_at: u64,
    /// Lifetime in seconds
    pub duration: u64,
}

/// Access + refresh token pair returned at login.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Principal context recovered from a valid access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalContext {
    pub principal_id: String,
    pub role: Role,
    pub issued_at: u64,
    pub expires_at: u64,
}

/// Token issuer holding both signing secrets and the configured lifetimes.
#[derive(Clone)]
pub struct JwtConfig {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: u64,
    refresh_ttl: u64,
}

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Signature valid but `exp` has passed.
    #[error("token expired")]
    Expired,
    /// Bad signature, malformed token, or wrong token type.
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("system time error")]
    Time,
    /// `iat + lifetime` does not fit in a timestamp.
    #[error("token lifetime overflows the expiry timestamp")]
    LifetimeOverflow,
}

pub fn unix_now() -> Result<u64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| TokenError::Time)
}

impl JwtConfig {
    /// Create an issuer with the default lifetimes.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
            access_ttl: ACCESS_TOKEN_DURATION_SECS,
            refresh_ttl: REFRESH_TOKEN_DURATION_SECS,
        }
    }

    /// Override the token lifetimes (seconds).
    pub fn with_lifetimes(mut self, access_ttl: u64, refresh_ttl: u64) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    pub fn access_ttl(&self) -> u64 {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> u64 {
        self.refresh_ttl
    }

    /// Mint an access and a refresh token for `principal`.
    pub fn issue(&self, principal: &Principal) -> Result<TokenPair, TokenError> {
        self.issue_at(principal, unix_now()?)
    }

    pub fn issue_at(&self, principal: &Principal, now: u64) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access: self.generate_access_token_at(&principal.id, principal.role, now)?,
            refresh: self.generate_refresh_token_at(&principal.id, now)?,
        })
    }

    /// Mint a standalone access token (used by the refresh endpoint).
    pub fn generate_access_token(
        &self,
        principal_id: &str,
        role: Role,
    ) -> Result<IssuedToken, TokenError> {
        self.generate_access_token_at(principal_id, role, unix_now()?)
    }

    pub fn generate_access_token_at(
        &self,
        principal_id: &str,
        role: Role,
        now: u64,
    ) -> Result<IssuedToken, TokenError> {
        let exp = now
            .checked_add(self.access_ttl)
            .ok_or(TokenError::LifetimeOverflow)?;
        let claims = AccessClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: principal_id.to_string(),
            role,
            token_type: TokenType::Access,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.access_encoding)
            .map_err(TokenError::Encoding)?;

        Ok(IssuedToken {
            token,
            issued_at: now,
            expires_at: exp,
            duration: self.access_ttl,
        })
    }

    fn generate_refresh_token_at(
        &self,
        principal_id: &str,
        now: u64,
    ) -> Result<IssuedToken, TokenError> {
        let exp = now
            .checked_add(self.refresh_ttl)
            .ok_or(TokenError::LifetimeOverflow)?;
        let claims = RefreshClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: principal_id.to_string(),
            token_type: TokenType::Refresh,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.refresh_encoding)
            .map_err(TokenError::Encoding)?;

        Ok(IssuedToken {
            token,
            issued_at: now,
            expires_at: exp,
            duration: self.refresh_ttl,
        })
    }

    /// Validate an access token against the current time.
    pub fn validate_access(&self, token: &str) -> Result<PrincipalContext, TokenError> {
        self.validate_access_at(token, unix_now()?)
    }

    pub fn validate_access_at(&self, token: &str, now: u64) -> Result<PrincipalContext, TokenError> {
        let claims: AccessClaims = decode(token, &self.access_decoding)?;

        if claims.token_type != TokenType::Access {
            return Err(TokenError::InvalidSignature);
        }
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(PrincipalContext {
            principal_id: claims.sub,
            role: claims.role,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }

    /// Validate a refresh token and return the principal id it was issued to.
    pub fn validate_refresh(&self, token: &str) -> Result<String, TokenError> {
        self.validate_refresh_at(token, unix_now()?)
    }

    pub fn validate_refresh_at(&self, token: &str, now: u64) -> Result<String, TokenError> {
        let claims: RefreshClaims = decode(token, &self.refresh_decoding)?;

        if claims.token_type != TokenType::Refresh {
            return Err(TokenError::InvalidSignature);
        }
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims.sub)
    }
}

/// Verify the signature and decode claims. Expiry is checked by the caller
/// against its own clock.
fn decode<T: serde::de::DeserializeOwned>(token: &str, key: &DecodingKey) -> Result<T, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);

    jsonwebtoken::decode::<T>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::InvalidSignature,
        })
}
