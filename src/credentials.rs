//! Principal records and the credential store consulted at login.
//!
//! The store is an external collaborator of the session protocol: it answers
//! "do these credentials belong to somebody" and "who is principal X". The
//! bundled implementation keeps everything in memory, seeded from a JSON file.

use openssl::memcmp;
use openssl::sha::sha256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Administrative role carried by every principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Superadmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }
}

/// An authenticated administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub email: String,
}

/// Lookup interface used by the login and refresh endpoints.
pub trait CredentialStore: Send + Sync {
    /// Return the principal if `identifier`/`secret` match a record.
    fn verify(&self, identifier: &str, secret: &str) -> Option<Principal>;

    fn find_by_id(&self, id: &str) -> Option<Principal>;

    fn list(&self) -> Vec<Principal>;
}

/// One entry of the seed file.
#[derive(Debug, Deserialize)]
pub struct PrincipalSeed {
    #[serde(default)]
    pub id: Option<String>,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub secret: String,
}

struct Record {
    principal: Principal,
    secret_digest: [u8; 32],
}

/// In-memory store. Secrets are kept only as SHA-256 digests.
#[derive(Clone, Default)]
pub struct InMemoryCredentialStore {
    by_email: Arc<HashMap<String, Arc<Record>>>,
    by_id: Arc<HashMap<String, Arc<Record>>>,
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read principals file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse principals file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate principal: {0}")]
    Duplicate(String),
}

impl InMemoryCredentialStore {
    pub fn from_seeds(seeds: Vec<PrincipalSeed>) -> Result<Self, SeedError> {
        let mut by_email = HashMap::new();
        let mut by_id = HashMap::new();

        for seed in seeds {
            let email = seed.email.trim().to_lowercase();
            let id = seed
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            let record = Arc::new(Record {
                principal: Principal {
                    id: id.clone(),
                    role: seed.role,
                    name: seed.name,
                    email: email.clone(),
                },
                secret_digest: sha256(seed.secret.as_bytes()),
            });

            if by_email.insert(email.clone(), record.clone()).is_some() {
                return Err(SeedError::Duplicate(email));
            }
            if by_id.insert(id.clone(), record).is_some() {
                return Err(SeedError::Duplicate(id));
            }
        }

        Ok(Self {
            by_email: Arc::new(by_email),
            by_id: Arc::new(by_id),
        })
    }

    /// Load seeds from a JSON array file.
    pub fn from_file(path: &str) -> Result<Self, SeedError> {
        let content = std::fs::read_to_string(path)?;
        let seeds: Vec<PrincipalSeed> = serde_json::from_str(&content)?;
        Self::from_seeds(seeds)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn verify(&self, identifier: &str, secret: &str) -> Option<Principal> {
        let record = self.by_email.get(&identifier.trim().to_lowercase())?;
        let digest = sha256(secret.as_bytes());
        memcmp::eq(&digest, &record.secret_digest).then(|| record.principal.clone())
    }

    fn find_by_id(&self, id: &str) -> Option<Principal> {
        self.by_id.get(id).map(|r| r.principal.clone())
    }

    fn list(&self) -> Vec<Principal> {
        let mut principals: Vec<Principal> =
            self.by_id.values().map(|r| r.principal.clone()).collect();
        principals.sort_by(|a, b| a.email.cmp(&b.email));
        principals
    }
}
