//! Session types shared by the server and client halves.

use serde::{Deserialize, Serialize};

use crate::credentials::{Principal, Role};

pub use crate::jwt::PrincipalContext;

/// Non-secret, client-visible description of the signed-in principal.
///
/// Stored in a readable cookie so the client can render identity without a
/// round trip. Only meaningful while an access token is also present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub email: String,
}

impl From<&Principal> for SessionDescriptor {
    fn from(principal: &Principal) -> Self {
        Self {
            id: principal.id.clone(),
            role: principal.role,
            name: principal.name.clone(),
            email: principal.email.clone(),
        }
    }
}

/// What a reader of the session cookies gets back.
///
/// `descriptor` is `None` whenever `access_token` is `None`, even if the
/// descriptor cookie itself is still around.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub access_token: Option<String>,
    pub descriptor: Option<SessionDescriptor>,
}

impl SessionSnapshot {
    pub fn new(access_token: Option<String>, descriptor: Option<SessionDescriptor>) -> Self {
        let descriptor = if access_token.is_some() {
            descriptor
        } else {
            None
        };
        Self {
            access_token,
            descriptor,
        }
    }

    /// A session is present only when both halves are.
    pub fn is_present(&self) -> bool {
        self.access_token.is_some() && self.descriptor.is_some()
    }
}
