//! Session authentication.
//!
//! Stateless dual-token scheme: short-lived access tokens presented as bearer
//! credentials, and long-lived refresh tokens that only ever travel in an
//! HttpOnly cookie to the auth endpoints. All session cookies are written and
//! cleared through [`SessionCookies`].

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE_NAME, DESCRIPTOR_COOKIE_NAME, REFRESH_COOKIE_NAME, REFRESH_COOKIE_PATH,
    SessionCookies, SetCookies, decode_descriptor, encode_descriptor, get_cookie,
};
pub use errors::{ApiAuthError, AuthErrorKind, ErrorBody};
pub use extractors::{
    AnyRole, Auth, RoleConstraint, SuperadminOnly, authenticate, bearer_token, require_auth,
};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use state::HasAuthBackend;
pub use types::{PrincipalContext, SessionDescriptor, SessionSnapshot};
