//! Cookie-carried session authentication.
//!
//! Dual-token system: short-lived access tokens and long-lived refresh
//! tokens, each signed with its own secret. Both are stateless. When the
//! access token is missing or expired, a valid refresh token mints a new one
//! and the response middleware sets it as a cookie.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod session;
mod state;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, expired_cookie, get_cookie, session_cookie,
};
pub use errors::ApiAuthError;
pub use extractors::{
    Auth, MaybeAuth, NEW_ACCESS_TOKEN_COOKIE, add_access_token_cookie, discard_renewed_cookie,
};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use session::{Session, SessionError, SessionManager, append_cookie};
pub use state::HasSessionBackend;
