//! HTTP transport for the token lifecycle.
//!
//! Tokens travel in the `Authorization` and `Refresh` HttpOnly cookies, with
//! `Bearer` headers as a fallback for non-browser clients. Protected routes
//! sit behind [`require_auth`], which performs silent refresh when the access
//! token has expired.

mod cookie;
mod errors;
mod ip;
mod middleware;
mod state;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, REFRESH_HEADER, access_token, clear_cookie,
    clear_token_cookies, get_cookie, refresh_token, set_token_cookies, token_cookie,
};
pub use errors::ApiAuthError;
pub use ip::{HasHeadersAndExtensions, UNKNOWN_CLIENT_IP, client_metadata, extract_client_ip};
pub use middleware::{Auth, Client, require_auth};
pub use state::HasAuthBackend;
