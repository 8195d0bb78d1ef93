//! Cookie and header transport for tokens.

use axum::http::{HeaderMap, HeaderValue, header};

use crate::lifecycle::IssuedTokens;

/// Cookie name for the access token.
pub const ACCESS_COOKIE_NAME: &str = "Authorization";

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "Refresh";

/// Header carrying `Bearer <refresh token>` when cookies are unavailable.
pub const REFRESH_HEADER: &str = "refresh";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Token from a `Bearer <token>` header value.
fn bearer<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let value = headers.get(name)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Access token from the `Authorization` cookie, falling back to the
/// `Authorization: Bearer` header.
pub fn access_token(headers: &HeaderMap) -> Option<&str> {
    get_cookie(headers, ACCESS_COOKIE_NAME)
        .filter(|t| !t.is_empty())
        .or_else(|| bearer(headers, header::AUTHORIZATION.as_str()))
}

/// Refresh token from the `Refresh` cookie, falling back to the
/// `Refresh: Bearer` header.
pub fn refresh_token(headers: &HeaderMap) -> Option<&str> {
    get_cookie(headers, REFRESH_COOKIE_NAME)
        .filter(|t| !t.is_empty())
        .or_else(|| bearer(headers, REFRESH_HEADER))
}

fn secure_suffix(secure: bool) -> &'static str {
    if secure { "; Secure" } else { "" }
}

/// Build a Set-Cookie value for a token.
pub fn token_cookie(name: &str, token: &str, max_age: u64, secure: bool) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{}",
        name,
        token,
        max_age,
        secure_suffix(secure)
    )
}

/// Build a Set-Cookie value that removes a cookie.
pub fn clear_cookie(name: &str, secure: bool) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0{}",
        name,
        secure_suffix(secure)
    )
}

/// Append both token cookies for a freshly issued pair.
pub fn set_token_cookies(headers: &mut HeaderMap, issued: &IssuedTokens, secure: bool) {
    let access = token_cookie(
        ACCESS_COOKIE_NAME,
        &issued.access_token,
        issued.access.lifetime_secs(),
        secure,
    );
    let refresh = token_cookie(
        REFRESH_COOKIE_NAME,
        &issued.refresh_token,
        issued.refresh.lifetime_secs(),
        secure,
    );

    for cookie in [access, refresh] {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.append(header::SET_COOKIE, value);
        }
    }
}

/// Append cookies clearing both tokens.
pub fn clear_token_cookies(headers: &mut HeaderMap, secure: bool) {
    for name in [ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME] {
        if let Ok(value) = HeaderValue::from_str(&clear_cookie(name, secure)) {
            headers.append(header::SET_COOKIE, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_cookie_multiple() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=bar; Authorization=abc123; Refresh=xyz789"),
        );

        assert_eq!(get_cookie(&headers, "Authorization"), Some("abc123"));
        assert_eq!(get_cookie(&headers, "Refresh"), Some("xyz789"));
        assert_eq!(get_cookie(&headers, "foo"), Some("bar"));
        assert_eq!(get_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_get_cookie_with_spaces() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("  Authorization = abc123  ; foo=bar"),
        );

        assert_eq!(get_cookie(&headers, "Authorization"), Some("abc123"));
    }

    #[test]
    fn test_cookie_takes_precedence_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("Authorization=cookie"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer header"));

        assert_eq!(access_token(&headers), Some("cookie"));
    }

    #[test]
    fn test_bearer_header_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer access"));
        headers.insert("Refresh", HeaderValue::from_static("Bearer refresh"));

        assert_eq!(access_token(&headers), Some("access"));
        assert_eq!(refresh_token(&headers), Some("refresh"));
    }

    #[test]
    fn test_non_bearer_header_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        headers.insert("Refresh", HeaderValue::from_static("Bearer "));

        assert_eq!(access_token(&headers), None);
        assert_eq!(refresh_token(&headers), None);
    }

    #[test]
    fn test_cookie_formats() {
        assert_eq!(
            token_cookie(ACCESS_COOKIE_NAME, "tok", 900, false),
            "Authorization=tok; HttpOnly; SameSite=Strict; Path=/; Max-Age=900"
        );
        assert_eq!(
            clear_cookie(REFRESH_COOKIE_NAME, true),
            "Refresh=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0; Secure"
        );
    }
}
