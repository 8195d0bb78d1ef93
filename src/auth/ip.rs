//! Client IP and user agent extraction.

use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{Extensions, HeaderMap, header, request::Parts},
};

use crate::lifecycle::ClientMetadata;

/// Recorded when no client address can be determined.
pub const UNKNOWN_CLIENT_IP: &str = "unknown";

/// Trait for types that provide access to HTTP headers and extensions.
/// Implemented for both `Parts` and `Request` to allow flexible IP extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &HeaderMap;
    fn extensions(&self) -> &Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Extract the client IP address.
///
/// With `trust_forwarded_for`, the first entry of `X-Forwarded-For` wins.
/// Otherwise, or when that header is absent, the socket address from
/// `ConnectInfo` is used.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    trust_forwarded_for: bool,
) -> Option<String> {
    if trust_forwarded_for {
        let forwarded = source
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return Some(ip.to_string());
        }
    }

    source
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

/// Client details recorded on a new session.
pub fn client_metadata<T: HasHeadersAndExtensions>(
    source: &T,
    trust_forwarded_for: bool,
) -> ClientMetadata {
    let user_agent = source
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    ClientMetadata {
        user_agent,
        client_ip: extract_client_ip(source, trust_forwarded_for)
            .unwrap_or_else(|| UNKNOWN_CLIENT_IP.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};

    fn request(headers: &[(&str, &str)], addr: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        if let Some(addr) = addr {
            let addr: SocketAddr = addr.parse().unwrap();
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    #[test]
    fn test_connect_info_used_by_default() {
        let req = request(&[("x-forwarded-for", "10.0.0.1")], Some("192.168.1.5:4000"));
        assert_eq!(extract_client_ip(&req, false).as_deref(), Some("192.168.1.5"));
    }

    #[test]
    fn test_forwarded_for_when_trusted() {
        let req = request(
            &[("x-forwarded-for", "10.0.0.1, 172.16.0.1")],
            Some("192.168.1.5:4000"),
        );
        assert_eq!(extract_client_ip(&req, true).as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_metadata_without_address() {
        let req = request(&[("user-agent", "curl/8.0")], None);
        let meta = client_metadata(&req, false);
        assert_eq!(meta.user_agent, "curl/8.0");
        assert_eq!(meta.client_ip, UNKNOWN_CLIENT_IP);
    }
}
