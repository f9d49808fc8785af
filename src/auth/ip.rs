//! Client IP extraction utilities.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Trait for types that provide access to HTTP headers and extensions.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl<B> HasHeadersAndExtensions for axum::http::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::http::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::http::Request::extensions(self)
    }
}

/// Extract the client IP address.
///
/// With `trust_forwarded_for`, the last `X-Forwarded-For` entry is used: it is
/// the one the trusted proxy appended, while earlier entries come from the
/// client. A missing header is an error (no fallback to the socket address,
/// which would be the proxy's). Otherwise the address comes from `ConnectInfo`.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    trust_forwarded_for: bool,
) -> Result<String, &'static str> {
    if trust_forwarded_for {
        let value = source
            .headers()
            .get(FORWARDED_FOR)
            .ok_or("IP header not present")?
            .to_str()
            .map_err(|_| "IP header contains invalid characters")?;
        let last = value.rsplit(',').next().unwrap_or_default().trim();
        if last.is_empty() {
            return Err("IP header is empty");
        }
        return Ok(last.to_string());
    }

    source
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .ok_or("No client IP available")
}
