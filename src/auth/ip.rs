//! Client IP extraction utilities.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::ConnectInfo,
    http::{HeaderName, request::Parts},
};

/// Key shared by every request whose origin cannot be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Trait for types that provide access to HTTP headers and extensions.
/// Implemented for both `Parts` and `Request` to allow flexible IP extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &axum::http::HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &axum::http::Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Header a trusted reverse proxy sets to the real client address.
///
/// Only configure this when every request passes through such a proxy;
/// otherwise clients can pick their own rate limit key.
#[derive(Debug, Clone)]
pub struct IpExtractor {
    header_name: HeaderName,
}

impl IpExtractor {
    pub fn new(header_name: &str) -> Result<Self, String> {
        let header_name = HeaderName::from_bytes(header_name.trim().as_bytes())
            .map_err(|_| format!("Invalid header name: {}", header_name))?;
        Ok(Self { header_name })
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }

    /// First comma-separated entry, if it parses as an IP address.
    fn extract(&self, value: &str) -> Option<String> {
        let first = value.split(',').next()?.trim();
        first.parse::<IpAddr>().ok().map(|ip| ip.to_string())
    }
}

/// Extract the client IP.
///
/// With an `ip_extractor`, the configured header wins when it holds a valid
/// address. Otherwise the socket address from `ConnectInfo` is used, then
/// [`UNKNOWN_CLIENT`].
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    ip_extractor: Option<&IpExtractor>,
) -> String {
    let forwarded = ip_extractor.and_then(|extractor| {
        source
            .headers()
            .get(extractor.header_name())
            .and_then(|value| value.to_str().ok())
            .and_then(|value| extractor.extract(value))
    });

    if let Some(ip) = forwarded {
        return ip;
    }

    source
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
