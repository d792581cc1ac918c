//! CORS middleware
//!
//! The widget is embedded into arbitrary third-party pages, so every
//! feedback endpoint answers with permissive CORS headers; the real
//! access control is the API-key/domain trust table, not the origin.

use axum::{
    body::Body,
    http::{header::HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

/// Allowed request headers, including the widget auth/identity set.
pub const ALLOWED_HEADERS: &str = "Content-Type, Authorization, X-API-Key, X-Origin-Domain, \
X-GitHub-Repo, X-User-Name, X-User-Contact";

/// Preflight cache lifetime: 24 hours.
pub const MAX_AGE_SECS: &str = "86400";

/// Append permissive CORS headers to every response.
pub async fn cors_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    response
}
