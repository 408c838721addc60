use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, header},
    middleware::Next,
    response::Response,
};

pub const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; img-src 'self' data: https:; \
                                           font-src 'self' https:; style-src 'self' 'unsafe-inline' https:;";

const HSTS: &str = "max-age=15552000; includeSubDomains";

/// Headers stamped on every response. HSTS only in production.
pub fn hardening_headers(production: bool) -> Vec<(HeaderName, HeaderValue)> {
    let mut headers = vec![
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")),
        (
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ),
    ];
    if production {
        headers.push((header::STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS)));
    }
    headers
}

pub fn harden(headers: &mut HeaderMap, production: bool) {
    for (name, value) in hardening_headers(production) {
        headers.insert(name, value);
    }
}

pub async fn security_headers(
    State(production): State<bool>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;
    harden(response.headers_mut(), production);
    response
}
