use axum::http::{HeaderName, HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

pub const ALLOWED_METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];
pub const ALLOWED_HEADERS: [HeaderName; 2] = [header::CONTENT_TYPE, header::AUTHORIZATION];

/// Cross-origin policy for the configured frontend. `*` mirrors the caller's
/// origin so credentials stay allowed.
pub fn cors_layer(frontend_url: &str) -> CorsLayer {
    let origin = if frontend_url == "*" {
        AllowOrigin::mirror_request()
    } else {
        match HeaderValue::from_str(frontend_url) {
            Ok(origin) => AllowOrigin::exact(origin),
            Err(_) => {
                warn!("FRONTEND_URL {:?} is not a valid header value, allowing any origin", frontend_url);
                AllowOrigin::mirror_request()
            }
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(ALLOWED_HEADERS)
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        response::Response,
        routing::get,
    };
    use tower::ServiceExt;

    async fn send(frontend_url: &str, method: Method, origin: &str) -> Response {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(cors_layer(frontend_url));
        let req = Request::builder()
            .method(method)
            .uri("/")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PATCH")
            .body(Body::empty())
            .unwrap();
        app.oneshot(req).await.unwrap()
    }

    #[tokio::test]
    async fn preflight_is_empty_200_with_policy_headers() {
        let response = send("https://app.example.com", Method::OPTIONS, "https://app.example.com").await;
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.example.com");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
        assert!(methods.contains("PATCH") && methods.contains("DELETE"));
        let allowed = headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
            .to_str()
            .unwrap()
            .to_ascii_lowercase();
        assert!(allowed.contains("content-type") && allowed.contains("authorization"));
    }

    #[tokio::test]
    async fn wildcard_mirrors_the_caller() {
        let response = send("*", Method::GET, "http://localhost:3000").await;
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn configured_origin_is_fixed() {
        let response = send("https://app.example.com", Method::GET, "https://evil.example.com").await;
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example.com"
        );
    }

    #[tokio::test]
    async fn invalid_origin_falls_back_to_mirroring() {
        let response = send("bad\norigin", Method::GET, "http://localhost:3000").await;
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
    }
}
