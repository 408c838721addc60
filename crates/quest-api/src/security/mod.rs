//! The ordered security filter chain.
//!
//! Outermost first: header hardening, CORS, general rate limit, auth rate
//! limit, sanitization, parameter pollution guard. CORS sits outside the
//! filters that reject requests, so 429 and 413 replies stay readable from
//! the browser. Preflights are answered there and skip the rate limits.

pub mod cors;
pub mod headers;
pub mod pollution;
pub mod rate_limit;
pub mod sanitize;

use axum::{
    Router,
    http::{Uri, uri::PathAndQuery},
    middleware::{from_fn, from_fn_with_state},
};

use crate::error::ApiError;
use crate::state::AppState;

/// Wrap `router` in the security chain. Add routes and the fallback first.
pub fn apply(router: Router, state: &AppState) -> Router {
    // The last layer added runs first
    router
        .layer(from_fn(pollution::pollution_guard))
        .layer(from_fn(sanitize::sanitize))
        .layer(from_fn_with_state(state.clone(), rate_limit::auth_rate_limit))
        .layer(from_fn_with_state(state.clone(), rate_limit::general_rate_limit))
        .layer(cors::cors_layer(&state.config.frontend_url))
        .layer(from_fn_with_state(
            state.config.is_production(),
            headers::security_headers,
        ))
}

/// Same URI with its query string replaced.
pub(crate) fn replace_query(uri: &Uri, query: &str) -> Result<Uri, ApiError> {
    let path_and_query = if query.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), query)
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        PathAndQuery::try_from(path_and_query)
            .map_err(|e| ApiError::BadRequest(format!("Invalid query string: {e}")))?,
    );
    Uri::from_parts(parts).map_err(|e| ApiError::BadRequest(format!("Invalid request URI: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_query_keeps_the_path() {
        let uri: Uri = "/api/v1/tasks?a=1&a=2".parse().unwrap();
        assert_eq!(replace_query(&uri, "a=2").unwrap(), "/api/v1/tasks?a=2");
        assert_eq!(replace_query(&uri, "").unwrap(), "/api/v1/tasks");
    }
}
