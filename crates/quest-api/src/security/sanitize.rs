//! Input sanitization: operator-key stripping, HTML escaping and a body cap.

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use super::replace_query;
use crate::error::ApiError;

pub const MAX_BODY_BYTES: usize = 10 * 1024;

/// Keys that could smuggle query operators (`$gt`) or nested paths (`a.b`).
pub fn is_forbidden_key(key: &str) -> bool {
    key.starts_with('$') || key.contains('.')
}

/// Remove forbidden keys at every depth.
pub fn strip_operator_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !is_forbidden_key(key));
            map.values_mut().for_each(strip_operator_keys);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_operator_keys),
        _ => {}
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            other => out.push(other),
        }
    }
    out
}

/// HTML-escape every string value. Keys are left alone.
pub fn escape_strings(value: &mut Value) {
    match value {
        Value::String(s) => *s = escape_html(s),
        Value::Object(map) => map.values_mut().for_each(escape_strings),
        Value::Array(items) => items.iter_mut().for_each(escape_strings),
        _ => {}
    }
}

/// Clean a JSON body. `None` when the bytes are not JSON; the body parser
/// downstream reports that.
pub fn sanitize_body(raw: &[u8]) -> Option<Vec<u8>> {
    let mut value: Value = serde_json::from_slice(raw).ok()?;
    strip_operator_keys(&mut value);
    escape_strings(&mut value);
    serde_json::to_vec(&value).ok()
}

/// Drop query pairs with forbidden keys, including bracketed segments like
/// `filter[$ne]`. `None` when nothing was removed.
pub fn sanitize_query(query: &str) -> Option<String> {
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    let kept: Vec<&(String, String)> = pairs
        .iter()
        .filter(|(key, _)| !key.split(['[', ']']).any(is_forbidden_key))
        .collect();
    if kept.len() == pairs.len() {
        return None;
    }
    let mut out = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in kept {
        out.append_pair(key, value);
    }
    Some(out.finish())
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

pub async fn sanitize(req: Request, next: Next) -> Result<Response, ApiError> {
    let (mut parts, body) = req.into_parts();

    if let Some(clean) = parts.uri.query().and_then(sanitize_query) {
        parts.uri = replace_query(&parts.uri, &clean)?;
    }

    if declared_length(&parts.headers).is_some_and(|len| len > MAX_BODY_BYTES) {
        return Err(ApiError::PayloadTooLarge(MAX_BODY_BYTES));
    }
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ApiError::PayloadTooLarge(MAX_BODY_BYTES))?;

    let bytes = match is_json(&parts.headers).then(|| sanitize_body(&bytes)).flatten() {
        Some(clean) => {
            parts
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(clean.len()));
            Bytes::from(clean)
        }
        None => bytes,
    };

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}
