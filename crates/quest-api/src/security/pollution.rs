use axum::{extract::Request, middleware::Next, response::Response};

use super::replace_query;
use crate::error::ApiError;

/// Query keys allowed to repeat.
pub const REPEATABLE: &[&str] = &["sort", "page", "limit", "fields", "status", "priority"];

/// Collapse repeated query keys to their last value, except [`REPEATABLE`]
/// ones. `None` when the query is already clean.
pub fn dedupe_query(query: &str) -> Option<String> {
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();

    let kept: Vec<&(String, String)> = pairs
        .iter()
        .enumerate()
        .filter(|(i, (key, _))| {
            REPEATABLE.iter().any(|k| *k == key.as_str())
                || !pairs[i + 1..].iter().any(|(later, _)| later == key)
        })
        .map(|(_, pair)| pair)
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

pub async fn pollution_guard(mut req: Request, next: Next) -> Result<Response, ApiError> {
    if let Some(clean) = req.uri().query().and_then(dedupe_query) {
        let uri = replace_query(req.uri(), &clean)?;
        *req.uri_mut() = uri;
    }
    Ok(next.run(req).await)
}
