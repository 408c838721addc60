use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        rejection::QueryRejection,
        ws::rejection::WebSocketUpgradeRejection,
    },
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::warn;

use quest_gateway::connection;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, run_db};
use crate::token::extract_bearer;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Authenticate, then upgrade. A bad token is a 401 before any upgrade
/// handshake is considered.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<WsQuery>, QueryRejection>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> ApiResult<Response> {
    let from_query = query.ok().and_then(|Query(q)| q.token).filter(|t| !t.is_empty());
    let token = match from_query {
        Some(token) => token,
        None => {
            let header = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());
            extract_bearer(header)
                .map(str::to_string)
                .ok_or_else(|| ApiError::Unauthorized("No token provided".into()))?
        }
    };

    let claims = state.tokens.verify_access(&token).map_err(|e| {
        warn!("Rejected gateway token: {}", e);
        ApiError::Unauthorized(e.to_string())
    })?;
    let id = claims.id;
    let user = run_db(&state, move |db| db.get_user_by_id(&id))
        .await?
        .filter(|user| user.active)
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists or is deactivated".into()))?;

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let dispatcher = state.dispatcher.clone();
    Ok(upgrade.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, user.id)))
}
