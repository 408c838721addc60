use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use quest_db::models::UserRow;
use quest_types::models::Role;

use crate::error::ApiError;
use crate::state::{AppState, run_db};
use crate::token::extract_bearer;

/// The authenticated caller, inserted into request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&UserRow> for AuthUser {
    fn from(user: &UserRow) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role(),
        }
    }
}

/// Verify the bearer access token and load the account behind it.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = extract_bearer(header)
        .ok_or_else(|| ApiError::Unauthorized("No token provided".into()))?;

    let claims = state.tokens.verify_access(token).map_err(|e| {
        warn!("Rejected access token on {}: {}", req.uri().path(), e);
        ApiError::Unauthorized(e.to_string())
    })?;

    let user_id = claims.id;
    let user = run_db(&state, move |db| db.get_user_by_id(&user_id))
        .await?
        .filter(|user| user.active)
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists or is deactivated".into()))?;

    req.extensions_mut().insert(AuthUser::from(&user));
    Ok(next.run(req).await)
}

/// Must run inside [`require_auth`].
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    let is_admin = req
        .extensions()
        .get::<AuthUser>()
        .is_some_and(AuthUser::is_admin);
    if !is_admin {
        return Err(ApiError::Forbidden("Admin access required".into()));
    }
    Ok(next.run(req).await)
}
