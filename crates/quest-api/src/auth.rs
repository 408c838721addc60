use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode};
use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use quest_db::models::{NewUser, UserRow, fmt_ts};
use quest_types::api::{
    AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, ForgotPasswordResponse,
    LoginRequest, MessageResponse, RefreshRequest, RegisterRequest, ResetPasswordRequest,
    ResetTokenParam,
};
use quest_types::ids::new_object_id;
use quest_types::models::{Role, User};

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::state::{AppState, run_db};
use crate::token::Subject;
use crate::validation::{ValidJson, ValidPath};

const RESET_TOKEN_TTL_MINUTES: i64 = 10;
const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account with that email exists, a password reset token has been sent";

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Reset tokens are stored as SHA-256 hex digests, never in the clear.
pub fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn new_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn session(state: &AppState, user: &UserRow) -> ApiResult<AuthResponse> {
    let pair = state.tokens.issue_pair(&Subject::from(user))?;
    Ok(AuthResponse {
        user: user.to_user(),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    })
}

async fn load_user(state: &AppState, id: &str) -> ApiResult<UserRow> {
    let id = id.to_string();
    run_db(state, move |db| db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

fn email_taken() -> ApiError {
    ApiError::Conflict("An account with this email already exists".into())
}

pub async fn register(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let email = req.email.clone();
    if run_db(&state, move |db| db.get_user_by_email(&email))
        .await?
        .is_some()
    {
        return Err(email_taken());
    }

    let password_hash = hash_password(&req.password)?;
    let user_id = new_object_id();
    let id = user_id.clone();
    let user = run_db(&state, move |db| {
        let created = db.create_user(&NewUser {
            id: &id,
            name: &req.name,
            email: &req.email,
            password_hash: &password_hash,
            role: Role::User,
        })?;
        if !created {
            return Ok(None);
        }
        db.get_user_by_id(&id)?
            .ok_or_else(|| anyhow::anyhow!("user {id} missing after insert"))
            .map(Some)
    })
    .await?
    // Lost a race with a concurrent registration for the same email
    .ok_or_else(email_taken)?;

    info!("Registered user {}", user_id);
    Ok((StatusCode::CREATED, Json(session(&state, &user)?)))
}

pub async fn login(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = req.email.clone();
    let user = run_db(&state, move |db| db.get_user_by_email(&email)).await?;

    let Some(mut user) = user.filter(|u| verify_password(&req.password, &u.password)) else {
        warn!("Failed login for {}", req.email);
        return Err(ApiError::Unauthorized("Invalid email or password".into()));
    };
    if !user.active {
        return Err(ApiError::Unauthorized("Account is deactivated".into()));
    }

    let now = Utc::now();
    let id = user.id.clone();
    run_db(&state, move |db| db.record_login(&id, now)).await?;
    user.last_login = Some(fmt_ts(now));

    Ok(Json(session(&state, &user)?))
}

pub async fn refresh(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RefreshRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let invalid = || ApiError::Unauthorized("Invalid or expired refresh token".into());

    let claims = state
        .tokens
        .verify_refresh(&req.refresh_token)
        .map_err(|_| invalid())?;
    let id = claims.id.clone();
    let user = run_db(&state, move |db| db.get_user_by_id(&id))
        .await?
        .filter(|u| u.active && u.token_version == claims.token_version)
        .ok_or_else(invalid)?;

    Ok(Json(session(&state, &user)?))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<MessageResponse>> {
    let id = user.id.clone();
    run_db(&state, move |db| db.bump_token_version(&id)).await?;
    info!("{} logged out", user.id);
    Ok(Json(MessageResponse::new("Logged out successfully")))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<User>> {
    Ok(Json(load_user(&state, &user.id).await?.to_user()))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ForgotPasswordRequest>,
) -> ApiResult<Json<ForgotPasswordResponse>> {
    let email = req.email.clone();
    let user = run_db(&state, move |db| db.get_user_by_email(&email))
        .await?
        .filter(|u| u.active);

    let mut reset_token = None;
    if let Some(user) = user {
        let token = new_reset_token();
        let digest = hash_reset_token(&token);
        let expires_at = Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES);
        run_db(&state, move |db| db.set_reset_token(&user.id, &digest, expires_at)).await?;

        // Delivery is external; outside production the token is handed back directly
        if !state.config.is_production() {
            reset_token = Some(token);
        }
    }

    Ok(Json(ForgotPasswordResponse {
        message: FORGOT_PASSWORD_MESSAGE.into(),
        reset_token,
    }))
}

pub async fn reset_password(
    State(state): State<AppState>,
    ValidPath(param): ValidPath<ResetTokenParam>,
    ValidJson(req): ValidJson<ResetPasswordRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let digest = hash_reset_token(&param.token);
    let now = Utc::now();
    let user = run_db(&state, move |db| db.get_user_by_reset_token(&digest, now))
        .await?
        .ok_or_else(|| ApiError::BadRequest("Invalid or expired reset token".into()))?;

    let password_hash = hash_password(&req.password)?;
    let id = user.id.clone();
    run_db(&state, move |db| db.set_password(&id, &password_hash)).await?;

    info!("Password reset for {}", user.id);
    let user = load_user(&state, &user.id).await?;
    Ok(Json(session(&state, &user)?))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    ValidJson(req): ValidJson<ChangePasswordRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let user = load_user(&state, &auth.id).await?;
    if !verify_password(&req.current_password, &user.password) {
        return Err(ApiError::Unauthorized("Current password is incorrect".into()));
    }
    if req.new_password == req.current_password {
        return Err(ApiError::BadRequest(
            "New password must differ from the current password".into(),
        ));
    }

    let password_hash = hash_password(&req.new_password)?;
    let id = user.id.clone();
    run_db(&state, move |db| db.set_password(&id, &password_hash)).await?;

    // Outstanding refresh tokens died with the version bump; hand out a new pair
    let user = load_user(&state, &auth.id).await?;
    Ok(Json(session(&state, &user)?))
}
