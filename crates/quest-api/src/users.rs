use axum::{Extension, Json, extract::State};

use quest_db::Database;
use quest_db::models::UserRow;
use quest_types::api::{
    IdParam, LeaderboardEntry, LeaderboardQuery, Page, UpdateProfileRequest, UserSearchQuery,
};
use quest_types::models::{PublicProfile, User};

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::pagination::Pagination;
use crate::state::{AppState, run_db};
use crate::validation::{ValidJson, ValidPath, ValidQuery};

const DEFAULT_LEADERBOARD_SIZE: u32 = 10;

/// Public profile with the user's badges attached.
pub(crate) fn profile(db: &Database, user: &UserRow) -> anyhow::Result<PublicProfile> {
    let badges = db
        .badges_for_user(&user.id)?
        .iter()
        .filter_map(|row| row.to_award())
        .collect();
    Ok(user.to_profile(badges))
}

pub async fn list_users(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<UserSearchQuery>,
) -> ApiResult<Json<Page<PublicProfile>>> {
    let paging = Pagination::new(query.page, query.limit);
    let (profiles, total) = run_db(&state, move |db| {
        let (rows, total) =
            db.search_users(query.search.as_deref(), false, paging.offset(), paging.limit)?;
        let profiles = rows
            .iter()
            .map(|row| profile(db, row))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok((profiles, total))
    })
    .await?;

    Ok(Json(paging.wrap(profiles, total)))
}

pub async fn get_user(
    State(state): State<AppState>,
    ValidPath(param): ValidPath<IdParam>,
) -> ApiResult<Json<PublicProfile>> {
    let found = run_db(&state, move |db| {
        db.get_user_by_id(&param.id)?
            .filter(|user| user.active)
            .map(|user| profile(db, &user))
            .transpose()
    })
    .await?;

    found.map(Json).ok_or_else(|| ApiError::not_found("User"))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidJson(req): ValidJson<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    let updated = run_db(&state, move |db| {
        db.update_profile(
            &user.id,
            req.name.as_deref(),
            req.bio.as_deref(),
            req.avatar.as_deref(),
        )
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(updated.to_user()))
}

pub async fn leaderboard(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<LeaderboardQuery>,
) -> ApiResult<Json<Vec<LeaderboardEntry>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LEADERBOARD_SIZE);
    let entries = run_db(&state, move |db| {
        db.leaderboard(limit)?
            .iter()
            .zip(1..)
            .map(|(row, rank)| {
                Ok(LeaderboardEntry {
                    rank,
                    user: profile(db, row)?,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;

    Ok(Json(entries))
}
