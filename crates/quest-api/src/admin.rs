use axum::{Extension, Json, extract::State, http::StatusCode};
use serde_json::json;
use tracing::{info, warn};

use quest_types::api::{
    AdminStats, AdminUpdateUserRequest, AnnouncementRequest, AnnouncementResponse, IdParam,
    Page, StatusCount, UserSearchQuery,
};
use quest_types::models::{NotificationKind, Role, User};

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::notify::{NewNotification, notify};
use crate::pagination::Pagination;
use crate::state::{AppState, run_db};
use crate::users::profile;
use crate::validation::{ValidJson, ValidPath, ValidQuery};

const TOP_USERS: u32 = 5;

pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<AdminStats>> {
    let (row, top_users) = run_db(&state, |db| {
        let row = db.admin_stats()?;
        let top_users = db
            .leaderboard(TOP_USERS)?
            .iter()
            .map(|user| profile(db, user))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok((row, top_users))
    })
    .await?;

    let tasks_by_status = row
        .tasks_by_status
        .iter()
        .filter_map(|(status, count)| {
            let status = status.parse().ok()?;
            Some(StatusCount {
                status,
                count: *count as u64,
            })
        })
        .collect();

    Ok(Json(AdminStats {
        total_users: row.total_users as u64,
        active_users: row.active_users as u64,
        admins: row.admins as u64,
        online_users: state.dispatcher.online_user_count().await as u64,
        total_tasks: row.total_tasks as u64,
        completed_tasks: row.completed_tasks as u64,
        points_awarded: row.points_awarded,
        friendships: row.friendships as u64,
        unread_notifications: row.unread_notifications as u64,
        tasks_by_status,
        top_users,
    }))
}

/// Unlike the public directory, this includes deactivated accounts.
pub async fn list_users(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<UserSearchQuery>,
) -> ApiResult<Json<Page<User>>> {
    let paging = Pagination::new(query.page, query.limit);
    let (rows, total) = run_db(&state, move |db| {
        db.search_users(query.search.as_deref(), true, paging.offset(), paging.limit)
    })
    .await?;

    let users = rows.iter().map(|row| row.to_user()).collect();
    Ok(Json(paging.wrap(users, total)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    ValidPath(param): ValidPath<IdParam>,
    ValidJson(req): ValidJson<AdminUpdateUserRequest>,
) -> ApiResult<Json<User>> {
    if param.id == admin.id {
        if req.role.is_some_and(|role| role != Role::Admin) {
            return Err(ApiError::BadRequest("You cannot demote yourself".into()));
        }
        if req.active == Some(false) {
            return Err(ApiError::BadRequest("You cannot deactivate yourself".into()));
        }
    }

    let id = param.id.clone();
    let updated = run_db(&state, move |db| db.admin_update_user(&id, req.role, req.active))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    info!(
        "{} updated user {} (role={}, active={})",
        admin.id,
        updated.id,
        updated.role,
        updated.active
    );
    Ok(Json(updated.to_user()))
}

/// Persist and push an announcement to one user, or to every active user.
pub async fn announce(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    ValidJson(req): ValidJson<AnnouncementRequest>,
) -> ApiResult<(StatusCode, Json<AnnouncementResponse>)> {
    let recipient = req.recipient_id.clone();
    let recipients = run_db(&state, move |db| match recipient {
        Some(id) => Ok(db
            .get_user_by_id(&id)?
            .filter(|user| user.active)
            .map(|user| vec![user.id])
            .unwrap_or_default()),
        None => db.active_user_ids(),
    })
    .await?;

    if recipients.is_empty() && req.recipient_id.is_some() {
        return Err(ApiError::not_found("User"));
    }

    let mut delivered_live = 0;
    for recipient_id in &recipients {
        let result = notify(
            &state,
            NewNotification {
                recipient_id: recipient_id.clone(),
                kind: NotificationKind::Announcement,
                title: req.title.clone(),
                message: req.message.clone(),
                metadata: json!({ "from": admin.id }),
            },
        )
        .await;
        match result {
            Ok(reached) => delivered_live += reached as u64,
            Err(e) => warn!("Announcement to {} failed: {}", recipient_id, e),
        }
    }
    info!(
        "{} announced \"{}\" to {} users ({} live connections)",
        admin.id,
        req.title,
        recipients.len(),
        delivered_live
    );

    Ok((
        StatusCode::CREATED,
        Json(AnnouncementResponse {
            kind: NotificationKind::Announcement,
            recipients: recipients.len() as u64,
            delivered_live,
        }),
    ))
}
