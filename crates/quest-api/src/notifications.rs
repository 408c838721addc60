use axum::{Extension, Json, extract::State};

use quest_db::models::NotificationRow;
use quest_types::api::{
    IdParam, MessageResponse, NotificationQuery, Page, UnreadCount, UpdatedCount,
};
use quest_types::models::Notification;

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::pagination::Pagination;
use crate::state::{AppState, run_db};
use crate::validation::{ValidPath, ValidQuery};

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidQuery(query): ValidQuery<NotificationQuery>,
) -> ApiResult<Json<Page<Notification>>> {
    let paging = Pagination::new(query.page, query.limit);
    let unread_only = query.unread.unwrap_or(false);

    let (rows, total) = run_db(&state, move |db| {
        db.list_notifications(&user.id, unread_only, paging.offset(), paging.limit)
    })
    .await?;

    let notifications = rows.iter().map(NotificationRow::to_notification).collect();
    Ok(Json(paging.wrap(notifications, total)))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<UnreadCount>> {
    let count = run_db(&state, move |db| db.unread_notification_count(&user.id)).await?;
    Ok(Json(UnreadCount { count }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidPath(param): ValidPath<IdParam>,
) -> ApiResult<Json<MessageResponse>> {
    let marked = run_db(&state, move |db| db.mark_notification_read(&param.id, &user.id)).await?;
    if !marked {
        return Err(ApiError::not_found("Notification"));
    }
    Ok(Json(MessageResponse::new("Notification marked as read")))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<UpdatedCount>> {
    let updated = run_db(&state, move |db| db.mark_all_notifications_read(&user.id)).await?;
    Ok(Json(UpdatedCount { updated }))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidPath(param): ValidPath<IdParam>,
) -> ApiResult<Json<MessageResponse>> {
    let deleted = run_db(&state, move |db| db.delete_notification(&param.id, &user.id)).await?;
    if !deleted {
        return Err(ApiError::not_found("Notification"));
    }
    Ok(Json(MessageResponse::new("Notification deleted")))
}
