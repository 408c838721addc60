use axum::{Extension, Json, extract::State, http::StatusCode};
use serde_json::json;
use tracing::info;

use quest_db::FriendRequestOutcome;
use quest_db::models::parse_ts;
use quest_types::api::{
    FriendRequestCreate, FriendRequestCreated, IdParam, MessageResponse, UserIdParam,
};
use quest_types::ids::new_object_id;
use quest_types::models::{FriendRequest, NotificationKind, PublicProfile};

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::notify::{NewNotification, notify};
use crate::rewards::award_badges;
use crate::state::{AppState, run_db};
use crate::users::profile;
use crate::validation::{ValidJson, ValidPath};

pub async fn send_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidJson(req): ValidJson<FriendRequestCreate>,
) -> ApiResult<(StatusCode, Json<FriendRequestCreated>)> {
    if req.user_id == user.id {
        return Err(ApiError::BadRequest(
            "You cannot send a friend request to yourself".into(),
        ));
    }

    let (id, me, target) = (new_object_id(), user.id.clone(), req.user_id.clone());
    let outcome = run_db(&state, move |db| {
        if db.get_user_by_id(&target)?.filter(|u| u.active).is_none() {
            return Ok(None);
        }
        db.request_friendship(&id, &me, &target).map(Some)
    })
    .await?;

    let request = match outcome {
        None => return Err(ApiError::not_found("User")),
        Some(FriendRequestOutcome::Created(request)) => request,
        Some(FriendRequestOutcome::Exists(existing)) => {
            let message = if existing.is_pending() {
                "A friend request between you already exists"
            } else {
                "You are already friends"
            };
            return Err(ApiError::Conflict(message.into()));
        }
    };

    notify(
        &state,
        NewNotification {
            recipient_id: request.recipient_id.clone(),
            kind: NotificationKind::FriendRequest,
            title: "New friend request".into(),
            message: format!("{} sent you a friend request", user.name),
            metadata: json!({ "requestId": request.id, "requesterId": user.id }),
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(FriendRequestCreated {
            id: request.id,
            recipient_id: request.recipient_id,
            status: request.status,
        }),
    ))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<FriendRequest>>> {
    let requests = run_db(&state, move |db| {
        db.incoming_friend_requests(&user.id)?
            .iter()
            .map(|(request, requester)| {
                Ok(FriendRequest {
                    id: request.id.clone(),
                    requester: profile(db, requester)?,
                    created_at: parse_ts(&request.created_at),
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;

    Ok(Json(requests))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidPath(param): ValidPath<IdParam>,
) -> ApiResult<Json<MessageResponse>> {
    let id = param.id.clone();
    let request = run_db(&state, move |db| db.get_friendship(&id))
        .await?
        .filter(|f| f.recipient_id == user.id)
        .ok_or_else(|| ApiError::not_found("Friend request"))?;
    if !request.is_pending() {
        return Err(ApiError::Conflict("Friend request already accepted".into()));
    }

    let id = request.id.clone();
    if !run_db(&state, move |db| db.accept_friendship(&id)).await? {
        return Err(ApiError::Conflict("Friend request already accepted".into()));
    }
    info!("{} accepted friend request from {}", user.id, request.requester_id);

    notify(
        &state,
        NewNotification {
            recipient_id: request.requester_id.clone(),
            kind: NotificationKind::FriendAccepted,
            title: "Friend request accepted".into(),
            message: format!("{} accepted your friend request", user.name),
            metadata: json!({ "friendId": user.id }),
        },
    )
    .await?;

    award_badges(&state, &user.id).await?;
    award_badges(&state, &request.requester_id).await?;

    Ok(Json(MessageResponse::new("Friend request accepted")))
}

/// The recipient declines, or the requester withdraws.
pub async fn delete_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidPath(param): ValidPath<IdParam>,
) -> ApiResult<Json<MessageResponse>> {
    let me = user.id.clone();
    let deleted = run_db(&state, move |db| {
        let Some(request) = db.get_friendship(&param.id)? else {
            return Ok(false);
        };
        let involved = request.requester_id == me || request.recipient_id == me;
        if !request.is_pending() || !involved {
            return Ok(false);
        }
        db.delete_friendship(&request.id)
    })
    .await?;

    if !deleted {
        return Err(ApiError::not_found("Friend request"));
    }
    Ok(Json(MessageResponse::new("Friend request removed")))
}

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<PublicProfile>>> {
    let friends = run_db(&state, move |db| {
        db.friends_of(&user.id)?
            .iter()
            .map(|friend| profile(db, friend))
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;

    Ok(Json(friends))
}

pub async fn remove_friend(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidPath(param): ValidPath<UserIdParam>,
) -> ApiResult<Json<MessageResponse>> {
    let removed = run_db(&state, move |db| db.remove_friend(&user.id, &param.user_id)).await?;
    if !removed {
        return Err(ApiError::not_found("Friend"));
    }
    Ok(Json(MessageResponse::new("Friend removed")))
}
