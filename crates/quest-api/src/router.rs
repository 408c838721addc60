use axum::{
    Json, Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post},
};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::middleware::{require_admin, require_auth};
use crate::state::AppState;
use crate::{admin, auth, friends, notifications, security, tasks, users, ws};

/// The whole HTTP surface: `/health`, `/ws` and everything under `/api/v1`,
/// wrapped in the security chain.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password/{token}", post(auth::reset_password));

    let admin_routes = Router::new()
        .route("/admin/stats", get(admin::stats))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{id}", patch(admin::update_user))
        .route("/admin/announcements", post(admin::announce))
        .route_layer(from_fn(require_admin));

    let protected = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/password", patch(auth::change_password))
        .route("/users", get(users::list_users))
        .route("/users/me", patch(users::update_me))
        .route("/users/{id}", get(users::get_user))
        .route("/leaderboard", get(users::leaderboard))
        .route("/tasks", post(tasks::create_task).get(tasks::list_tasks))
        .route(
            "/tasks/{id}",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/tasks/{id}/complete", post(tasks::complete_task))
        .route("/friends", get(friends::list_friends))
        .route("/friends/{userId}", delete(friends::remove_friend))
        .route(
            "/friends/requests",
            post(friends::send_request).get(friends::list_requests),
        )
        .route("/friends/requests/{id}", delete(friends::delete_request))
        .route("/friends/requests/{id}/accept", post(friends::accept_request))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", patch(notifications::mark_all_read))
        .route("/notifications/{id}/read", patch(notifications::mark_read))
        .route("/notifications/{id}", delete(notifications::delete_notification))
        .merge(admin_routes)
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let app = Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::ws_upgrade))
        .nest("/api/v1", public.merge(protected))
        .fallback(not_found)
        .with_state(state.clone());

    security::apply(app, &state).layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Route not found".into())
}
