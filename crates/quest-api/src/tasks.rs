use axum::{Extension, Json, extract::State, http::StatusCode};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use quest_db::models::{TaskRow, fmt_ts};
use quest_db::{CompleteOutcome, TaskFilter, TaskPatch, TaskSort, UpdateOutcome};
use quest_types::api::{
    CompleteTaskResponse, CreateTaskRequest, IdParam, MessageResponse, Page, TaskQuery,
    UpdateTaskRequest,
};
use quest_types::ids::new_object_id;
use quest_types::models::{
    NotificationKind, Task, TaskPriority, TaskStatus, level_for_points,
};

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::notify::{NewNotification, notify};
use crate::pagination::Pagination;
use crate::rewards::award_badges;
use crate::state::{AppState, run_db};
use crate::validation::{ValidJson, ValidPath, ValidQuery};

pub const DEFAULT_TASK_POINTS: i64 = 10;

async fn load_task(state: &AppState, id: &str, owner_id: &str) -> ApiResult<TaskRow> {
    let (id, owner_id) = (id.to_string(), owner_id.to_string());
    run_db(state, move |db| db.get_task(&id, &owner_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Task"))
}

pub async fn create_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidJson(req): ValidJson<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let now = fmt_ts(Utc::now());
    let row = TaskRow {
        id: new_object_id(),
        owner_id: user.id,
        title: req.title,
        description: req.description,
        category: req.category,
        status: TaskStatus::Pending.as_str().to_string(),
        priority: req
            .priority
            .unwrap_or(TaskPriority::Medium)
            .as_str()
            .to_string(),
        points: req.points.unwrap_or(DEFAULT_TASK_POINTS),
        due_date: req.due_date.map(fmt_ts),
        created_at: now.clone(),
        updated_at: now,
        completed_at: None,
    };
    let task = row.to_task();

    run_db(&state, move |db| db.insert_task(&row)).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidQuery(query): ValidQuery<TaskQuery>,
) -> ApiResult<Json<Page<Task>>> {
    let paging = Pagination::new(query.page, query.limit);
    let filter = TaskFilter {
        statuses: query.status.unwrap_or_default(),
        priorities: query.priority.unwrap_or_default(),
        sort: query
            .sort
            .as_deref()
            .and_then(TaskSort::from_param)
            .unwrap_or_default(),
        offset: paging.offset(),
        limit: paging.limit,
    };

    let (rows, total) = run_db(&state, move |db| db.list_tasks(&user.id, &filter)).await?;
    let tasks = rows.iter().map(TaskRow::to_task).collect();
    Ok(Json(paging.wrap(tasks, total)))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidPath(param): ValidPath<IdParam>,
) -> ApiResult<Json<Task>> {
    Ok(Json(load_task(&state, &param.id, &user.id).await?.to_task()))
}

pub async fn update_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidPath(param): ValidPath<IdParam>,
    ValidJson(req): ValidJson<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    let patch = TaskPatch {
        title: req.title,
        description: req.description,
        category: req.category,
        priority: req.priority,
        points: req.points,
        due_date: req.due_date,
        status: req.status,
    };

    let outcome = run_db(&state, move |db| {
        db.update_task(&param.id, &user.id, &patch, Utc::now())
    })
    .await?;
    match outcome {
        UpdateOutcome::Updated(row) => Ok(Json(row.to_task())),
        UpdateOutcome::NotFound => Err(ApiError::not_found("Task")),
        // Completion only goes through /complete, so points are awarded once
        UpdateOutcome::StatusLocked => Err(ApiError::Conflict(
            "A completed task cannot change status".into(),
        )),
    }
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidPath(param): ValidPath<IdParam>,
) -> ApiResult<Json<MessageResponse>> {
    let deleted = run_db(&state, move |db| db.delete_task(&param.id, &user.id)).await?;
    if !deleted {
        return Err(ApiError::not_found("Task"));
    }
    Ok(Json(MessageResponse::new("Task deleted")))
}

pub async fn complete_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidPath(param): ValidPath<IdParam>,
) -> ApiResult<Json<CompleteTaskResponse>> {
    let owner = user.id.clone();
    let outcome = run_db(&state, move |db| db.complete_task(&param.id, &owner, Utc::now())).await?;

    let (task, total_points) = match outcome {
        CompleteOutcome::NotFound => return Err(ApiError::not_found("Task")),
        CompleteOutcome::AlreadyCompleted => {
            return Err(ApiError::Conflict("Task is already completed".into()));
        }
        CompleteOutcome::Completed { task, total_points } => (task.to_task(), total_points),
    };
    info!("{} completed task {} (+{} points)", user.id, task.id, task.points);

    notify(
        &state,
        NewNotification {
            recipient_id: user.id.clone(),
            kind: NotificationKind::TaskCompleted,
            title: "Task completed!".into(),
            message: format!(
                "You completed \"{}\" and earned {} points",
                task.title, task.points
            ),
            metadata: json!({ "taskId": task.id, "points": task.points }),
        },
    )
    .await?;
    let new_badges = award_badges(&state, &user.id).await?;

    Ok(Json(CompleteTaskResponse {
        points_awarded: task.points,
        total_points,
        level: level_for_points(total_points),
        new_badges,
        task,
    }))
}
