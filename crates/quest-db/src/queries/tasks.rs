use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Value;

use quest_types::models::{TaskPriority, TaskStatus};

use super::OptionalExt;
use crate::Database;
use crate::models::{TaskRow, fmt_ts};

const TASK_COLUMNS: &str = "id, owner_id, title, description, category, status, priority, points, \
                            due_date, created_at, updated_at, completed_at";

fn map_task(row: &Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        status: row.get(5)?,
        priority: row.get(6)?,
        points: row.get(7)?,
        due_date: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        completed_at: row.get(11)?,
    })
}

/// Supported `sort` values for task listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskSort {
    CreatedAsc,
    #[default]
    CreatedDesc,
    DueDate,
    Priority,
    Points,
}

impl TaskSort {
    pub const PARAMS: [&'static str; 5] = ["createdAt", "-createdAt", "dueDate", "priority", "points"];

    pub fn from_param(param: &str) -> Option<Self> {
        match param {
            "createdAt" => Some(Self::CreatedAsc),
            "-createdAt" => Some(Self::CreatedDesc),
            "dueDate" => Some(Self::DueDate),
            "priority" => Some(Self::Priority),
            "points" => Some(Self::Points),
            _ => None,
        }
    }

    fn order_by(&self) -> &'static str {
        match self {
            Self::CreatedAsc => "created_at ASC",
            Self::CreatedDesc => "created_at DESC",
            Self::DueDate => "due_date IS NULL, due_date ASC, created_at DESC",
            Self::Priority => {
                "CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END, created_at DESC"
            }
            Self::Points => "points DESC, created_at DESC",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub statuses: Vec<TaskStatus>,
    pub priorities: Vec<TaskPriority>,
    pub sort: TaskSort,
    pub offset: u32,
    pub limit: u32,
}

/// Result of an attempt to complete a task.
#[derive(Debug)]
pub enum CompleteOutcome {
    NotFound,
    AlreadyCompleted,
    Completed { task: TaskRow, total_points: i64 },
}

/// Fields of a task edit. `None` leaves the column as it is.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<TaskPriority>,
    pub points: Option<i64>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: Option<TaskStatus>,
}

#[derive(Debug)]
pub enum UpdateOutcome {
    NotFound,
    /// The patch changes `status` but the task is already completed.
    StatusLocked,
    Updated(TaskRow),
}

impl Database {
    pub fn insert_task(&self, task: &TaskRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO tasks ({TASK_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                rusqlite::params![
                    task.id,
                    task.owner_id,
                    task.title,
                    task.description,
                    task.category,
                    task.status,
                    task.priority,
                    task.points,
                    task.due_date,
                    task.created_at,
                    task.updated_at,
                    task.completed_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_task(&self, id: &str, owner_id: &str) -> Result<Option<TaskRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND owner_id = ?2"),
                (id, owner_id),
                map_task,
            )
            .optional()
        })
    }

    pub fn list_tasks(&self, owner_id: &str, filter: &TaskFilter) -> Result<(Vec<TaskRow>, u64)> {
        let mut clauses = vec!["owner_id = ?".to_string()];
        let mut params: Vec<Value> = vec![Value::Text(owner_id.to_string())];

        if !filter.statuses.is_empty() {
            clauses.push(format!("status IN ({})", placeholders(filter.statuses.len())));
            params.extend(filter.statuses.iter().map(|s| Value::Text(s.as_str().to_string())));
        }
        if !filter.priorities.is_empty() {
            clauses.push(format!("priority IN ({})", placeholders(filter.priorities.len())));
            params.extend(filter.priorities.iter().map(|p| Value::Text(p.as_str().to_string())));
        }
        let where_clause = clauses.join(" AND ");

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM tasks WHERE {where_clause}"),
                rusqlite::params_from_iter(params.iter()),
                |row| row.get(0),
            )?;

            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE {where_clause}
                 ORDER BY {} LIMIT ? OFFSET ?",
                filter.sort.order_by()
            );
            let mut paged = params.clone();
            paged.push(Value::Integer(i64::from(filter.limit)));
            paged.push(Value::Integer(i64::from(filter.offset)));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(paged.iter()), map_task)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total as u64))
        })
    }

    /// Apply `patch` to a task the caller owns. The read, the completed-status
    /// check and the write share one transaction.
    pub fn update_task(
        &self,
        id: &str,
        owner_id: &str,
        patch: &TaskPatch,
        at: DateTime<Utc>,
    ) -> Result<UpdateOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let current = tx
                .query_row(
                    &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND owner_id = ?2"),
                    (id, owner_id),
                    map_task,
                )
                .optional()?;
            let Some(current) = current else {
                return Ok(UpdateOutcome::NotFound);
            };
            if patch.status.is_some() && current.status() == TaskStatus::Completed {
                return Ok(UpdateOutcome::StatusLocked);
            }

            let mut sql = String::from(
                "UPDATE tasks
                 SET title = COALESCE(?3, title),
                     description = COALESCE(?4, description),
                     category = COALESCE(?5, category),
                     priority = COALESCE(?6, priority),
                     points = COALESCE(?7, points),
                     due_date = COALESCE(?8, due_date),
                     status = COALESCE(?9, status),
                     updated_at = ?10
                 WHERE id = ?1 AND owner_id = ?2",
            );
            if patch.status.is_some() {
                sql.push_str(" AND status != 'completed'");
            }
            let changed = tx.execute(
                &sql,
                rusqlite::params![
                    id,
                    owner_id,
                    patch.title,
                    patch.description,
                    patch.category,
                    patch.priority.as_ref().map(TaskPriority::as_str),
                    patch.points,
                    patch.due_date.map(fmt_ts),
                    patch.status.as_ref().map(TaskStatus::as_str),
                    fmt_ts(at),
                ],
            )?;
            if changed == 0 {
                return Ok(UpdateOutcome::StatusLocked);
            }

            let task = tx.query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                [id],
                map_task,
            )?;
            tx.commit()?;
            Ok(UpdateOutcome::Updated(task))
        })
    }

    pub fn delete_task(&self, id: &str, owner_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM tasks WHERE id = ?1 AND owner_id = ?2",
                (id, owner_id),
            )?;
            Ok(deleted == 1)
        })
    }

    /// Mark a task completed and credit its points to the owner, atomically.
    pub fn complete_task(
        &self,
        id: &str,
        owner_id: &str,
        at: DateTime<Utc>,
    ) -> Result<CompleteOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let task = tx
                .query_row(
                    &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND owner_id = ?2"),
                    (id, owner_id),
                    map_task,
                )
                .optional()?;

            let Some(mut task) = task else {
                return Ok(CompleteOutcome::NotFound);
            };
            if task.status() == TaskStatus::Completed {
                return Ok(CompleteOutcome::AlreadyCompleted);
            }

            let ts = fmt_ts(at);
            tx.execute(
                "UPDATE tasks SET status = 'completed', completed_at = ?2, updated_at = ?2
                 WHERE id = ?1",
                (id, &ts),
            )?;
            tx.execute(
                "UPDATE users SET points = points + ?2 WHERE id = ?1",
                (owner_id, task.points),
            )?;
            let total_points: i64 =
                tx.query_row("SELECT points FROM users WHERE id = ?1", [owner_id], |row| {
                    row.get(0)
                })?;
            tx.commit()?;

            task.status = TaskStatus::Completed.as_str().to_string();
            task.completed_at = Some(ts.clone());
            task.updated_at = ts;
            Ok(CompleteOutcome::Completed { task, total_points })
        })
    }

    pub fn count_completed_tasks(&self, owner_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tasks WHERE owner_id = ?1 AND status = 'completed'",
                [owner_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{db, user};

    fn task(id: &str, owner: &str, priority: TaskPriority, points: i64) -> TaskRow {
        let now = fmt_ts(Utc::now());
        TaskRow {
            id: id.into(),
            owner_id: owner.into(),
            title: format!("Task {id}"),
            description: None,
            category: Some("rust".into()),
            status: TaskStatus::Pending.as_str().into(),
            priority: priority.as_str().into(),
            points,
            due_date: None,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        }
    }

    #[test]
    fn tasks_are_scoped_to_their_owner() {
        let db = db();
        user(&db, "u1", "Ada");
        user(&db, "u2", "Grace");
        db.insert_task(&task("t1", "u1", TaskPriority::Low, 10)).unwrap();

        assert!(db.get_task("t1", "u1").unwrap().is_some());
        assert!(db.get_task("t1", "u2").unwrap().is_none());
        assert!(!db.delete_task("t1", "u2").unwrap());
        assert!(db.delete_task("t1", "u1").unwrap());
    }

    #[test]
    fn list_filters_and_sorts() {
        let db = db();
        user(&db, "u1", "Ada");
        db.insert_task(&task("t1", "u1", TaskPriority::Low, 5)).unwrap();
        db.insert_task(&task("t2", "u1", TaskPriority::High, 50)).unwrap();
        db.insert_task(&task("t3", "u1", TaskPriority::Medium, 20)).unwrap();

        let filter = TaskFilter {
            sort: TaskSort::Priority,
            limit: 10,
            ..Default::default()
        };
        let (rows, total) = db.list_tasks("u1", &filter).unwrap();
        assert_eq!(total, 3);
        let ids: Vec<_> = rows.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["t2", "t3", "t1"]);

        let filter = TaskFilter {
            priorities: vec![TaskPriority::Low, TaskPriority::Medium],
            sort: TaskSort::Points,
            limit: 1,
            ..Default::default()
        };
        let (rows, total) = db.list_tasks("u1", &filter).unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "t3");
    }

    #[test]
    fn completing_credits_points_once() {
        let db = db();
        user(&db, "u1", "Ada");
        db.insert_task(&task("t1", "u1", TaskPriority::High, 40)).unwrap();

        match db.complete_task("t1", "u1", Utc::now()).unwrap() {
            CompleteOutcome::Completed { task, total_points } => {
                assert_eq!(task.status(), TaskStatus::Completed);
                assert!(task.completed_at.is_some());
                assert_eq!(total_points, 40);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(matches!(
            db.complete_task("t1", "u1", Utc::now()).unwrap(),
            CompleteOutcome::AlreadyCompleted
        ));
        assert!(matches!(
            db.complete_task("t1", "u2", Utc::now()).unwrap(),
            CompleteOutcome::NotFound
        ));
        assert_eq!(db.get_user_by_id("u1").unwrap().unwrap().points, 40);
        assert_eq!(db.count_completed_tasks("u1").unwrap(), 1);
    }

    #[test]
    fn edits_after_completion_keep_the_status() {
        let db = db();
        user(&db, "u1", "Ada");
        db.insert_task(&task("t1", "u1", TaskPriority::Medium, 50)).unwrap();

        // An edit that was prepared before the task got completed
        let rename = TaskPatch {
            title: Some("Renamed".into()),
            ..Default::default()
        };
        db.complete_task("t1", "u1", Utc::now()).unwrap();

        match db.update_task("t1", "u1", &rename, Utc::now()).unwrap() {
            UpdateOutcome::Updated(task) => {
                assert_eq!(task.title, "Renamed");
                assert_eq!(task.status(), TaskStatus::Completed);
                assert_eq!(task.category.as_deref(), Some("rust"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(matches!(
            db.complete_task("t1", "u1", Utc::now()).unwrap(),
            CompleteOutcome::AlreadyCompleted
        ));
        assert_eq!(db.get_user_by_id("u1").unwrap().unwrap().points, 50);

        let reopen = TaskPatch {
            status: Some(TaskStatus::Pending),
            ..Default::default()
        };
        assert!(matches!(
            db.update_task("t1", "u1", &reopen, Utc::now()).unwrap(),
            UpdateOutcome::StatusLocked
        ));
        assert!(matches!(
            db.update_task("t1", "u2", &rename, Utc::now()).unwrap(),
            UpdateOutcome::NotFound
        ));
        assert_eq!(db.count_completed_tasks("u1").unwrap(), 1);
    }

    #[test]
    fn patch_sets_only_given_fields() {
        let db = db();
        user(&db, "u1", "Ada");
        db.insert_task(&task("t1", "u1", TaskPriority::Low, 5)).unwrap();

        let patch = TaskPatch {
            priority: Some(TaskPriority::High),
            status: Some(TaskStatus::InProgress),
            ..Default::default()
        };
        let UpdateOutcome::Updated(task) = db.update_task("t1", "u1", &patch, Utc::now()).unwrap()
        else {
            panic!("task should update");
        };
        assert_eq!(task.priority, "high");
        assert_eq!(task.status(), TaskStatus::InProgress);
        assert_eq!(task.title, "Task t1");
        assert_eq!(task.points, 5);
    }
}
