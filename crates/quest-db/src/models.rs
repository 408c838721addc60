//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the quest-types API models; conversions live here.

use chrono::{DateTime, SecondsFormat, Utc};

use quest_types::models::{
    Badge, BadgeAward, Notification, NotificationKind, PublicProfile, Role, Task, TaskPriority,
    TaskStatus, User, level_for_points,
};

/// Timestamps are stored as RFC 3339 text with millisecond precision so that
/// lexical order matches chronological order.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_default()
}

fn parse_opt_ts(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.map(parse_ts)
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub points: i64,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub active: bool,
    pub token_version: i64,
    pub created_at: String,
    pub last_login: Option<String>,
}

impl UserRow {
    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or(Role::User)
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role(),
            points: self.points,
            level: level_for_points(self.points),
            bio: self.bio.clone(),
            avatar: self.avatar.clone(),
            active: self.active,
            created_at: parse_ts(&self.created_at),
            last_login: parse_opt_ts(self.last_login.as_deref()),
        }
    }

    pub fn to_profile(&self, badges: Vec<BadgeAward>) -> PublicProfile {
        PublicProfile {
            id: self.id.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            bio: self.bio.clone(),
            points: self.points,
            level: level_for_points(self.points),
            badges,
        }
    }
}

/// Insert payload for a new account.
pub struct NewUser<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct TaskRow {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: String,
    pub priority: String,
    pub points: i64,
    pub due_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl TaskRow {
    pub fn status(&self) -> TaskStatus {
        self.status.parse().unwrap_or(TaskStatus::Pending)
    }

    pub fn to_task(&self) -> Task {
        Task {
            id: self.id.clone(),
            owner_id: self.owner_id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            status: self.status(),
            priority: self.priority.parse().unwrap_or(TaskPriority::Medium),
            points: self.points,
            due_date: parse_opt_ts(self.due_date.as_deref()),
            created_at: parse_ts(&self.created_at),
            updated_at: parse_ts(&self.updated_at),
            completed_at: parse_opt_ts(self.completed_at.as_deref()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FriendshipRow {
    pub id: String,
    pub requester_id: String,
    pub recipient_id: String,
    pub status: String,
    pub created_at: String,
}

impl FriendshipRow {
    pub fn is_pending(&self) -> bool {
        self.status == "pending"
    }

    /// The other side of the relation, from `user_id`'s point of view.
    pub fn other_party(&self, user_id: &str) -> &str {
        if self.requester_id == user_id {
            &self.recipient_id
        } else {
            &self.requester_id
        }
    }
}

#[derive(Debug, Clone)]
pub struct BadgeRow {
    pub user_id: String,
    pub badge: String,
    pub awarded_at: String,
}

impl BadgeRow {
    pub fn to_award(&self) -> Option<BadgeAward> {
        let badge = Badge::from_key(&self.badge)?;
        Some(BadgeAward {
            badge,
            title: badge.title().to_string(),
            awarded_at: parse_ts(&self.awarded_at),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: String,
    pub recipient_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub metadata: String,
    pub read: bool,
    pub created_at: String,
}

impl NotificationRow {
    pub fn to_notification(&self) -> Notification {
        Notification {
            id: self.id.clone(),
            recipient_id: self.recipient_id.clone(),
            kind: self.kind.parse().unwrap_or(NotificationKind::Announcement),
            title: self.title.clone(),
            message: self.message.clone(),
            metadata: serde_json::from_str(&self.metadata).unwrap_or_default(),
            read: self.read,
            created_at: parse_ts(&self.created_at),
        }
    }
}

/// Aggregate counters for the admin dashboard.
#[derive(Debug, Clone, Default)]
pub struct StatsRow {
    pub total_users: i64,
    pub active_users: i64,
    pub admins: i64,
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub points_awarded: i64,
    pub friendships: i64,
    pub unread_notifications: i64,
    pub tasks_by_status: Vec<(String, i64)>,
}
