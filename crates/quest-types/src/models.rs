use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Points needed per level.
pub const POINTS_PER_LEVEL: i64 = 100;

pub fn level_for_points(points: i64) -> i64 {
    points.max(0) / POINTS_PER_LEVEL + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub const ALL: [Self; 3] = [Self::Pending, Self::InProgress, Self::Completed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown task status: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Sort rank, highest priority first.
    pub fn rank(&self) -> i64 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|priority| priority.as_str() == s)
            .ok_or_else(|| format!("unknown task priority: {s}"))
    }
}

/// Achievements a learner can unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Badge {
    FirstSteps,
    Achiever,
    Centurion,
    Scholar,
    Legend,
    SocialButterfly,
}

impl Badge {
    pub const ALL: [Self; 6] = [
        Self::FirstSteps,
        Self::Achiever,
        Self::Centurion,
        Self::Scholar,
        Self::Legend,
        Self::SocialButterfly,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::FirstSteps => "first-steps",
            Self::Achiever => "achiever",
            Self::Centurion => "centurion",
            Self::Scholar => "scholar",
            Self::Legend => "legend",
            Self::SocialButterfly => "social-butterfly",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::FirstSteps => "First Steps",
            Self::Achiever => "Achiever",
            Self::Centurion => "Centurion",
            Self::Scholar => "Scholar",
            Self::Legend => "Legend",
            Self::SocialButterfly => "Social Butterfly",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::FirstSteps => "Completed your first task",
            Self::Achiever => "Completed 10 tasks",
            Self::Centurion => "Earned 100 points",
            Self::Scholar => "Earned 500 points",
            Self::Legend => "Earned 1000 points",
            Self::SocialButterfly => "Made 5 friends",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|badge| badge.key() == key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskCompleted,
    BadgeEarned,
    FriendRequest,
    FriendAccepted,
    Announcement,
}

impl NotificationKind {
    pub const ALL: [Self; 5] = [
        Self::TaskCompleted,
        Self::BadgeEarned,
        Self::FriendRequest,
        Self::FriendAccepted,
        Self::Announcement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskCompleted => "task_completed",
            Self::BadgeEarned => "badge_earned",
            Self::FriendRequest => "friend_request",
            Self::FriendAccepted => "friend_accepted",
            Self::Announcement => "announcement",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown notification type: {s}"))
    }
}

/// The caller's own account, as returned by auth endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub points: i64,
    pub level: i64,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// What other learners can see about a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub points: i64,
    pub level: i64,
    #[serde(default)]
    pub badges: Vec<BadgeAward>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeAward {
    pub badge: Badge,
    pub title: String,
    pub awarded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub points: i64,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// A pending friend request as seen by its recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: String,
    pub requester: PublicProfile,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_grows_every_hundred_points() {
        assert_eq!(level_for_points(0), 1);
        assert_eq!(level_for_points(99), 1);
        assert_eq!(level_for_points(100), 2);
        assert_eq!(level_for_points(1050), 11);
        assert_eq!(level_for_points(-5), 1);
    }

    #[test]
    fn enums_use_wire_names() {
        assert_eq!(
            serde_json::to_value(TaskStatus::InProgress).unwrap(),
            serde_json::json!("in_progress")
        );
        assert_eq!(
            serde_json::to_value(Badge::SocialButterfly).unwrap(),
            serde_json::json!("social-butterfly")
        );
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("root".parse::<Role>().is_err());
        assert_eq!(Badge::from_key("first-steps"), Some(Badge::FirstSteps));
    }

    #[test]
    fn notification_serializes_kind_as_type() {
        let n = Notification {
            id: "a".repeat(24),
            recipient_id: "b".repeat(24),
            kind: NotificationKind::FriendRequest,
            title: "New friend request".into(),
            message: "Ada wants to be your friend".into(),
            metadata: serde_json::json!({ "requestId": "c".repeat(24) }),
            read: false,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "friend_request");
        assert_eq!(json["recipientId"], "b".repeat(24));
        assert!(json.get("createdAt").is_some());
    }
}
