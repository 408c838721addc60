//! Badge rules.

use anyhow::anyhow;
use chrono::Utc;
use serde_json::json;
use tracing::info;

use quest_types::models::{Badge, NotificationKind};

use crate::error::ApiResult;
use crate::notify::{NewNotification, notify};
use crate::state::{AppState, run_db};

/// What badge thresholds are measured against.
#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    pub completed_tasks: u64,
    pub points: i64,
    pub friends: u64,
}

fn unlocked(badge: Badge, p: &Progress) -> bool {
    match badge {
        Badge::FirstSteps => p.completed_tasks >= 1,
        Badge::Achiever => p.completed_tasks >= 10,
        Badge::Centurion => p.points >= 100,
        Badge::Scholar => p.points >= 500,
        Badge::Legend => p.points >= 1000,
        Badge::SocialButterfly => p.friends >= 5,
    }
}

/// Every badge `progress` qualifies for, in catalog order.
pub fn earned_badges(progress: &Progress) -> Vec<Badge> {
    Badge::ALL
        .into_iter()
        .filter(|badge| unlocked(*badge, progress))
        .collect()
}

/// Award whatever `user_id` newly qualifies for and notify them of each.
pub async fn award_badges(state: &AppState, user_id: &str) -> ApiResult<Vec<Badge>> {
    let uid = user_id.to_string();
    let newly = run_db(state, move |db| {
        let user = db
            .get_user_by_id(&uid)?
            .ok_or_else(|| anyhow!("user {uid} disappeared while awarding badges"))?;
        let progress = Progress {
            completed_tasks: db.count_completed_tasks(&uid)?,
            points: user.points,
            friends: db.count_friends(&uid)?,
        };

        let now = Utc::now();
        let mut newly = Vec::new();
        for badge in earned_badges(&progress) {
            if db.award_badge(&uid, badge, now)? {
                newly.push(badge);
            }
        }
        Ok(newly)
    })
    .await?;

    for badge in &newly {
        info!("{} earned badge {}", user_id, badge.key());
        notify(
            state,
            NewNotification {
                recipient_id: user_id.to_string(),
                kind: NotificationKind::BadgeEarned,
                title: "Badge earned!".into(),
                message: format!("You earned the {} badge: {}", badge.title(), badge.description()),
                metadata: json!({ "badge": badge.key() }),
            },
        )
        .await?;
    }
    Ok(newly)
}
