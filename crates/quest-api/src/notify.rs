use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use quest_db::models::{NotificationRow, fmt_ts};
use quest_types::events::GatewayEvent;
use quest_types::ids::new_object_id;
use quest_types::models::NotificationKind;

use crate::error::ApiResult;
use crate::state::{AppState, run_db};

pub struct NewNotification {
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub metadata: Value,
}

/// Persist a notification, then push it to every live connection of the
/// recipient. Returns how many connections it reached.
pub async fn notify(state: &AppState, new: NewNotification) -> ApiResult<usize> {
    let row = NotificationRow {
        id: new_object_id(),
        recipient_id: new.recipient_id,
        kind: new.kind.as_str().to_string(),
        title: new.title,
        message: new.message,
        metadata: new.metadata.to_string(),
        read: false,
        created_at: fmt_ts(Utc::now()),
    };
    let notification = row.to_notification();

    run_db(state, move |db| db.insert_notification(&row)).await?;

    let recipient = notification.recipient_id.clone();
    let delivered = state
        .dispatcher
        .send_to_user(&recipient, GatewayEvent::Notification(notification))
        .await;
    debug!("Notification for {} reached {} live connections", recipient, delivered);
    Ok(delivered)
}
