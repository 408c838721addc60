use anyhow::Result;
use rusqlite::Row;

use crate::Database;
use crate::models::NotificationRow;

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, kind, title, message, metadata, read, created_at";

fn map_notification(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        recipient_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        metadata: row.get(5)?,
        read: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl Database {
    pub fn insert_notification(&self, n: &NotificationRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO notifications ({NOTIFICATION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                rusqlite::params![
                    n.id,
                    n.recipient_id,
                    n.kind,
                    n.title,
                    n.message,
                    n.metadata,
                    n.read,
                    n.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Newest first. `unread_only` restricts to notifications not yet read.
    pub fn list_notifications(
        &self,
        recipient_id: &str,
        unread_only: bool,
        offset: u32,
        limit: u32,
    ) -> Result<(Vec<NotificationRow>, u64)> {
        self.with_conn(|conn| {
            let filter = "recipient_id = ?1 AND (?2 = 0 OR read = 0)";

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM notifications WHERE {filter}"),
                (recipient_id, unread_only),
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE {filter}
                 ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4"
            ))?;
            let rows = stmt
                .query_map((recipient_id, unread_only, limit, offset), map_notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total as u64))
        })
    }

    pub fn unread_notification_count(&self, recipient_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND read = 0",
                [recipient_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// Returns false if no such notification belongs to the recipient.
    pub fn mark_notification_read(&self, id: &str, recipient_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1 AND recipient_id = ?2",
                (id, recipient_id),
            )?;
            Ok(changed == 1)
        })
    }

    pub fn mark_all_notifications_read(&self, recipient_id: &str) -> Result<u64> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET read = 1 WHERE recipient_id = ?1 AND read = 0",
                [recipient_id],
            )?;
            Ok(changed as u64)
        })
    }

    pub fn delete_notification(&self, id: &str, recipient_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM notifications WHERE id = ?1 AND recipient_id = ?2",
                (id, recipient_id),
            )?;
            Ok(deleted == 1)
        })
    }
}
