use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, Row, TransactionBehavior};

use super::OptionalExt;
use super::users::{map_user, user_columns};
use crate::Database;
use crate::models::{FriendshipRow, UserRow, fmt_ts};

const FRIENDSHIP_COLUMNS: &str = "id, requester_id, recipient_id, status, created_at";

fn map_friendship(row: &Row<'_>) -> rusqlite::Result<FriendshipRow> {
    Ok(FriendshipRow {
        id: row.get(0)?,
        requester_id: row.get(1)?,
        recipient_id: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn friendship_between(conn: &Connection, a: &str, b: &str) -> Result<Option<FriendshipRow>> {
    conn.query_row(
        &format!(
            "SELECT {FRIENDSHIP_COLUMNS} FROM friendships
             WHERE (requester_id = ?1 AND recipient_id = ?2)
                OR (requester_id = ?2 AND recipient_id = ?1)"
        ),
        (a, b),
        map_friendship,
    )
    .optional()
}

#[derive(Debug)]
pub enum FriendRequestOutcome {
    Created(FriendshipRow),
    /// A pending or accepted relation already links the two users.
    Exists(FriendshipRow),
}

impl Database {
    /// Any relation (pending or accepted) between two users, in either direction.
    pub fn find_friendship_between(&self, a: &str, b: &str) -> Result<Option<FriendshipRow>> {
        self.with_conn(|conn| friendship_between(conn, a, b))
    }

    /// Insert a pending request unless the two users already have a relation
    /// in either direction. The check and the insert share one transaction.
    pub fn request_friendship(
        &self,
        id: &str,
        requester_id: &str,
        recipient_id: &str,
    ) -> Result<FriendRequestOutcome> {
        let created_at = fmt_ts(Utc::now());
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if let Some(existing) = friendship_between(&tx, requester_id, recipient_id)? {
                return Ok(FriendRequestOutcome::Exists(existing));
            }
            tx.execute(
                "INSERT INTO friendships (id, requester_id, recipient_id, status, created_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4)",
                (id, requester_id, recipient_id, &created_at),
            )?;
            tx.commit()?;

            Ok(FriendRequestOutcome::Created(FriendshipRow {
                id: id.to_string(),
                requester_id: requester_id.to_string(),
                recipient_id: recipient_id.to_string(),
                status: "pending".to_string(),
                created_at,
            }))
        })
    }

    pub fn get_friendship(&self, id: &str) -> Result<Option<FriendshipRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {FRIENDSHIP_COLUMNS} FROM friendships WHERE id = ?1"),
                [id],
                map_friendship,
            )
            .optional()
        })
    }

    pub fn accept_friendship(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE friendships SET status = 'accepted' WHERE id = ?1 AND status = 'pending'",
                [id],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn delete_friendship(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM friendships WHERE id = ?1", [id])?;
            Ok(deleted == 1)
        })
    }

    /// Remove an accepted friendship in either direction.
    pub fn remove_friend(&self, user_id: &str, friend_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM friendships
                 WHERE status = 'accepted'
                   AND ((requester_id = ?1 AND recipient_id = ?2)
                     OR (requester_id = ?2 AND recipient_id = ?1))",
                (user_id, friend_id),
            )?;
            Ok(deleted > 0)
        })
    }

    /// Pending requests addressed to `user_id`, with the requester's account.
    pub fn incoming_friend_requests(&self, user_id: &str) -> Result<Vec<(FriendshipRow, UserRow)>> {
        self.with_conn(|conn| {
            // JOIN users to fetch the requester in a single query
            let mut stmt = conn.prepare(&format!(
                "SELECT {}, f.id, f.requester_id, f.recipient_id, f.status, f.created_at
                 FROM friendships f
                 JOIN users u ON u.id = f.requester_id
                 WHERE f.recipient_id = ?1 AND f.status = 'pending'
                 ORDER BY f.created_at DESC",
                user_columns("u")
            ))?;

            let rows = stmt
                .query_map([user_id], |row| {
                    let user = map_user(row)?;
                    let friendship = FriendshipRow {
                        id: row.get(12)?,
                        requester_id: row.get(13)?,
                        recipient_id: row.get(14)?,
                        status: row.get(15)?,
                        created_at: row.get(16)?,
                    };
                    Ok((friendship, user))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn friends_of(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM friendships f
                 JOIN users u ON u.id = CASE WHEN f.requester_id = ?1
                                             THEN f.recipient_id ELSE f.requester_id END
                 WHERE (f.requester_id = ?1 OR f.recipient_id = ?1) AND f.status = 'accepted'
                 ORDER BY u.name ASC",
                user_columns("u")
            ))?;
            let rows = stmt
                .query_map([user_id], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_friends(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM friendships
                 WHERE (requester_id = ?1 OR recipient_id = ?1) AND status = 'accepted'",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }
}
