use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};

use quest_types::models::{Badge, Role};

use super::{OptionalExt, is_unique_violation, like_pattern};
use crate::Database;
use crate::models::{BadgeRow, NewUser, UserRow, fmt_ts};

const USER_COLUMNS: &str = "id, name, email, password, role, points, bio, avatar, active, \
                            token_version, created_at, last_login";

pub(crate) fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        role: row.get(4)?,
        points: row.get(5)?,
        bio: row.get(6)?,
        avatar: row.get(7)?,
        active: row.get(8)?,
        token_version: row.get(9)?,
        created_at: row.get(10)?,
        last_login: row.get(11)?,
    })
}

/// Same columns as `USER_COLUMNS`, qualified with a table alias for joins.
pub(crate) fn user_columns(alias: &str) -> String {
    USER_COLUMNS
        .split(", ")
        .map(|col| format!("{alias}.{}", col.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Database {
    // -- Accounts --

    /// Returns false if the email is already registered.
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, name, email, password, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (
                    user.id,
                    user.name,
                    user.email,
                    user.password_hash,
                    user.role.as_str(),
                    fmt_ts(Utc::now()),
                ),
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(e) if is_unique_violation(&e) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn record_login(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET last_login = ?2 WHERE id = ?1",
                (id, fmt_ts(at)),
            )?;
            Ok(())
        })
    }

    /// Apply the provided profile fields; `None` leaves a column untouched.
    pub fn update_profile(
        &self,
        id: &str,
        name: Option<&str>,
        bio: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<Option<UserRow>> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users
                 SET name = COALESCE(?2, name), bio = COALESCE(?3, bio), avatar = COALESCE(?4, avatar)
                 WHERE id = ?1",
                (id, name, bio, avatar),
            )?;
            query_user(conn, "id", id)
        })
    }

    /// Replace the password hash. Also clears any pending reset token and
    /// bumps the token version so outstanding refresh tokens stop working.
    pub fn set_password(&self, id: &str, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users
                 SET password = ?2, token_version = token_version + 1,
                     reset_token_hash = NULL, reset_expires_at = NULL
                 WHERE id = ?1",
                (id, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn bump_token_version(&self, id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET token_version = token_version + 1 WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
    }

    // -- Password reset --

    pub fn set_reset_token(
        &self,
        id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET reset_token_hash = ?2, reset_expires_at = ?3 WHERE id = ?1",
                (id, token_hash, fmt_ts(expires_at)),
            )?;
            Ok(())
        })
    }

    /// Look up the active account owning an unexpired reset token.
    pub fn get_user_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE reset_token_hash = ?1 AND reset_expires_at > ?2 AND active = 1"
            );
            conn.query_row(&sql, (token_hash, fmt_ts(now)), map_user)
                .optional()
        })
    }

    /// Drop reset tokens whose expiry has passed. Returns how many were cleared.
    pub fn clear_expired_reset_tokens(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let cleared = conn.execute(
                "UPDATE users SET reset_token_hash = NULL, reset_expires_at = NULL
                 WHERE reset_expires_at IS NOT NULL AND reset_expires_at <= ?1",
                [fmt_ts(now)],
            )?;
            Ok(cleared)
        })
    }

    // -- Directory --

    /// Paged name/email search. Inactive accounts are only included for admins.
    pub fn search_users(
        &self,
        search: Option<&str>,
        include_inactive: bool,
        offset: u32,
        limit: u32,
    ) -> Result<(Vec<UserRow>, u64)> {
        let pattern = search.map(like_pattern);
        self.with_conn(|conn| {
            let filter = "(?1 IS NULL OR name LIKE ?1 ESCAPE '\\' OR email LIKE ?1 ESCAPE '\\')
                          AND (?2 OR active = 1)";

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM users WHERE {filter}"),
                (&pattern, include_inactive),
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE {filter}
                 ORDER BY created_at DESC LIMIT ?3 OFFSET ?4"
            ))?;
            let rows = stmt
                .query_map((&pattern, include_inactive, limit, offset), map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total as u64))
        })
    }

    pub fn leaderboard(&self, limit: u32) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE active = 1
                 ORDER BY points DESC, created_at ASC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map([limit], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn active_user_ids(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM users WHERE active = 1")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Admin role/activation change. Deactivation bumps the token version.
    pub fn admin_update_user(
        &self,
        id: &str,
        role: Option<Role>,
        active: Option<bool>,
    ) -> Result<Option<UserRow>> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users
                 SET role = COALESCE(?2, role),
                     active = COALESCE(?3, active),
                     token_version = token_version + CASE WHEN ?3 = 0 THEN 1 ELSE 0 END
                 WHERE id = ?1",
                (id, role.map(|r| r.as_str()), active),
            )?;
            query_user(conn, "id", id)
        })
    }

    // -- Badges --

    /// Returns true if the badge was newly awarded.
    pub fn award_badge(&self, user_id: &str, badge: Badge, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO badges (user_id, badge, awarded_at) VALUES (?1, ?2, ?3)",
                (user_id, badge.key(), fmt_ts(at)),
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn badges_for_user(&self, user_id: &str) -> Result<Vec<BadgeRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, badge, awarded_at FROM badges
                 WHERE user_id = ?1 ORDER BY awarded_at ASC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(BadgeRow {
                        user_id: row.get(0)?,
                        badge: row.get(1)?,
                        awarded_at: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    conn.query_row(&sql, [value], map_user).optional()
}
