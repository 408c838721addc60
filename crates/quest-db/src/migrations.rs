use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                  TEXT PRIMARY KEY,
            name                TEXT NOT NULL,
            email               TEXT NOT NULL UNIQUE,
            password            TEXT NOT NULL,
            role                TEXT NOT NULL DEFAULT 'user',
            points              INTEGER NOT NULL DEFAULT 0,
            bio                 TEXT,
            avatar              TEXT,
            active              INTEGER NOT NULL DEFAULT 1,
            token_version       INTEGER NOT NULL DEFAULT 0,
            reset_token_hash    TEXT,
            reset_expires_at    TEXT,
            created_at          TEXT NOT NULL,
            last_login          TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_users_points
            ON users(points DESC);

        CREATE TABLE IF NOT EXISTS tasks (
            id              TEXT PRIMARY KEY,
            owner_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title           TEXT NOT NULL,
            description     TEXT,
            category        TEXT,
            status          TEXT NOT NULL DEFAULT 'pending',
            priority        TEXT NOT NULL DEFAULT 'medium',
            points          INTEGER NOT NULL DEFAULT 10,
            due_date        TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            completed_at    TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_owner
            ON tasks(owner_id, created_at);

        CREATE TABLE IF NOT EXISTS friendships (
            id              TEXT PRIMARY KEY,
            requester_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            recipient_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            status          TEXT NOT NULL DEFAULT 'pending',
            created_at      TEXT NOT NULL,
            UNIQUE(requester_id, recipient_id)
        );

        CREATE INDEX IF NOT EXISTS idx_friendships_recipient
            ON friendships(recipient_id, status);

        CREATE TABLE IF NOT EXISTS badges (
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            badge       TEXT NOT NULL,
            awarded_at  TEXT NOT NULL,
            PRIMARY KEY (user_id, badge)
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id              TEXT PRIMARY KEY,
            recipient_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind            TEXT NOT NULL,
            title           TEXT NOT NULL,
            message         TEXT NOT NULL,
            metadata        TEXT NOT NULL DEFAULT '{}',
            read            INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_recipient
            ON notifications(recipient_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
