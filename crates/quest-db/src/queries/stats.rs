use anyhow::Result;

use crate::Database;
use crate::models::StatsRow;

impl Database {
    pub fn admin_stats(&self) -> Result<StatsRow> {
        self.with_conn(|conn| {
            let mut stats = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM users),
                    (SELECT COUNT(*) FROM users WHERE active = 1),
                    (SELECT COUNT(*) FROM users WHERE role = 'admin'),
                    (SELECT COUNT(*) FROM tasks),
                    (SELECT COUNT(*) FROM tasks WHERE status = 'completed'),
                    (SELECT COALESCE(SUM(points), 0) FROM users),
                    (SELECT COUNT(*) FROM friendships WHERE status = 'accepted'),
                    (SELECT COUNT(*) FROM notifications WHERE read = 0)",
                [],
                |row| {
                    Ok(StatsRow {
                        total_users: row.get(0)?,
                        active_users: row.get(1)?,
                        admins: row.get(2)?,
                        total_tasks: row.get(3)?,
                        completed_tasks: row.get(4)?,
                        points_awarded: row.get(5)?,
                        friendships: row.get(6)?,
                        unread_notifications: row.get(7)?,
                        tasks_by_status: Vec::new(),
                    })
                },
            )?;

            let mut stmt =
                conn.prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status ORDER BY status")?;
            stats.tasks_by_status = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(stats)
        })
    }
}
