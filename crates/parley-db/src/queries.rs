use crate::Database;
use crate::models::{BanReportRow, BanRow, ChannelRow, MessageRow, UserRow};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users / channels (identity + existence lookups) --

    pub fn create_user(&self, id: &str, username: &str, role: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, role) VALUES (?1, ?2, ?3)",
                (id, username, role),
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.prepare("SELECT id, username, role FROM users WHERE id = ?1")?
                .query_row([id], |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        role: row.get(2)?,
                    })
                })
                .optional()
        })
    }

    pub fn create_group(&self, id: &str, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("INSERT INTO groups (id, name) VALUES (?1, ?2)", (id, name))?;
            Ok(())
        })
    }

    pub fn create_channel(&self, id: &str, group_id: &str, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channels (id, group_id, name) VALUES (?1, ?2, ?3)",
                (id, group_id, name),
            )?;
            Ok(())
        })
    }

    pub fn get_channel(&self, id: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            conn.prepare(
                "SELECT c.id, c.group_id, c.name, g.name
                 FROM channels c
                 JOIN groups g ON g.id = c.group_id
                 WHERE c.id = ?1",
            )?
            .query_row([id], |row| {
                Ok(ChannelRow {
                    id: row.get(0)?,
                    group_id: row.get(1)?,
                    name: row.get(2)?,
                    group_name: row.get(3)?,
                })
            })
            .optional()
        })
    }

    // -- Messages --

    /// Insert a message with a server-assigned timestamp. Returns the
    /// assigned id (insertion-ordered rowid).
    pub fn insert_message(
        &self,
        channel_id: &str,
        sender_id: &str,
        sender_name: &str,
        body: Option<&str>,
        image_ref: Option<&str>,
        created_at: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (channel_id, sender_id, sender_name, body, image_ref, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![channel_id, sender_id, sender_name, body, image_ref, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Page of messages, always ascending by (created_at, id). The optional
    /// `before` cursor is exclusive and selects the newest rows older than
    /// it, so repeated calls walk history backwards while each page stays in
    /// forward order.
    pub fn get_messages(
        &self,
        channel_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, channel_id, limit, before))
    }

    // -- Bans --

    pub fn is_banned(&self, channel_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM bans WHERE channel_id = ?1 AND user_id = ?2",
                [channel_id, user_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Record a ban. Returns true when a new record was created; re-banning
    /// an already-banned user is an idempotent no-op returning false.
    pub fn upsert_ban(
        &self,
        channel_id: &str,
        user_id: &str,
        reason: &str,
        banned_by: &str,
        created_at: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT INTO bans (channel_id, user_id, reason, banned_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(channel_id, user_id) DO NOTHING",
                rusqlite::params![channel_id, user_id, reason, banned_by, created_at],
            )?;
            Ok(changed > 0)
        })
    }

    /// Remove a ban. Absent record is not an error.
    pub fn delete_ban(&self, channel_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM bans WHERE channel_id = ?1 AND user_id = ?2",
                [channel_id, user_id],
            )?;
            Ok(())
        })
    }

    pub fn bans_for_channel(&self, channel_id: &str) -> Result<Vec<BanRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT channel_id, user_id, reason, banned_by, created_at
                 FROM bans WHERE channel_id = ?1",
            )?;
            let rows = stmt
                .query_map([channel_id], |row| {
                    Ok(BanRow {
                        channel_id: row.get(0)?,
                        user_id: row.get(1)?,
                        reason: row.get(2)?,
                        banned_by: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Audit projection: every ban joined with channel/group/user display
    /// names, newest first. LEFT JOINs keep records whose channel or users
    /// have since been deleted.
    pub fn ban_reports(&self) -> Result<Vec<BanReportRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.name, b.channel_id, c.name,
                        b.user_id, target.username,
                        b.banned_by, actor.username,
                        b.reason, b.created_at
                 FROM bans b
                 LEFT JOIN channels c ON c.id = b.channel_id
                 LEFT JOIN groups g ON g.id = c.group_id
                 LEFT JOIN users target ON target.id = b.user_id
                 LEFT JOIN users actor ON actor.id = b.banned_by
                 ORDER BY b.created_at DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(BanReportRow {
                        group_id: row.get(0)?,
                        group_name: row.get(1)?,
                        channel_id: row.get(2)?,
                        channel_name: row.get(3)?,
                        user_id: row.get(4)?,
                        username: row.get(5)?,
                        banned_by: row.get(6)?,
                        banned_by_name: row.get(7)?,
                        reason: row.get(8)?,
                        created_at: row.get(9)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_messages(
    conn: &Connection,
    channel_id: &str,
    limit: u32,
    before: Option<&str>,
) -> Result<Vec<MessageRow>> {
    let map_row = |row: &rusqlite::Row<'_>| {
        Ok(MessageRow {
            id: row.get(0)?,
            channel_id: row.get(1)?,
            sender_id: row.get(2)?,
            sender_name: row.get(3)?,
            body: row.get(4)?,
            image_ref: row.get(5)?,
            created_at: row.get(6)?,
        })
    };

    // Fetch newest-first so LIMIT keeps the rows adjacent to the cursor,
    // then reverse into ascending order for the caller.
    let mut rows = match before {
        Some(cursor) => {
            let mut stmt = conn.prepare(
                "SELECT id, channel_id, sender_id, sender_name, body, image_ref, created_at
                 FROM messages
                 WHERE channel_id = ?1 AND created_at < ?2
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?3",
            )?;
            stmt.query_map(rusqlite::params![channel_id, cursor, limit], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, channel_id, sender_id, sender_name, body, image_ref, created_at
                 FROM messages
                 WHERE channel_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )?;
            stmt.query_map(rusqlite::params![channel_id, limit], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    rows.reverse();
    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode_timestamp;
    use chrono::{Duration, TimeZone, Utc};

    const CHANNEL: &str = "00000000-0000-0000-0000-000000000002";

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "alice", "USER").unwrap();
        db.create_user("u2", "bob", "GROUP_ADMIN").unwrap();
        db.create_user("u3", "carol", "SUPER_ADMIN").unwrap();
        db
    }

    fn ts(offset_ms: i64) -> String {
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        encode_timestamp(base + Duration::milliseconds(offset_ms))
    }

    #[test]
    fn append_then_page_round_trips() {
        let db = test_db();
        let id = db
            .insert_message(CHANNEL, "u1", "alice", Some("hi"), None, &ts(0))
            .unwrap();

        let page = db.get_messages(CHANNEL, 50, None).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, id);
        assert_eq!(page[0].sender_name, "alice");
        assert_eq!(page[0].body.as_deref(), Some("hi"));
        assert!(page[0].image_ref.is_none());
        assert_eq!(page[0].created_at, ts(0));
    }

    #[test]
    fn pages_ascend_with_id_tiebreak_on_equal_timestamps() {
        let db = test_db();
        // Same timestamp at millisecond resolution — insertion order decides.
        let first = db
            .insert_message(CHANNEL, "u1", "alice", Some("one"), None, &ts(100))
            .unwrap();
        let second = db
            .insert_message(CHANNEL, "u2", "bob", Some("two"), None, &ts(100))
            .unwrap();
        db.insert_message(CHANNEL, "u1", "alice", Some("zero"), None, &ts(50))
            .unwrap();

        let page = db.get_messages(CHANNEL, 50, None).unwrap();
        let ids: Vec<i64> = page.iter().map(|m| m.id).collect();
        assert_eq!(page[0].body.as_deref(), Some("zero"));
        assert_eq!(ids[1], first);
        assert_eq!(ids[2], second);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn before_cursor_walks_full_history_without_gaps() {
        let db = test_db();
        for i in 0..5 {
            db.insert_message(
                CHANNEL,
                "u1",
                "alice",
                Some(&format!("m{i}")),
                None,
                &ts(i * 10),
            )
            .unwrap();
        }

        let mut seen: Vec<String> = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = db.get_messages(CHANNEL, 1, cursor.as_deref()).unwrap();
            let Some(msg) = page.into_iter().next() else {
                break;
            };
            cursor = Some(msg.created_at.clone());
            seen.push(msg.body.unwrap());
        }

        // Walked newest to oldest, one message per page, no duplicates.
        assert_eq!(seen, vec!["m4", "m3", "m2", "m1", "m0"]);
    }

    #[test]
    fn page_limits_to_newest_rows_before_cursor() {
        let db = test_db();
        for i in 0..4 {
            db.insert_message(CHANNEL, "u1", "alice", Some(&format!("m{i}")), None, &ts(i))
                .unwrap();
        }
        let page = db.get_messages(CHANNEL, 2, Some(&ts(3))).unwrap();
        let bodies: Vec<_> = page.iter().map(|m| m.body.as_deref().unwrap()).collect();
        // The two newest rows strictly older than the cursor, in ascending order.
        assert_eq!(bodies, vec!["m1", "m2"]);
    }

    #[test]
    fn ban_is_idempotent() {
        let db = test_db();
        assert!(db.upsert_ban(CHANNEL, "u1", "spam", "u3", &ts(0)).unwrap());
        assert!(!db.upsert_ban(CHANNEL, "u1", "spam again", "u3", &ts(1)).unwrap());

        let bans = db.bans_for_channel(CHANNEL).unwrap();
        assert_eq!(bans.len(), 1);
        // First record wins — the duplicate did not overwrite it.
        assert_eq!(bans[0].reason, "spam");
        assert!(db.is_banned(CHANNEL, "u1").unwrap());
    }

    #[test]
    fn unban_removes_record_and_tolerates_absence() {
        let db = test_db();
        db.upsert_ban(CHANNEL, "u1", "spam", "u3", &ts(0)).unwrap();
        db.delete_ban(CHANNEL, "u1").unwrap();
        assert!(!db.is_banned(CHANNEL, "u1").unwrap());

        // Deleting again is fine.
        db.delete_ban(CHANNEL, "u1").unwrap();
    }

    #[test]
    fn ban_reports_join_display_names() {
        let db = test_db();
        db.upsert_ban(CHANNEL, "u1", "spam", "u3", &ts(0)).unwrap();

        let reports = db.ban_reports().unwrap();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.channel_name.as_deref(), Some("general"));
        assert_eq!(report.group_name.as_deref(), Some("general"));
        assert_eq!(report.username.as_deref(), Some("alice"));
        assert_eq!(report.banned_by_name.as_deref(), Some("carol"));
        assert_eq!(report.reason, "spam");
    }

    #[test]
    fn ban_reports_survive_deleted_users() {
        let db = test_db();
        db.upsert_ban(CHANNEL, "ghost-user", "spam", "u3", &ts(0)).unwrap();

        let reports = db.ban_reports().unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].username.is_none());
        assert_eq!(reports[0].banned_by_name.as_deref(), Some("carol"));
    }

    #[test]
    fn channel_lookup_includes_group_name() {
        let db = test_db();
        let ch = db.get_channel(CHANNEL).unwrap().unwrap();
        assert_eq!(ch.name, "general");
        assert_eq!(ch.group_name, "general");
        assert!(db.get_channel("missing").unwrap().is_none());
    }
}
