use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            role        TEXT NOT NULL DEFAULT 'USER',
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS groups (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS channels (
            id          TEXT PRIMARY KEY,
            group_id    TEXT NOT NULL REFERENCES groups(id),
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(group_id, name)
        );

        -- Message ids are the insertion-ordered rowid, the tie-breaker when
        -- two messages share a created_at timestamp.
        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            channel_id      TEXT NOT NULL REFERENCES channels(id),
            sender_id       TEXT NOT NULL,
            sender_name     TEXT NOT NULL,
            body            TEXT,
            image_ref       TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id, created_at, id);

        -- At most one active ban per (channel, user) pair.
        CREATE TABLE IF NOT EXISTS bans (
            channel_id  TEXT NOT NULL REFERENCES channels(id),
            user_id     TEXT NOT NULL,
            reason      TEXT NOT NULL,
            banned_by   TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (channel_id, user_id)
        );

        -- Seed the default general group and channel
        INSERT OR IGNORE INTO groups (id, name)
            VALUES ('00000000-0000-0000-0000-000000000001', 'general');
        INSERT OR IGNORE INTO channels (id, group_id, name)
            VALUES ('00000000-0000-0000-0000-000000000002',
                    '00000000-0000-0000-0000-000000000001', 'general');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
