use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS subscribers (
            chat_id         INTEGER PRIMARY KEY,
            language        TEXT NOT NULL DEFAULT 'en',
            notify_mode     TEXT NOT NULL DEFAULT 'all',
            mute_mode       TEXT NOT NULL DEFAULT 'blocklist',
            muted_usernames TEXT NOT NULL DEFAULT '[]',
            noon_enabled    INTEGER NOT NULL DEFAULT 0,
            linked_username TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_subscribers_linked
            ON subscribers(linked_username);

        CREATE TABLE IF NOT EXISTS link_tokens (
            id          TEXT PRIMARY KEY,
            purpose     TEXT NOT NULL,
            username    TEXT,
            issued_at   TEXT NOT NULL,
            expires_at  TEXT NOT NULL,
            consumed    INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_link_tokens_expiry
            ON link_tokens(expires_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
