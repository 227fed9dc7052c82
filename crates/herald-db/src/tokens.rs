//! Link-token rows. The check-and-set in `mark_consumed` is what makes a
//! token single-use: the UPDATE only matches while `consumed = 0`, so under
//! two racing redemptions exactly one caller sees a changed row.

use chrono::{DateTime, Utc};
use herald_types::models::LinkToken;
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::models::TokenRow;
use crate::{Database, StoreError};

pub fn insert_token(conn: &Connection, token: &LinkToken) -> Result<(), StoreError> {
    let row = TokenRow::from(token);
    conn.execute(
        "INSERT INTO link_tokens (id, purpose, username, issued_at, expires_at, consumed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            row.id,
            row.purpose,
            row.username,
            row.issued_at,
            row.expires_at,
            row.consumed,
        ],
    )?;
    Ok(())
}

pub fn load_token(conn: &Connection, id: &str) -> Result<Option<LinkToken>, StoreError> {
    let row = conn
        .query_row(
            "SELECT id, purpose, username, issued_at, expires_at, consumed
             FROM link_tokens WHERE id = ?1",
            [id],
            |row| {
                Ok(TokenRow {
                    id: row.get(0)?,
                    purpose: row.get(1)?,
                    username: row.get(2)?,
                    issued_at: row.get(3)?,
                    expires_at: row.get(4)?,
                    consumed: row.get(5)?,
                })
            },
        )
        .optional()?;

    row.map(LinkToken::try_from).transpose()
}

/// ISSUED -> CONSUMED transition. Returns false when the token was already
/// consumed (the second caller of a race lands here).
pub fn mark_consumed(conn: &Connection, id: &str) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE link_tokens SET consumed = 1 WHERE id = ?1 AND consumed = 0",
        [id],
    )?;
    Ok(changed > 0)
}

pub fn remove_token(conn: &Connection, id: &str) -> Result<bool, StoreError> {
    let changed = conn.execute("DELETE FROM link_tokens WHERE id = ?1", [id])?;
    Ok(changed > 0)
}

impl Database {
    /// Drop tokens that can never mutate the registry again: consumed ones
    /// and ones past their expiry. Called at startup; expiry itself is
    /// evaluated lazily at consumption, never by a background sweep.
    pub fn purge_stale_tokens(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let purged = self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM link_tokens WHERE consumed = 1 OR expires_at < ?1",
                [now.to_rfc3339()],
            )?;
            Ok(changed)
        })?;

        if purged > 0 {
            debug!("Purged {purged} stale link tokens");
        }
        Ok(purged)
    }
}
