//! Subscriber Registry: the durable keyed store of subscription records.
//!
//! All mutation goes through `upsert_subscriber`, which applies a pure
//! mutator to the current record (or a fresh default) inside one
//! transaction — no caller ever reads then writes as two steps. The free
//! functions over `&Connection` exist so the token service can compose a
//! registry mutation with a token check-and-set in a single transaction.

use herald_types::models::SubscriberRecord;
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::models::SubscriberRow;
use crate::{Database, StoreError};

impl Database {
    pub fn subscriber(&self, chat_id: i64) -> Result<SubscriberRecord, StoreError> {
        self.with_conn(|conn| load_subscriber(conn, chat_id))?
            .ok_or(StoreError::NotFound)
    }

    /// Apply `mutate` to the stored record (or a fresh default) and persist
    /// the result atomically. Returns the record as persisted.
    pub fn upsert_subscriber<F>(&self, chat_id: i64, mutate: F) -> Result<SubscriberRecord, StoreError>
    where
        F: FnOnce(SubscriberRecord) -> SubscriberRecord,
    {
        self.with_tx(|tx| {
            let current =
                load_subscriber(tx, chat_id)?.unwrap_or_else(|| SubscriberRecord::new(chat_id));
            let next = mutate(current);
            store_subscriber(tx, &next)?;
            Ok(next)
        })
    }

    /// Like `upsert_subscriber`, but never creates: preference commands may
    /// only touch records that already exist. `NotFound` when there is no
    /// record for `chat_id`.
    pub fn update_subscriber<F>(&self, chat_id: i64, mutate: F) -> Result<SubscriberRecord, StoreError>
    where
        F: FnOnce(SubscriberRecord) -> SubscriberRecord,
    {
        self.with_tx(|tx| {
            let current = load_subscriber(tx, chat_id)?.ok_or(StoreError::NotFound)?;
            let next = mutate(current);
            store_subscriber(tx, &next)?;
            Ok(next)
        })
    }

    pub fn delete_subscriber(&self, chat_id: i64) -> Result<(), StoreError> {
        let removed = self.with_conn(|conn| remove_subscriber(conn, chat_id))?;
        if removed {
            debug!("Deleted subscriber {chat_id}");
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    /// Visit every subscriber record. Enumeration order is unspecified.
    pub fn for_each_subscriber<F>(&self, mut visit: F) -> Result<(), StoreError>
    where
        F: FnMut(&SubscriberRecord),
    {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT chat_id, language, notify_mode, mute_mode, muted_usernames,
                        noon_enabled, linked_username, created_at
                 FROM subscribers",
            )?;

            let rows = stmt.query_map([], row_to_subscriber)?;
            for row in rows {
                visit(&SubscriberRecord::try_from(row?)?);
            }
            Ok(())
        })
    }
}

pub fn load_subscriber(
    conn: &Connection,
    chat_id: i64,
) -> Result<Option<SubscriberRecord>, StoreError> {
    let row = conn
        .query_row(
            "SELECT chat_id, language, notify_mode, mute_mode, muted_usernames,
                    noon_enabled, linked_username, created_at
             FROM subscribers WHERE chat_id = ?1",
            [chat_id],
            row_to_subscriber,
        )
        .optional()?;

    row.map(SubscriberRecord::try_from).transpose()
}

pub fn store_subscriber(conn: &Connection, record: &SubscriberRecord) -> Result<(), StoreError> {
    let row = SubscriberRow::try_from(record)?;
    conn.execute(
        "INSERT OR REPLACE INTO subscribers
            (chat_id, language, notify_mode, mute_mode, muted_usernames,
             noon_enabled, linked_username, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            row.chat_id,
            row.language,
            row.notify_mode,
            row.mute_mode,
            row.muted_usernames,
            row.noon_enabled,
            row.linked_username,
            row.created_at,
        ],
    )?;
    Ok(())
}

/// Returns whether a row was actually removed.
pub fn remove_subscriber(conn: &Connection, chat_id: i64) -> Result<bool, StoreError> {
    let changed = conn.execute("DELETE FROM subscribers WHERE chat_id = ?1", [chat_id])?;
    Ok(changed > 0)
}

fn row_to_subscriber(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubscriberRow> {
    Ok(SubscriberRow {
        chat_id: row.get(0)?,
        language: row.get(1)?,
        notify_mode: row.get(2)?,
        mute_mode: row.get(3)?,
        muted_usernames: row.get(4)?,
        noon_enabled: row.get(5)?,
        linked_username: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use herald_types::models::{MuteMode, NotifyMode};

    use super::*;

    #[test]
    fn upsert_creates_with_defaults() {
        let db = Database::open_in_memory().unwrap();

        let record = db.upsert_subscriber(42, |r| r).unwrap();
        assert_eq!(record.chat_id, 42);
        assert_eq!(record.notify_mode, NotifyMode::All);
        assert_eq!(record.mute_mode, MuteMode::Blocklist);
        assert!(!record.noon_enabled);
        assert!(record.linked_username.is_none());

        let loaded = db.subscriber(42).unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn upsert_mutates_existing_record() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_subscriber(7, |r| r).unwrap();

        db.upsert_subscriber(7, |mut r| {
            r.notify_mode = NotifyMode::JoinOnly;
            r.muted_usernames.insert("bob".to_string());
            r
        })
        .unwrap();

        let loaded = db.subscriber(7).unwrap();
        assert_eq!(loaded.notify_mode, NotifyMode::JoinOnly);
        assert!(loaded.muted_usernames.contains("bob"));
    }

    #[test]
    fn update_mutates_but_never_creates() {
        let db = Database::open_in_memory().unwrap();

        let missing = db.update_subscriber(5, |mut r| {
            r.noon_enabled = true;
            r
        });
        assert!(matches!(missing, Err(StoreError::NotFound)));
        assert!(matches!(db.subscriber(5), Err(StoreError::NotFound)));

        db.upsert_subscriber(5, |r| r).unwrap();
        db.update_subscriber(5, |mut r| {
            r.mute_mode = MuteMode::Allowlist;
            r
        })
        .unwrap();
        assert_eq!(db.subscriber(5).unwrap().mute_mode, MuteMode::Allowlist);
    }

    #[test]
    fn get_missing_subscriber_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.subscriber(1), Err(StoreError::NotFound)));
    }

    #[test]
    fn delete_twice_leaves_nothing_behind() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_subscriber(9, |r| r).unwrap();

        db.delete_subscriber(9).unwrap();
        assert!(matches!(db.delete_subscriber(9), Err(StoreError::NotFound)));
        assert!(matches!(db.subscriber(9), Err(StoreError::NotFound)));
    }

    #[test]
    fn for_each_visits_all_records() {
        let db = Database::open_in_memory().unwrap();
        for id in [1, 2, 3] {
            db.upsert_subscriber(id, |r| r).unwrap();
        }

        let mut seen = Vec::new();
        db.for_each_subscriber(|r| seen.push(r.chat_id)).unwrap();
        seen.sort();
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
