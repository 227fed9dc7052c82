//! Database row types and their TEXT encodings. These map directly to
//! SQLite rows; herald-types holds the API-facing models.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use herald_types::models::{LinkToken, MuteMode, NotifyMode, SubscriberRecord, TokenPurpose};

use crate::StoreError;

pub struct SubscriberRow {
    pub chat_id: i64,
    pub language: String,
    pub notify_mode: String,
    pub mute_mode: String,
    pub muted_usernames: String,
    pub noon_enabled: bool,
    pub linked_username: Option<String>,
    pub created_at: String,
}

pub struct TokenRow {
    pub id: String,
    pub purpose: String,
    pub username: Option<String>,
    pub issued_at: String,
    pub expires_at: String,
    pub consumed: bool,
}

pub fn notify_mode_str(mode: NotifyMode) -> &'static str {
    match mode {
        NotifyMode::All => "all",
        NotifyMode::JoinOnly => "join_only",
        NotifyMode::LeaveOnly => "leave_only",
        NotifyMode::None => "none",
    }
}

fn parse_notify_mode(s: &str) -> Result<NotifyMode, StoreError> {
    match s {
        "all" => Ok(NotifyMode::All),
        "join_only" => Ok(NotifyMode::JoinOnly),
        "leave_only" => Ok(NotifyMode::LeaveOnly),
        "none" => Ok(NotifyMode::None),
        other => Err(StoreError::Corrupt(format!("notify_mode '{other}'"))),
    }
}

pub fn mute_mode_str(mode: MuteMode) -> &'static str {
    match mode {
        MuteMode::Blocklist => "blocklist",
        MuteMode::Allowlist => "allowlist",
    }
}

fn parse_mute_mode(s: &str) -> Result<MuteMode, StoreError> {
    match s {
        "blocklist" => Ok(MuteMode::Blocklist),
        "allowlist" => Ok(MuteMode::Allowlist),
        other => Err(StoreError::Corrupt(format!("mute_mode '{other}'"))),
    }
}

pub fn purpose_str(purpose: TokenPurpose) -> &'static str {
    match purpose {
        TokenPurpose::Subscribe => "subscribe",
        TokenPurpose::Unsubscribe => "unsubscribe",
        TokenPurpose::NoonLink => "noon_link",
    }
}

fn parse_purpose(s: &str) -> Result<TokenPurpose, StoreError> {
    match s {
        "subscribe" => Ok(TokenPurpose::Subscribe),
        "unsubscribe" => Ok(TokenPurpose::Unsubscribe),
        "noon_link" => Ok(TokenPurpose::NoonLink),
        other => Err(StoreError::Corrupt(format!("token purpose '{other}'"))),
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{s}': {e}")))
}

impl TryFrom<SubscriberRow> for SubscriberRecord {
    type Error = StoreError;

    fn try_from(row: SubscriberRow) -> Result<Self, StoreError> {
        let muted_usernames: BTreeSet<String> = serde_json::from_str(&row.muted_usernames)
            .map_err(|e| StoreError::Corrupt(format!("muted_usernames: {e}")))?;

        Ok(SubscriberRecord {
            chat_id: row.chat_id,
            language: row.language,
            notify_mode: parse_notify_mode(&row.notify_mode)?,
            mute_mode: parse_mute_mode(&row.mute_mode)?,
            muted_usernames,
            noon_enabled: row.noon_enabled,
            linked_username: row.linked_username,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl TryFrom<&SubscriberRecord> for SubscriberRow {
    type Error = StoreError;

    fn try_from(record: &SubscriberRecord) -> Result<Self, StoreError> {
        let muted_usernames = serde_json::to_string(&record.muted_usernames)
            .map_err(|e| StoreError::Corrupt(format!("muted_usernames: {e}")))?;

        Ok(SubscriberRow {
            chat_id: record.chat_id,
            language: record.language.clone(),
            notify_mode: notify_mode_str(record.notify_mode).to_string(),
            mute_mode: mute_mode_str(record.mute_mode).to_string(),
            muted_usernames,
            noon_enabled: record.noon_enabled,
            linked_username: record.linked_username.clone(),
            created_at: record.created_at.to_rfc3339(),
        })
    }
}

impl TryFrom<TokenRow> for LinkToken {
    type Error = StoreError;

    fn try_from(row: TokenRow) -> Result<Self, StoreError> {
        Ok(LinkToken {
            id: row.id,
            purpose: parse_purpose(&row.purpose)?,
            username: row.username,
            issued_at: parse_timestamp(&row.issued_at)?,
            expires_at: parse_timestamp(&row.expires_at)?,
            consumed: row.consumed,
        })
    }
}

impl From<&LinkToken> for TokenRow {
    fn from(token: &LinkToken) -> Self {
        TokenRow {
            id: token.id.clone(),
            purpose: purpose_str(token.purpose).to_string(),
            username: token.username.clone(),
            issued_at: token.issued_at.to_rfc3339(),
            expires_at: token.expires_at.to_rfc3339(),
            consumed: token.consumed,
        }
    }
}
