use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which presence transitions a subscriber wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyMode {
    All,
    JoinOnly,
    LeaveOnly,
    None,
}

/// How `muted_usernames` is interpreted. The same set serves both modes:
/// switching the mode reinterprets the existing list rather than clearing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MuteMode {
    Blocklist,
    Allowlist,
}

/// Per-subscriber preference state, keyed by the messaging-platform chat id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberRecord {
    pub chat_id: i64,
    pub language: String,
    pub notify_mode: NotifyMode,
    pub mute_mode: MuteMode,
    pub muted_usernames: BTreeSet<String>,
    pub noon_enabled: bool,
    /// Server identity this subscriber linked for not-on-online suppression.
    pub linked_username: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SubscriberRecord {
    /// Fresh record with subscription defaults.
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            language: "en".to_string(),
            notify_mode: NotifyMode::All,
            mute_mode: MuteMode::Blocklist,
            muted_usernames: BTreeSet::new(),
            noon_enabled: false,
            linked_username: None,
            created_at: Utc::now(),
        }
    }
}

/// What redeeming a link token does to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Subscribe,
    Unsubscribe,
    NoonLink,
}

/// Single-use credential binding a server username to a registry mutation,
/// redeemed through a deep link. ISSUED -> CONSUMED exactly once, or
/// ISSUED -> EXPIRED; terminal tokens never touch the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkToken {
    pub id: String,
    pub purpose: TokenPurpose,
    /// Server username the token binds. Absent for unsubscribe tokens.
    pub username: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

impl LinkToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}
