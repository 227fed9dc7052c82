use serde::{Deserialize, Serialize};

use crate::events::{EventKind, PresenceEvent};
use crate::models::TokenPurpose;

// -- Presence ingest --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresenceEventRequest {
    pub username: String,
    pub kind: EventKind,
}

impl From<PresenceEventRequest> for PresenceEvent {
    fn from(req: PresenceEventRequest) -> Self {
        PresenceEvent::new(req.username, req.kind)
    }
}

/// Full online roster, used to seed the cache at connector startup.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OnlineSnapshotRequest {
    pub usernames: Vec<String>,
}

// -- Link issuance --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssueLinkRequest {
    pub purpose: TokenPurpose,
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IssueLinkResponse {
    pub token: String,
    pub deep_link: String,
}

// -- Telegram webhook (the minimal slice of an Update we act on) --

#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub from: Option<TelegramUser>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
}
