use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Presence transitions observed on the voice server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Join,
    Leave,
}

/// A single join/leave transition for one server username.
/// Produced by the presence source, consumed once by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub username: String,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl PresenceEvent {
    pub fn new(username: impl Into<String>, kind: EventKind) -> Self {
        Self {
            username: username.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Message templates the transport knows how to render.
/// The core never builds platform markup — it only picks a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateId {
    UserJoined,
    UserLeft,
}

impl From<EventKind> for TemplateId {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Join => TemplateId::UserJoined,
            EventKind::Leave => TemplateId::UserLeft,
        }
    }
}

/// Content handed to the transport for one recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub template: TemplateId,
    pub username: String,
}

/// One routing decision: notify `chat_id` about `username`'s transition,
/// optionally without an audible alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub chat_id: i64,
    pub kind: EventKind,
    pub username: String,
    pub silent: bool,
}

impl Delivery {
    pub fn notification(&self) -> Notification {
        Notification {
            template: self.kind.into(),
            username: self.username.clone(),
        }
    }
}
