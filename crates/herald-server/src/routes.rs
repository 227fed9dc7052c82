//! HTTP edge: presence ingest from the server-side connector, link
//! issuance, and the Telegram webhook.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use herald_db::Database;
use herald_engine::dispatcher::SendError;
use herald_engine::presence::OnlineSet;
use herald_engine::tokens::{deep_link, ConsumeError, ConsumeOutcome, LinkTokenService};
use herald_types::api::{
    IssueLinkRequest, IssueLinkResponse, OnlineSnapshotRequest, PresenceEventRequest,
    TelegramUpdate,
};
use herald_types::events::PresenceEvent;
use herald_types::models::TokenPurpose;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::commands;
use crate::telegram::TelegramTransport;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub online: Arc<OnlineSet>,
    pub tokens: LinkTokenService,
    pub transport: Arc<TelegramTransport>,
    pub events_tx: mpsc::Sender<PresenceEvent>,
    pub bot_username: String,
}

/// Connector pushes one presence transition. Backpressures (then fails)
/// when the pipeline queue is full or gone.
pub async fn ingest_event(
    State(state): State<AppState>,
    Json(req): Json<PresenceEventRequest>,
) -> StatusCode {
    if req.username.trim().is_empty() {
        return StatusCode::BAD_REQUEST;
    }

    match state.events_tx.send(req.into()).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => {
            error!("Presence pipeline is gone, dropping event");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Connector reports the full online roster after (re)connecting.
pub async fn seed_online(
    State(state): State<AppState>,
    Json(req): Json<OnlineSnapshotRequest>,
) -> StatusCode {
    state.online.seed(req.usernames);
    StatusCode::NO_CONTENT
}

/// Connector asks for a deep link on behalf of a server-side command
/// (/sub, /unsub, /not_on_online).
pub async fn issue_link(
    State(state): State<AppState>,
    Json(req): Json<IssueLinkRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    match req.purpose {
        TokenPurpose::Subscribe | TokenPurpose::NoonLink => {
            if req.username.as_deref().is_none_or(|u| u.trim().is_empty()) {
                return Err(StatusCode::BAD_REQUEST);
            }
        }
        TokenPurpose::Unsubscribe => {
            if req.username.is_some() {
                return Err(StatusCode::BAD_REQUEST);
            }
        }
    }

    let token = state
        .tokens
        .issue(req.purpose, req.username)
        .map_err(|e| {
            error!("Failed to issue link token: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(IssueLinkResponse {
        deep_link: deep_link(&state.bot_username, &token.id),
        token: token.id,
    }))
}

/// Telegram webhook: `/start <token>` redemption plus the preference
/// commands (`/mute`, `/unmute`, `/mutemode`, `/mode`, `/noon`). Always
/// answers 200 so Telegram does not redeliver the update.
pub async fn telegram_webhook(
    State(state): State<AppState>,
    Json(update): Json<TelegramUpdate>,
) -> StatusCode {
    let Some(message) = update.message else {
        return StatusCode::OK;
    };
    let (Some(from), Some(text)) = (message.from, message.text) else {
        return StatusCode::OK;
    };

    let reply = if let Some(token_id) = text.strip_prefix("/start ") {
        redeem_reply(&state, token_id.trim(), from.id).to_string()
    } else {
        match commands::execute(&state.db, from.id, &text) {
            Some(reply) => reply,
            None => return StatusCode::OK,
        }
    };

    if let Err(e) = state.transport.send_text(from.id, &reply, false).await {
        match e {
            SendError::Permanent(reason) => {
                warn!("Cannot reply to {} at all: {reason}", from.id)
            }
            SendError::Transient(reason) => {
                warn!("Failed to reply to {}: {reason}", from.id)
            }
        }
    }

    StatusCode::OK
}

fn redeem_reply(state: &AppState, token_id: &str, chat_id: i64) -> &'static str {
    match state.tokens.consume(token_id, chat_id) {
        Ok(ConsumeOutcome::Subscribed) => {
            "You have successfully subscribed to notifications."
        }
        Ok(ConsumeOutcome::Unsubscribed) => {
            "You have successfully unsubscribed from notifications."
        }
        Ok(ConsumeOutcome::NoonLinked) => {
            "Account linked. Notifications will be silent while you are online."
        }
        Err(ConsumeError::UnknownToken) => "Invalid or expired link.",
        Err(ConsumeError::Expired) => {
            "This link has expired. Request a new one from the server."
        }
        Err(ConsumeError::Conflict) => "This link has already been used.",
        Err(ConsumeError::NotSubscribed) => "You were not subscribed to notifications.",
        Err(ConsumeError::Store(e)) => {
            error!("Token redemption failed for {chat_id}: {e}");
            "An error occurred. Please try again later."
        }
    }
}
