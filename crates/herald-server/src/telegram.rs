//! Telegram Bot API transport. The engine picks a template and a silence
//! flag; everything platform-specific lives here.

use std::time::Duration;

use herald_engine::dispatcher::{SendError, Transport};
use herald_types::events::{Notification, TemplateId};
use reqwest::StatusCode;
use tracing::debug;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TelegramTransport {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    server_name: String,
}

impl TelegramTransport {
    pub fn new(api_base: String, bot_token: String, server_name: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_base,
            bot_token,
            server_name,
        })
    }

    fn render(&self, note: &Notification) -> String {
        match note.template {
            TemplateId::UserJoined => {
                format!("User {} joined server {}", note.username, self.server_name)
            }
            TemplateId::UserLeft => {
                format!("User {} left server {}", note.username, self.server_name)
            }
        }
    }

    /// Raw sendMessage, also used for command replies. `silent` maps to
    /// Telegram's disable_notification.
    pub async fn send_text(&self, chat_id: i64, text: &str, silent: bool) -> Result<(), SendError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "disable_notification": silent,
        });

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SendError::Transient(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            debug!("sendMessage to {chat_id} ok (silent: {silent})");
            return Ok(());
        }

        let detail = resp.text().await.unwrap_or_default();
        Err(classify(status, &detail))
    }
}

/// Only "this recipient is gone for good" becomes `Permanent`, because
/// permanent failures delete the subscription. Everything else — rate
/// limits, server errors, even malformed-request responses — stays
/// transient and burns out against the retry budget.
fn classify(status: StatusCode, detail: &str) -> SendError {
    if status == StatusCode::FORBIDDEN {
        // Bot blocked by the user, or the account is deactivated.
        return SendError::Permanent(format!("{status}: {detail}"));
    }
    if status == StatusCode::BAD_REQUEST && detail.contains("chat not found") {
        return SendError::Permanent(format!("{status}: {detail}"));
    }
    SendError::Transient(format!("{status}: {detail}"))
}

impl Transport for TelegramTransport {
    async fn send(&self, chat_id: i64, note: &Notification, silent: bool) -> Result<(), SendError> {
        self.send_text(chat_id, &self.render(note), silent).await
    }
}
