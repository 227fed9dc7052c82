//! Telegram-side preference commands. Every command goes through the
//! registry's atomic update and only ever touches an existing record —
//! becoming a subscriber in the first place is token-gated.

use herald_db::{Database, StoreError};
use herald_types::models::{MuteMode, NotifyMode, SubscriberRecord};
use tracing::error;

const NOT_SUBSCRIBED: &str = "You are not subscribed to notifications.";
const TRY_LATER: &str = "An error occurred. Please try again later.";

/// Run one text command for `chat_id`. `None` means the text is not a
/// command we know; the webhook stays silent for those.
pub fn execute(db: &Database, chat_id: i64, text: &str) -> Option<String> {
    let mut parts = text.split_whitespace();
    let command = parts.next()?;
    let arg = parts.next();

    let reply = match command {
        "/mute" => {
            let Some(name) = arg else {
                return Some("Usage: /mute <username>".to_string());
            };
            match update(db, chat_id, |mut r| {
                r.muted_usernames.insert(name.to_string());
                r
            }) {
                Ok(_) => format!("{name} added to your mute list."),
                Err(reply) => reply,
            }
        }
        "/unmute" => {
            let Some(name) = arg else {
                return Some("Usage: /unmute <username>".to_string());
            };
            let mut removed = false;
            match update(db, chat_id, |mut r| {
                removed = r.muted_usernames.remove(name);
                r
            }) {
                Ok(_) if removed => format!("{name} removed from your mute list."),
                Ok(_) => format!("{name} is not in your mute list."),
                Err(reply) => reply,
            }
        }
        "/mutemode" => {
            let mode = match arg {
                Some("blocklist") => MuteMode::Blocklist,
                Some("allowlist") => MuteMode::Allowlist,
                _ => return Some("Usage: /mutemode <blocklist|allowlist>".to_string()),
            };
            // The mute list itself is kept; the mode reinterprets it.
            match update(db, chat_id, |mut r| {
                r.mute_mode = mode;
                r
            }) {
                Ok(r) => match r.mute_mode {
                    MuteMode::Blocklist => {
                        "Mute list now blocks the listed users.".to_string()
                    }
                    MuteMode::Allowlist => {
                        "Mute list now allows only the listed users.".to_string()
                    }
                },
                Err(reply) => reply,
            }
        }
        "/mode" => {
            let mode = match arg {
                Some("all") => NotifyMode::All,
                Some("join") => NotifyMode::JoinOnly,
                Some("leave") => NotifyMode::LeaveOnly,
                Some("none") => NotifyMode::None,
                _ => return Some("Usage: /mode <all|join|leave|none>".to_string()),
            };
            match update(db, chat_id, |mut r| {
                r.notify_mode = mode;
                r
            }) {
                // arg is present whenever mode parsed
                Ok(_) => format!("Notification mode set to {}.", arg.unwrap_or_default()),
                Err(reply) => reply,
            }
        }
        "/noon" => match arg {
            Some("off") => match update(db, chat_id, |mut r| {
                r.noon_enabled = false;
                r
            }) {
                Ok(_) => "Not-on-online disabled.".to_string(),
                Err(reply) => reply,
            },
            Some("on") => {
                let mut linked = false;
                match update(db, chat_id, |mut r| {
                    linked = r.linked_username.is_some();
                    if linked {
                        r.noon_enabled = true;
                    }
                    r
                }) {
                    Ok(_) if linked => "Not-on-online enabled.".to_string(),
                    Ok(_) => {
                        "Link your server account first: use the not-on-online command on the server to get a link."
                            .to_string()
                    }
                    Err(reply) => reply,
                }
            }
            _ => "Usage: /noon <on|off>".to_string(),
        },
        _ => return None,
    };

    Some(reply)
}

/// Registry update with the shared failure replies. `Err` carries the text
/// to send back.
fn update<F>(db: &Database, chat_id: i64, mutate: F) -> Result<SubscriberRecord, String>
where
    F: FnOnce(SubscriberRecord) -> SubscriberRecord,
{
    db.update_subscriber(chat_id, mutate).map_err(|e| match e {
        StoreError::NotFound => NOT_SUBSCRIBED.to_string(),
        e => {
            error!("Preference command failed for {chat_id}: {e}");
            TRY_LATER.to_string()
        }
    })
}
