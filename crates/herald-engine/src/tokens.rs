//! Link Token Service: issues and redeems the single-use tokens that bind
//! a server username to a subscribe/unsubscribe/NOON-link action.
//!
//! Redemption runs as one transaction covering both the token
//! check-and-set and the registry mutation, so "token consumed, registry
//! not yet updated" is never an observable state. Expiry is evaluated
//! lazily at consumption time; there is no background sweep.

use std::sync::Arc;

use chrono::{Duration, Utc};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use herald_db::{registry, tokens as token_store, Database, StoreError};
use herald_types::models::{LinkToken, SubscriberRecord, TokenPurpose};
use rand::RngCore;
use thiserror::Error;
use tracing::{debug, info};

const TOKEN_BYTES: usize = 24;

#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error("unknown token")]
    UnknownToken,
    #[error("token expired")]
    Expired,
    #[error("token already consumed")]
    Conflict,
    #[error("caller is not subscribed")]
    NotSubscribed,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a successful redemption did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Subscribed,
    Unsubscribed,
    NoonLinked,
}

pub struct LinkTokenService {
    db: Arc<Database>,
    ttl: Duration,
}

impl LinkTokenService {
    pub fn new(db: Arc<Database>, ttl_secs: i64) -> Self {
        Self {
            db,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Issue a fresh token. Outstanding tokens for the same username stay
    /// valid — a user retrying the server-side command just gets another
    /// link.
    pub fn issue(
        &self,
        purpose: TokenPurpose,
        username: Option<String>,
    ) -> Result<LinkToken, StoreError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);

        let now = Utc::now();
        let token = LinkToken {
            id: URL_SAFE_NO_PAD.encode(bytes),
            purpose,
            username,
            issued_at: now,
            expires_at: now + self.ttl,
            consumed: false,
        };

        self.db.with_conn(|conn| token_store::insert_token(conn, &token))?;
        debug!("Issued {:?} token for {:?}", purpose, token.username);
        Ok(token)
    }

    /// Redeem `token_id` on behalf of the platform user `chat_id`.
    ///
    /// Exactly one of two racing calls for the same token succeeds; the
    /// other sees `Conflict` and causes no mutation. A spent attempt against
    /// a valid token counts even when the purpose mutation has nothing to do
    /// (`NotSubscribed`): the token is single-use, not single-success.
    pub fn consume(&self, token_id: &str, chat_id: i64) -> Result<ConsumeOutcome, ConsumeError> {
        let outcome = self.db.with_tx(|tx| {
            let Some(token) = token_store::load_token(tx, token_id)? else {
                return Ok(Err(ConsumeError::UnknownToken));
            };

            if token.is_expired(Utc::now()) {
                // ISSUED -> EXPIRED is terminal; the row is purgeable now.
                token_store::remove_token(tx, token_id)?;
                return Ok(Err(ConsumeError::Expired));
            }

            if !token_store::mark_consumed(tx, token_id)? {
                return Ok(Err(ConsumeError::Conflict));
            }

            match token.purpose {
                TokenPurpose::Subscribe => {
                    let mut record = registry::load_subscriber(tx, chat_id)?
                        .unwrap_or_else(|| SubscriberRecord::new(chat_id));

                    if let Some(linked) = &token.username {
                        // Re-linking the same identity keeps the NOON choice;
                        // linking a different one resets it.
                        if record.linked_username.as_deref() != Some(linked.as_str()) {
                            record.noon_enabled = false;
                        }
                        record.linked_username = Some(linked.clone());
                    }

                    registry::store_subscriber(tx, &record)?;
                    Ok(Ok(ConsumeOutcome::Subscribed))
                }
                TokenPurpose::Unsubscribe => {
                    if registry::remove_subscriber(tx, chat_id)? {
                        Ok(Ok(ConsumeOutcome::Unsubscribed))
                    } else {
                        Ok(Err(ConsumeError::NotSubscribed))
                    }
                }
                TokenPurpose::NoonLink => {
                    let Some(linked) = &token.username else {
                        return Err(StoreError::Corrupt(
                            "noon_link token without username".to_string(),
                        ));
                    };

                    let mut record = registry::load_subscriber(tx, chat_id)?
                        .unwrap_or_else(|| SubscriberRecord::new(chat_id));
                    record.linked_username = Some(linked.clone());
                    record.noon_enabled = true;
                    registry::store_subscriber(tx, &record)?;
                    Ok(Ok(ConsumeOutcome::NoonLinked))
                }
            }
        })?;

        if let Ok(done) = &outcome {
            info!("Token redeemed by {chat_id}: {done:?}");
        }
        outcome
    }
}

/// The deep-link URL a server-side user taps to reach the bot with the
/// token as the start parameter.
pub fn deep_link(bot_username: &str, token_id: &str) -> String {
    format!("https://t.me/{bot_username}?start={token_id}")
}

#[cfg(test)]
mod tests {
    use std::thread;

    use herald_types::models::{MuteMode, NotifyMode};

    use super::*;

    fn service(ttl_secs: i64) -> LinkTokenService {
        LinkTokenService::new(Arc::new(Database::open_in_memory().unwrap()), ttl_secs)
    }

    #[test]
    fn subscribe_creates_record_with_defaults_and_link() {
        let svc = service(300);
        let token = svc
            .issue(TokenPurpose::Subscribe, Some("erin".to_string()))
            .unwrap();

        let outcome = svc.consume(&token.id, 42).unwrap();
        assert_eq!(outcome, ConsumeOutcome::Subscribed);

        let record = svc.db.subscriber(42).unwrap();
        assert_eq!(record.notify_mode, NotifyMode::All);
        assert_eq!(record.mute_mode, MuteMode::Blocklist);
        assert!(!record.noon_enabled);
        assert_eq!(record.linked_username.as_deref(), Some("erin"));
    }

    #[test]
    fn resubscribe_with_same_link_preserves_noon() {
        let svc = service(300);
        let first = svc
            .issue(TokenPurpose::NoonLink, Some("erin".to_string()))
            .unwrap();
        svc.consume(&first.id, 42).unwrap();
        assert!(svc.db.subscriber(42).unwrap().noon_enabled);

        let again = svc
            .issue(TokenPurpose::Subscribe, Some("erin".to_string()))
            .unwrap();
        svc.consume(&again.id, 42).unwrap();
        assert!(svc.db.subscriber(42).unwrap().noon_enabled);
    }

    #[test]
    fn subscribing_to_a_different_identity_resets_noon() {
        let svc = service(300);
        let noon = svc
            .issue(TokenPurpose::NoonLink, Some("erin".to_string()))
            .unwrap();
        svc.consume(&noon.id, 42).unwrap();

        let relink = svc
            .issue(TokenPurpose::Subscribe, Some("frank".to_string()))
            .unwrap();
        svc.consume(&relink.id, 42).unwrap();

        let record = svc.db.subscriber(42).unwrap();
        assert_eq!(record.linked_username.as_deref(), Some("frank"));
        assert!(!record.noon_enabled);
    }

    #[test]
    fn noon_link_always_enables() {
        let svc = service(300);
        let sub = svc
            .issue(TokenPurpose::Subscribe, Some("erin".to_string()))
            .unwrap();
        svc.consume(&sub.id, 42).unwrap();
        assert!(!svc.db.subscriber(42).unwrap().noon_enabled);

        let noon = svc
            .issue(TokenPurpose::NoonLink, Some("erin".to_string()))
            .unwrap();
        svc.consume(&noon.id, 42).unwrap();
        assert!(svc.db.subscriber(42).unwrap().noon_enabled);
    }

    #[test]
    fn unsubscribe_deletes_the_record() {
        let svc = service(300);
        let sub = svc
            .issue(TokenPurpose::Subscribe, Some("erin".to_string()))
            .unwrap();
        svc.consume(&sub.id, 42).unwrap();

        let unsub = svc.issue(TokenPurpose::Unsubscribe, None).unwrap();
        assert_eq!(
            svc.consume(&unsub.id, 42).unwrap(),
            ConsumeOutcome::Unsubscribed
        );
        assert!(matches!(svc.db.subscriber(42), Err(StoreError::NotFound)));
    }

    #[test]
    fn unsubscribe_of_a_non_subscriber_spends_the_token() {
        let svc = service(300);
        let unsub = svc.issue(TokenPurpose::Unsubscribe, None).unwrap();

        assert!(matches!(
            svc.consume(&unsub.id, 42),
            Err(ConsumeError::NotSubscribed)
        ));
        // Spent: the second attempt conflicts rather than repeating.
        assert!(matches!(
            svc.consume(&unsub.id, 42),
            Err(ConsumeError::Conflict)
        ));
    }

    #[test]
    fn unknown_token_is_rejected() {
        let svc = service(300);
        assert!(matches!(
            svc.consume("no-such-token", 42),
            Err(ConsumeError::UnknownToken)
        ));
    }

    #[test]
    fn expired_token_never_mutates_the_registry() {
        let svc = service(-1);
        let token = svc
            .issue(TokenPurpose::Subscribe, Some("erin".to_string()))
            .unwrap();

        assert!(matches!(
            svc.consume(&token.id, 42),
            Err(ConsumeError::Expired)
        ));
        assert!(matches!(svc.db.subscriber(42), Err(StoreError::NotFound)));
    }

    #[test]
    fn second_consume_conflicts_and_mutates_once() {
        let svc = service(300);
        let token = svc
            .issue(TokenPurpose::Subscribe, Some("erin".to_string()))
            .unwrap();

        assert_eq!(
            svc.consume(&token.id, 42).unwrap(),
            ConsumeOutcome::Subscribed
        );
        assert!(matches!(
            svc.consume(&token.id, 43),
            Err(ConsumeError::Conflict)
        ));
        // The loser caused no registry mutation.
        assert!(matches!(svc.db.subscriber(43), Err(StoreError::NotFound)));
    }

    #[test]
    fn concurrent_consume_has_exactly_one_winner() {
        let svc = Arc::new(service(300));
        let token = svc
            .issue(TokenPurpose::Subscribe, Some("erin".to_string()))
            .unwrap();

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let svc = Arc::clone(&svc);
                let id = token.id.clone();
                thread::spawn(move || svc.consume(&id, 42 + i))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(ConsumeError::Conflict)))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 1);
    }

    #[test]
    fn issuing_again_keeps_the_earlier_token_valid() {
        let svc = service(300);
        let first = svc
            .issue(TokenPurpose::Subscribe, Some("erin".to_string()))
            .unwrap();
        let second = svc
            .issue(TokenPurpose::Subscribe, Some("erin".to_string()))
            .unwrap();
        assert_ne!(first.id, second.id);

        assert!(svc.consume(&first.id, 1).is_ok());
        assert!(svc.consume(&second.id, 2).is_ok());
    }
}
