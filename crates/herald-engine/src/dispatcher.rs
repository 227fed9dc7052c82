//! Dispatcher: executes a delivery plan against the transport with bounded
//! fan-out. Failures are isolated per recipient — one bad chat never stalls
//! the rest of the plan.

use std::sync::Arc;
use std::time::Duration;

use herald_db::{Database, StoreError};
use herald_types::events::{Delivery, Notification};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, warn};

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum SendError {
    /// Network trouble or rate limiting; worth retrying.
    #[error("transient delivery failure: {0}")]
    Transient(String),
    /// The recipient is gone for good (blocked the bot, deleted the chat).
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

/// Outbound message channel. Implementations are expected to carry their
/// own per-call timeout and report it as `Transient`.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        chat_id: i64,
        note: &Notification,
        silent: bool,
    ) -> impl Future<Output = Result<(), SendError>> + Send;
}

pub struct Dispatcher<T: Transport> {
    db: Arc<Database>,
    transport: Arc<T>,
    permits: Arc<Semaphore>,
    max_attempts: u32,
}

impl<T: Transport> Dispatcher<T> {
    /// `fanout_limit` caps in-flight sends; the platform side imposes a
    /// global rate ceiling, so unbounded fan-out only buys 429s.
    pub fn new(db: Arc<Database>, transport: Arc<T>, fanout_limit: usize, max_attempts: u32) -> Self {
        Self {
            db,
            transport,
            permits: Arc::new(Semaphore::new(fanout_limit)),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Send every tuple in the plan. Resolves once all recipients have
    /// either been delivered to, dropped after retries, or removed.
    pub async fn deliver(&self, plan: Vec<Delivery>) {
        let mut tasks = JoinSet::new();

        let mut pending = plan.into_iter();
        while let Some(delivery) = pending.next() {
            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    // Semaphore closed: shutting down.
                    warn!(
                        "Fan-out stopped, abandoning {} undelivered notifications",
                        pending.len() + 1
                    );
                    break;
                }
            };

            let db = Arc::clone(&self.db);
            let transport = Arc::clone(&self.transport);
            let max_attempts = self.max_attempts;

            tasks.spawn(async move {
                let _permit = permit;
                send_one(db, transport, delivery, max_attempts).await;
            });
        }

        while tasks.join_next().await.is_some() {}
    }
}

async fn send_one<T: Transport>(
    db: Arc<Database>,
    transport: Arc<T>,
    delivery: Delivery,
    max_attempts: u32,
) {
    let note: Notification = delivery.notification();

    for attempt in 1..=max_attempts {
        match transport.send(delivery.chat_id, &note, delivery.silent).await {
            Ok(()) => {
                debug!(
                    "Delivered {:?} of {} to {} (silent: {})",
                    delivery.kind, delivery.username, delivery.chat_id, delivery.silent
                );
                return;
            }
            Err(SendError::Permanent(reason)) => {
                warn!(
                    "Recipient {} is permanently unreachable ({reason}); removing subscription",
                    delivery.chat_id
                );
                match db.delete_subscriber(delivery.chat_id) {
                    Ok(()) | Err(StoreError::NotFound) => {}
                    Err(e) => error!(
                        "Failed to remove unreachable subscriber {}: {e}",
                        delivery.chat_id
                    ),
                }
                return;
            }
            Err(SendError::Transient(reason)) => {
                if attempt == max_attempts {
                    warn!(
                        "Dropping notification for {} after {attempt} attempts: {reason}",
                        delivery.chat_id
                    );
                    return;
                }
                debug!(
                    "Transient failure for {} (attempt {attempt}): {reason}; retrying",
                    delivery.chat_id
                );
                sleep(RETRY_BACKOFF * attempt).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use herald_types::events::EventKind;

    use super::*;

    /// Scripted transport: per-chat list of results to hand out, recording
    /// every attempted send. Unscripted chats always succeed.
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<HashMap<i64, Vec<Result<(), SendError>>>>,
        sent: Mutex<Vec<(i64, String, bool)>>,
    }

    impl ScriptedTransport {
        fn script(&self, chat_id: i64, results: Vec<Result<(), SendError>>) {
            self.script.lock().unwrap().insert(chat_id, results);
        }

        fn sent(&self) -> Vec<(i64, String, bool)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            chat_id: i64,
            note: &Notification,
            silent: bool,
        ) -> Result<(), SendError> {
            self.sent
                .lock()
                .unwrap()
                .push((chat_id, note.username.clone(), silent));

            let mut script = self.script.lock().unwrap();
            match script.get_mut(&chat_id) {
                Some(results) if !results.is_empty() => results.remove(0),
                _ => Ok(()),
            }
        }
    }

    fn delivery(chat_id: i64) -> Delivery {
        Delivery {
            chat_id,
            kind: EventKind::Join,
            username: "alice".to_string(),
            silent: false,
        }
    }

    fn dispatcher(transport: Arc<ScriptedTransport>) -> (Arc<Database>, Dispatcher<ScriptedTransport>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let d = Dispatcher::new(Arc::clone(&db), transport, 4, 3);
        (db, d)
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_every_tuple_in_the_plan() {
        let transport = Arc::new(ScriptedTransport::default());
        let (_db, d) = dispatcher(Arc::clone(&transport));

        d.deliver(vec![delivery(1), delivery(2), delivery(3)]).await;

        let mut chats: Vec<i64> = transport.sent().iter().map(|(id, _, _)| *id).collect();
        chats.sort();
        assert_eq!(chats, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.script(
            1,
            vec![
                Err(SendError::Transient("rate limited".to_string())),
                Err(SendError::Transient("rate limited".to_string())),
                Ok(()),
            ],
        );
        let (_db, d) = dispatcher(Arc::clone(&transport));

        d.deliver(vec![delivery(1)]).await;
        assert_eq!(transport.sent().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_dropped_after_the_attempt_budget() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.script(
            1,
            vec![
                Err(SendError::Transient("down".to_string())),
                Err(SendError::Transient("down".to_string())),
                Err(SendError::Transient("down".to_string())),
                Ok(()),
            ],
        );
        let (_db, d) = dispatcher(Arc::clone(&transport));

        d.deliver(vec![delivery(1)]).await;
        // Three attempts, then dropped — the fourth scripted result stays.
        assert_eq!(transport.sent().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_deletes_the_subscriber_without_retry() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.script(1, vec![Err(SendError::Permanent("blocked".to_string()))]);
        let (db, d) = dispatcher(Arc::clone(&transport));
        db.upsert_subscriber(1, |r| r).unwrap();

        d.deliver(vec![delivery(1)]).await;

        assert_eq!(transport.sent().len(), 1);
        assert!(matches!(db.subscriber(1), Err(StoreError::NotFound)));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_semaphore_abandons_the_plan_cleanly() {
        let transport = Arc::new(ScriptedTransport::default());
        let (_db, d) = dispatcher(Arc::clone(&transport));
        d.permits.close();

        d.deliver(vec![delivery(1), delivery(2)]).await;
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn one_dead_recipient_never_blocks_the_others() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.script(2, vec![Err(SendError::Permanent("blocked".to_string()))]);
        let (db, d) = dispatcher(Arc::clone(&transport));
        db.upsert_subscriber(2, |r| r).unwrap();

        d.deliver(vec![delivery(1), delivery(2), delivery(3)]).await;

        let delivered: Vec<i64> = transport.sent().iter().map(|(id, _, _)| *id).collect();
        assert!(delivered.contains(&1));
        assert!(delivered.contains(&3));
        assert!(matches!(db.subscriber(2), Err(StoreError::NotFound)));
    }
}
