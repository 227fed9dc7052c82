//! Presence pipeline: the single sequential worker that turns the ordered
//! event stream into delivery plans.
//!
//! Events arrive through a bounded queue and are processed one at a time:
//! cache update first, plan second, so NOON decisions always observe
//! post-event membership. Dispatch fan-out inside `deliver` is the only
//! unordered stage.

use std::sync::Arc;

use herald_types::events::PresenceEvent;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::dispatcher::{Dispatcher, Transport};
use crate::presence::OnlineSet;
use crate::routing::Router;

/// Depth of the presence event queue; the ingest edge backpressures once
/// this many events are waiting.
pub const PRESENCE_QUEUE_DEPTH: usize = 256;

pub struct PresencePipeline<T: Transport> {
    online: Arc<OnlineSet>,
    router: Router,
    dispatcher: Dispatcher<T>,
}

impl<T: Transport> PresencePipeline<T> {
    pub fn new(online: Arc<OnlineSet>, router: Router, dispatcher: Dispatcher<T>) -> Self {
        Self {
            online,
            router,
            dispatcher,
        }
    }

    /// Process one event to completion.
    pub async fn handle(&self, event: PresenceEvent) {
        // Membership must be current before the router reads it.
        self.online.apply(&event);

        let plan = match self.router.plan(&event) {
            Ok(plan) => plan,
            Err(e) => {
                error!(
                    "Failed to plan {:?} for {}: {e}",
                    event.kind, event.username
                );
                return;
            }
        };

        if plan.is_empty() {
            debug!("No recipients for {:?} of {}", event.kind, event.username);
            return;
        }

        info!(
            "Dispatching {:?} of {} to {} recipients",
            event.kind,
            event.username,
            plan.len()
        );
        self.dispatcher.deliver(plan).await;
    }

    /// Drain the queue until every sender is gone.
    pub async fn run(self, mut events: mpsc::Receiver<PresenceEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        info!("Presence queue closed, pipeline stopped");
    }
}
