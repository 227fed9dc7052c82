//! Notification Routing Engine: turns one presence event into a delivery
//! plan across every subscriber.

use std::collections::HashSet;
use std::sync::Arc;

use herald_db::{Database, StoreError};
use herald_types::events::{Delivery, PresenceEvent};
use tracing::debug;

use crate::mute::should_consider;
use crate::presence::OnlineSet;
use crate::Casing;

#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    /// Server usernames whose events are dropped for everyone, e.g. service
    /// accounts and the bridge's own login.
    pub ignored_usernames: HashSet<String>,
    pub casing: Casing,
}

pub struct Router {
    db: Arc<Database>,
    online: Arc<OnlineSet>,
    cfg: RouterConfig,
}

impl Router {
    pub fn new(db: Arc<Database>, online: Arc<OnlineSet>, cfg: RouterConfig) -> Self {
        Self { db, online, cfg }
    }

    /// Compute the delivery plan for `event`: one tuple per subscriber that
    /// survives the mute evaluator. The silent flag is a property of the
    /// *recipient* — their own linked identity being online silences every
    /// notification they receive, not just ones about themselves.
    ///
    /// The online cache must already reflect `event` when this runs; the
    /// pipeline guarantees that ordering.
    pub fn plan(&self, event: &PresenceEvent) -> Result<Vec<Delivery>, StoreError> {
        if self.is_ignored(&event.username) {
            debug!("Username {} is globally ignored, dropping event", event.username);
            return Ok(Vec::new());
        }

        let mut plan = Vec::new();
        self.db.for_each_subscriber(|record| {
            if !should_consider(record, event, self.cfg.casing) {
                return;
            }

            let silent = record.noon_enabled
                && record
                    .linked_username
                    .as_deref()
                    .is_some_and(|linked| self.online.is_online(linked));

            plan.push(Delivery {
                chat_id: record.chat_id,
                kind: event.kind,
                username: event.username.clone(),
                silent,
            });
        })?;

        Ok(plan)
    }

    fn is_ignored(&self, username: &str) -> bool {
        let target = self.cfg.casing.canon(username);
        self.cfg
            .ignored_usernames
            .iter()
            .any(|name| self.cfg.casing.canon(name) == target)
    }
}
