//! Online Presence Cache: the process-wide set of usernames currently on
//! the server. Only current membership matters; no history is kept.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use herald_types::events::{EventKind, PresenceEvent};
use tracing::debug;

use crate::Casing;

pub struct OnlineSet {
    casing: Casing,
    inner: RwLock<HashSet<String>>,
}

impl OnlineSet {
    pub fn new(casing: Casing) -> Self {
        Self {
            casing,
            inner: RwLock::new(HashSet::new()),
        }
    }

    /// Replace the whole membership, used to seed the cache from the
    /// presence source's online snapshot at startup.
    pub fn seed<I>(&self, usernames: I)
    where
        I: IntoIterator<Item = String>,
    {
        let fresh: HashSet<String> = usernames
            .into_iter()
            .map(|u| self.casing.canon(&u))
            .collect();
        debug!("Seeded online cache with {} users", fresh.len());
        *self.write() = fresh;
    }

    /// Update membership for one event. Duplicate joins and leaves for
    /// absent usernames are no-ops, so duplicate transport delivery cannot
    /// corrupt the cache.
    pub fn apply(&self, event: &PresenceEvent) {
        let key = self.casing.canon(&event.username);
        match event.kind {
            EventKind::Join => {
                self.write().insert(key);
            }
            EventKind::Leave => {
                self.write().remove(&key);
            }
        }
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.read().contains(&self.casing.canon(username))
    }

    // The guarded value is a plain HashSet; a poisoned lock still holds a
    // usable set, so recover instead of propagating.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashSet<String>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashSet<String>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
