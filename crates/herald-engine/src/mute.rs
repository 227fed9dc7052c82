//! Mute List Evaluator: the pure per-subscriber filter.

use herald_types::events::{EventKind, PresenceEvent};
use herald_types::models::{MuteMode, NotifyMode, SubscriberRecord};

use crate::Casing;

/// Should this subscriber be considered for a notification at all?
///
/// The notify-mode gate runs first, then the mute set. In blocklist mode a
/// listed username is suppressed; in allowlist mode only listed usernames
/// get through. It is the same set either way — switching modes
/// reinterprets the existing list.
pub fn should_consider(record: &SubscriberRecord, event: &PresenceEvent, casing: Casing) -> bool {
    match record.notify_mode {
        NotifyMode::None => return false,
        NotifyMode::JoinOnly if event.kind != EventKind::Join => return false,
        NotifyMode::LeaveOnly if event.kind != EventKind::Leave => return false,
        _ => {}
    }

    let target = casing.canon(&event.username);
    let listed = record
        .muted_usernames
        .iter()
        .any(|name| casing.canon(name) == target);

    match record.mute_mode {
        MuteMode::Blocklist => !listed,
        MuteMode::Allowlist => listed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber() -> SubscriberRecord {
        SubscriberRecord::new(1)
    }

    fn join(name: &str) -> PresenceEvent {
        PresenceEvent::new(name, EventKind::Join)
    }

    fn leave(name: &str) -> PresenceEvent {
        PresenceEvent::new(name, EventKind::Leave)
    }

    #[test]
    fn notify_mode_none_suppresses_everything() {
        let mut record = subscriber();
        record.notify_mode = NotifyMode::None;

        assert!(!should_consider(&record, &join("alice"), Casing::Sensitive));
        assert!(!should_consider(&record, &leave("alice"), Casing::Sensitive));
    }

    #[test]
    fn join_only_and_leave_only_match_the_event_kind() {
        let mut record = subscriber();

        record.notify_mode = NotifyMode::JoinOnly;
        assert!(should_consider(&record, &join("alice"), Casing::Sensitive));
        assert!(!should_consider(&record, &leave("alice"), Casing::Sensitive));

        record.notify_mode = NotifyMode::LeaveOnly;
        assert!(!should_consider(&record, &join("alice"), Casing::Sensitive));
        assert!(should_consider(&record, &leave("alice"), Casing::Sensitive));
    }

    #[test]
    fn blocklist_suppresses_listed_usernames() {
        let mut record = subscriber();
        record.muted_usernames.insert("bob".to_string());

        assert!(!should_consider(&record, &join("bob"), Casing::Sensitive));
        assert!(should_consider(&record, &join("alice"), Casing::Sensitive));
    }

    #[test]
    fn allowlist_reinterprets_the_same_set() {
        let mut record = subscriber();
        record.mute_mode = MuteMode::Allowlist;
        record.muted_usernames.insert("carol".to_string());

        assert!(should_consider(&record, &join("carol"), Casing::Sensitive));
        assert!(!should_consider(&record, &join("dave"), Casing::Sensitive));
    }

    #[test]
    fn casing_policy_applies_to_the_mute_set() {
        let mut record = subscriber();
        record.muted_usernames.insert("Bob".to_string());

        assert!(should_consider(&record, &join("bob"), Casing::Sensitive));
        assert!(!should_consider(&record, &join("bob"), Casing::Insensitive));
    }
}
