//! The roster reconciler.
//!
//! Consumes an ordered, at-least-once sequence of raw collection change
//! envelopes for one logical path and maintains a materialized,
//! identity-keyed collection, re-emitting each processed envelope —
//! reinterpreted as the domain entity — through a dedicated multiplexer.

use std::sync::Mutex;

use estuary_events::{EventEnvelope, EventKind, Multiplexer, StreamError};
use estuary_store::ListEntry;
use estuary_types::{keys, MutedEntry, MutedUntil, User};
use serde_json::Value;

/// An entity that can live in a reconciled collection.
pub trait RosterEntity: Clone + Send + Sync + 'static {
    /// The identity key. At most one live entry per id at any time.
    fn entity_id(&self) -> &str;

    /// Parses the entity from a raw store entry.
    fn from_entry(entry: &ListEntry) -> Result<Self, StreamError>;

    /// Copies the updatable fields of `other` onto `self` in place,
    /// preserving the receiver's identity and position.
    fn merge_entity(&mut self, other: &Self);
}

impl RosterEntity for User {
    fn entity_id(&self) -> &str {
        &self.id
    }

    fn from_entry(entry: &ListEntry) -> Result<Self, StreamError> {
        Ok(User::from_fields(&entry.id, &entry.fields))
    }

    fn merge_entity(&mut self, other: &Self) {
        self.merge_from(other);
    }
}

impl RosterEntity for MutedEntry {
    fn entity_id(&self) -> &str {
        &self.id
    }

    fn from_entry(entry: &ListEntry) -> Result<Self, StreamError> {
        let millis = entry
            .fields
            .get(keys::DATE)
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                StreamError::new(format!("muted entry {:?} has no date field", entry.id))
            })?;
        Ok(MutedEntry::new(&entry.id, MutedUntil::from_millis(millis)))
    }

    fn merge_entity(&mut self, other: &Self) {
        self.until = other.until;
    }
}

/// A materialized, identity-keyed collection fed by one store watcher.
///
/// Envelopes are applied strictly in arrival order, one at a time, by
/// the single watcher task that owns this roster; the internal lock
/// only guards reads from other threads and is never held across an
/// `.await`.
pub(crate) struct Roster<T> {
    entries: Mutex<Vec<T>>,
    events: Multiplexer<EventEnvelope<T>>,
}

impl<T: RosterEntity> Roster<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            events: Multiplexer::new(),
        }
    }

    /// Applies one raw envelope and re-publishes it as a domain-entity
    /// envelope. Parse failures are returned without touching the
    /// collection; the caller routes them to its error stream and the
    /// pipeline continues.
    pub fn process(&self, envelope: &EventEnvelope<ListEntry>) -> Result<(), StreamError> {
        let Some(entry) = envelope.payload() else {
            self.events.publish(EventEnvelope::none());
            return Ok(());
        };
        let parsed = T::from_entry(entry)?;

        {
            let mut entries = self.entries.lock().expect("roster lock poisoned");
            let position = entries
                .iter()
                .position(|e| e.entity_id() == parsed.entity_id());
            match envelope.kind() {
                EventKind::Removed => {
                    // Removing an absent entry is a silent no-op.
                    if let Some(index) = position {
                        entries.remove(index);
                    }
                }
                EventKind::Added => {
                    // A duplicate add is idempotent; the existing entry
                    // is kept untouched.
                    if position.is_none() {
                        entries.push(parsed.clone());
                    }
                }
                EventKind::Modified => match position {
                    // In-place copy keeps identity and position stable
                    // for held snapshots taken before and after.
                    Some(index) => entries[index].merge_entity(&parsed),
                    None => entries.push(parsed.clone()),
                },
                EventKind::None => {}
            }
        }

        self.events.publish(envelope.with_payload(parsed));
        Ok(())
    }

    /// Detached copies of the current entries, in arrival order.
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.lock().expect("roster lock poisoned").clone()
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.entries
            .lock()
            .expect("roster lock poisoned")
            .iter()
            .find(|e| e.entity_id() == id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn events(&self) -> &Multiplexer<EventEnvelope<T>> {
        &self.events
    }

    pub fn close(&self) {
        self.events.close();
    }
}

/// Spawns the watcher task feeding one roster from one store path.
/// Parse failures are routed to the lane's error stream and the loop
/// continues; a listener failure terminates this watcher only.
pub(crate) fn spawn_roster_watcher<T: RosterEntity>(
    tasks: &crate::tasks::TaskBag,
    driver: &std::sync::Arc<dyn estuary_store::StoreDriver>,
    path: estuary_store::Path,
    roster: &std::sync::Arc<Roster<T>>,
    lane: &std::sync::Arc<crate::lane::MessageLane>,
) {
    use estuary_store::StoreDriver;
    use futures_util::StreamExt;

    let driver = driver.clone();
    let roster = roster.clone();
    let lane = lane.clone();
    tasks.spawn(async move {
        let mut watch = driver.watch_list(&path);
        while let Some(result) = watch.next().await {
            match result {
                Ok(envelope) => {
                    if let Err(e) = roster.process(&envelope) {
                        lane.hub().publish_error(e);
                    }
                }
                Err(e) => {
                    lane.hub().publish_error(e);
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use estuary_types::{FieldMap, RoleType};

    fn role_entry(id: &str, role: &str) -> ListEntry {
        let mut fields = FieldMap::new();
        fields.insert(keys::ROLE.to_string(), Value::from(role));
        ListEntry::new(id, fields)
    }

    #[test]
    fn duplicate_add_is_idempotent() {
        let roster: Roster<User> = Roster::new();
        let envelope = EventEnvelope::added(role_entry("alice", "owner"));
        roster.process(&envelope).unwrap();
        roster.process(&envelope).unwrap();

        let entries = roster.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].role, Some(RoleType::Owner));
    }

    #[test]
    fn duplicate_add_does_not_upgrade_to_modify() {
        let roster: Roster<User> = Roster::new();
        roster
            .process(&EventEnvelope::added(role_entry("alice", "member")))
            .unwrap();
        roster
            .process(&EventEnvelope::added(role_entry("alice", "admin")))
            .unwrap();

        // The second add is dropped, not applied as a modification.
        assert_eq!(roster.get("alice").unwrap().role, Some(RoleType::Member));
    }

    #[test]
    fn remove_then_add_reinstates_with_new_fields() {
        let roster: Roster<User> = Roster::new();
        roster
            .process(&EventEnvelope::added(role_entry("alice", "member")))
            .unwrap();
        roster
            .process(&EventEnvelope::removed(role_entry("alice", "member")))
            .unwrap();
        assert!(!roster.contains("alice"));

        roster
            .process(&EventEnvelope::added(role_entry("alice", "admin")))
            .unwrap();
        assert_eq!(roster.get("alice").unwrap().role, Some(RoleType::Admin));
    }

    #[test]
    fn remove_of_absent_id_is_a_no_op() {
        let roster: Roster<User> = Roster::new();
        roster
            .process(&EventEnvelope::removed(role_entry("ghost", "member")))
            .unwrap();
        assert!(roster.snapshot().is_empty());
    }

    #[test]
    fn modify_copies_fields_in_place() {
        let roster: Roster<User> = Roster::new();
        roster
            .process(&EventEnvelope::added(role_entry("alice", "member")))
            .unwrap();
        roster
            .process(&EventEnvelope::added(role_entry("bob", "member")))
            .unwrap();
        roster
            .process(&EventEnvelope::modified(role_entry("alice", "admin")))
            .unwrap();

        let entries = roster.snapshot();
        // Position preserved, fields updated.
        assert_eq!(entries[0].id, "alice");
        assert_eq!(entries[0].role, Some(RoleType::Admin));
        assert_eq!(entries[1].id, "bob");
    }

    #[test]
    fn modify_of_absent_id_is_treated_as_add() {
        let roster: Roster<User> = Roster::new();
        roster
            .process(&EventEnvelope::modified(role_entry("alice", "watcher")))
            .unwrap();
        assert_eq!(roster.get("alice").unwrap().role, Some(RoleType::Watcher));
    }

    #[test]
    fn snapshots_are_detached_copies() {
        let roster: Roster<User> = Roster::new();
        roster
            .process(&EventEnvelope::added(role_entry("alice", "member")))
            .unwrap();

        let mut snapshot = roster.snapshot();
        snapshot[0].role = Some(RoleType::Banned);
        assert_eq!(roster.get("alice").unwrap().role, Some(RoleType::Member));
    }

    #[test]
    fn muted_entries_parse_their_horizon() {
        let roster: Roster<MutedEntry> = Roster::new();
        let mut fields = FieldMap::new();
        fields.insert(keys::DATE.to_string(), Value::from(i64::MAX));
        roster
            .process(&EventEnvelope::added(ListEntry::new("c1", fields)))
            .unwrap();
        assert_eq!(roster.get("c1").unwrap().until, MutedUntil::Forever);
    }

    #[test]
    fn muted_entry_without_date_is_a_parse_error() {
        let roster: Roster<MutedEntry> = Roster::new();
        let err = roster
            .process(&EventEnvelope::added(ListEntry::new("c1", FieldMap::new())))
            .unwrap_err();
        assert!(err.to_string().contains("no date field"));
        assert!(roster.snapshot().is_empty());
    }
}
