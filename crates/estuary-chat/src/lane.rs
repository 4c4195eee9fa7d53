//! Shared message-lane logic.
//!
//! A lane is one ordered collection of sendables — a chat's message
//! collection or the session's own 1-to-1 inbox. The lane owns the
//! materialized sendable list and the typed event hub, reconciles the
//! store watcher's envelopes into both, and implements historic-message
//! pagination.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use estuary_events::{EventEnvelope, EventKind, StreamError};
use estuary_sendable::Sendable;
use estuary_store::{Path, StoreDriver, StoreQuery};
use futures_util::StreamExt;

use crate::hub::SendableHub;
use crate::tasks::TaskBag;
use crate::ChatError;

pub(crate) struct MessageLane {
    driver: Arc<dyn StoreDriver>,
    path: Path,
    hub: SendableHub,
    /// Sendables in arrival order, unique by id.
    sendables: Mutex<Vec<Sendable>>,
}

impl MessageLane {
    pub fn new(driver: Arc<dyn StoreDriver>, path: Path) -> Arc<Self> {
        Arc::new(Self {
            driver,
            path,
            hub: SendableHub::new(),
            sendables: Mutex::new(Vec::new()),
        })
    }

    pub fn hub(&self) -> &SendableHub {
        &self.hub
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Detached copies of the materialized sendables, in arrival order.
    pub fn sendables(&self) -> Vec<Sendable> {
        self.sendables.lock().expect("lane lock poisoned").clone()
    }

    pub fn sendables_of_kind(&self, kind: estuary_sendable::SendableKind) -> Vec<Sendable> {
        self.sendables
            .lock()
            .expect("lane lock poisoned")
            .iter()
            .filter(|s| s.is_kind(kind))
            .cloned()
            .collect()
    }

    pub fn sendable(&self, id: &str) -> Option<Sendable> {
        self.sendables
            .lock()
            .expect("lane lock poisoned")
            .iter()
            .find(|s| s.id() == id)
            .cloned()
    }

    /// Spawns the watcher task that feeds this lane. `history_limit`
    /// bounds the initial backfill: only the most recent N messages are
    /// materialized, older ones stay reachable through pagination.
    pub fn attach(lane: &Arc<Self>, tasks: &TaskBag, history_limit: Option<usize>) {
        let lane = lane.clone();
        tasks.spawn(async move {
            let horizon = match lane.backfill_horizon(history_limit).await {
                Ok(horizon) => horizon,
                Err(e) => {
                    lane.hub.publish_error(StreamError::new(e.to_string()));
                    None
                }
            };

            let mut watch = lane.driver.watch_list(&lane.path);
            while let Some(result) = watch.next().await {
                match result {
                    Ok(envelope) => lane.apply(&envelope, horizon),
                    Err(e) => {
                        // Terminal for this listener only; siblings and
                        // other chats are unaffected.
                        lane.hub.publish_error(e);
                        break;
                    }
                }
            }
        });
    }

    /// Computes the backfill cut-off: the instant just before the oldest
    /// of the most recent `limit` messages. Envelopes at or before the
    /// cut-off are skipped during reconciliation.
    async fn backfill_horizon(
        &self,
        history_limit: Option<usize>,
    ) -> Result<Option<DateTime<Utc>>, ChatError> {
        let Some(limit) = history_limit else {
            return Ok(None);
        };
        let now = self.driver.server_timestamp();
        if limit == 0 {
            return Ok(Some(now));
        }
        let recent = self.driver.query(&self.path, StoreQuery::to(now, limit)).await?;
        Ok(recent
            .first()
            .and_then(|entry| entry.date())
            .map(|oldest| oldest - Duration::milliseconds(1)))
    }

    /// Applies one watcher envelope: parse, reconcile the materialized
    /// list, route through the hub. A malformed entry is reported and
    /// skipped; it never stops the pipeline.
    pub fn apply(&self, envelope: &EventEnvelope<estuary_store::ListEntry>, horizon: Option<DateTime<Utc>>) {
        let Some(entry) = envelope.payload() else {
            return;
        };
        let sendable = match Sendable::from_fields(&entry.id, &entry.fields) {
            Ok(sendable) => sendable,
            Err(e) => {
                self.hub.publish_error(StreamError::new(e.to_string()));
                return;
            }
        };
        if let Some(horizon) = horizon {
            if sendable.date() <= horizon {
                return;
            }
        }

        {
            let mut list = self.sendables.lock().expect("lane lock poisoned");
            let position = list.iter().position(|s| s.id() == sendable.id());
            match envelope.kind() {
                EventKind::Added => {
                    if position.is_none() {
                        list.push(sendable.clone());
                    }
                }
                EventKind::Modified => match position {
                    Some(index) => list[index].merge_from(&sendable),
                    None => list.push(sendable.clone()),
                },
                EventKind::Removed => {
                    if let Some(index) = position {
                        list.remove(index);
                    }
                }
                EventKind::None => {}
            }
        }

        tracing::debug!(
            id = sendable.id(),
            kind = sendable.kind(),
            event = ?envelope.kind(),
            "sendable reconciled"
        );
        self.hub.route(&envelope.with_payload(sendable));
    }

    /// Sends a draft into this lane: allocates an id, stamps the draft
    /// and commits. The id is returned once the write completes; use
    /// [`MessageLane::send_with_id`] with a pre-allocated id to know it
    /// up front.
    pub async fn send(&self, from: &str, sendable: &Sendable) -> Result<String, ChatError> {
        let id = self.driver.allocate_id();
        self.send_with_id(&id, from, sendable).await?;
        Ok(id)
    }

    pub async fn send_with_id(
        &self,
        id: &str,
        from: &str,
        sendable: &Sendable,
    ) -> Result<(), ChatError> {
        send_to_path(self.driver.as_ref(), &self.path, id, from, sendable).await
    }

    pub fn allocate_id(&self) -> String {
        self.driver.allocate_id()
    }

    /// Deletes one sendable from this lane.
    pub async fn delete_sendable(&self, id: &str) -> Result<(), ChatError> {
        self.driver.delete(&self.path, id).await?;
        Ok(())
    }

    /// Sendables strictly after `from` and up to (including) `to`,
    /// ascending by timestamp.
    pub async fn load_more_messages(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Sendable>, ChatError> {
        self.query_sendables(StoreQuery {
            from: Some(from),
            to: Some(to),
            limit: None,
        })
        .await
    }

    /// The first `limit` sendables strictly after `from`, ascending.
    pub async fn load_more_messages_from(
        &self,
        from: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Sendable>, ChatError> {
        self.query_sendables(StoreQuery::from(from, limit)).await
    }

    /// The last `limit` sendables up to and including `to`, ascending.
    pub async fn load_more_messages_to(
        &self,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Sendable>, ChatError> {
        self.query_sendables(StoreQuery::to(to, limit)).await
    }

    /// Like [`MessageLane::load_more_messages_to`] but strictly before
    /// `to`: the boundary instant itself is excluded by stepping back
    /// one millisecond, the finest unit a wire timestamp carries.
    pub async fn load_more_messages_before(
        &self,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Sendable>, ChatError> {
        self.load_more_messages_to(to - Duration::milliseconds(1), limit)
            .await
    }

    async fn query_sendables(&self, query: StoreQuery) -> Result<Vec<Sendable>, ChatError> {
        let entries = self.driver.query(&self.path, query).await?;
        let mut sendables = Vec::with_capacity(entries.len());
        for entry in entries {
            match Sendable::from_fields(&entry.id, &entry.fields) {
                Ok(sendable) => sendables.push(sendable),
                Err(e) => {
                    tracing::warn!(id = %entry.id, error = %e, "skipping malformed sendable")
                }
            }
        }
        Ok(sendables)
    }

    /// Terminates the lane's event streams.
    pub fn close(&self) {
        self.hub.close();
    }
}

/// Stamps and commits a draft to an arbitrary messages path. Used by the
/// session to write into another user's inbox.
pub(crate) async fn send_to_path(
    driver: &dyn StoreDriver,
    path: &Path,
    id: &str,
    from: &str,
    sendable: &Sendable,
) -> Result<(), ChatError> {
    let stamped = sendable.stamped(id, from, driver.server_timestamp());
    driver.insert(path, id, stamped.to_fields()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use estuary_sendable::SendableKind;
    use estuary_store::{ListEntry, MemoryDriver};
    use estuary_types::time;

    fn lane_with_driver() -> (Arc<MessageLane>, MemoryDriver) {
        let driver = MemoryDriver::new();
        let lane = MessageLane::new(
            Arc::new(driver.clone()),
            Path::parse("estuary/prod/chats/c1/messages"),
        );
        (lane, driver)
    }

    fn entry(id: &str, millis: i64) -> ListEntry {
        let sendable = Sendable::draft(SendableKind::Message, Default::default()).stamped(
            id,
            "alice",
            time::from_millis(millis).unwrap(),
        );
        ListEntry::new(id, sendable.to_fields())
    }

    #[tokio::test]
    async fn apply_reconciles_the_materialized_list() {
        let (lane, _driver) = lane_with_driver();

        lane.apply(&EventEnvelope::added(entry("m1", 1)), None);
        lane.apply(&EventEnvelope::added(entry("m1", 1)), None);
        assert_eq!(lane.sendables().len(), 1);

        lane.apply(&EventEnvelope::modified(entry("m1", 9)), None);
        assert_eq!(
            lane.sendable("m1").unwrap().date(),
            time::from_millis(9).unwrap()
        );

        lane.apply(&EventEnvelope::removed(entry("m1", 9)), None);
        assert!(lane.sendables().is_empty());

        // Modified for an unknown id falls back to an add.
        lane.apply(&EventEnvelope::modified(entry("m2", 2)), None);
        assert!(lane.sendable("m2").is_some());
    }

    #[tokio::test]
    async fn apply_skips_entries_at_or_before_the_horizon() {
        let (lane, _driver) = lane_with_driver();
        let horizon = Some(time::from_millis(5).unwrap());

        lane.apply(&EventEnvelope::added(entry("old", 5)), horizon);
        lane.apply(&EventEnvelope::added(entry("new", 6)), horizon);

        let ids: Vec<String> = lane.sendables().iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, ["new"]);
    }

    #[tokio::test]
    async fn malformed_entries_do_not_stop_reconciliation() {
        let (lane, _driver) = lane_with_driver();

        lane.apply(
            &EventEnvelope::added(ListEntry::new("bad", Default::default())),
            None,
        );
        lane.apply(&EventEnvelope::added(entry("good", 1)), None);

        assert_eq!(lane.sendables().len(), 1);
        assert_eq!(lane.sendables()[0].id(), "good");
    }

    #[tokio::test]
    async fn pagination_boundaries() {
        let (lane, _driver) = lane_with_driver();

        for (id, millis) in [("m1", 1), ("m2", 2), ("m3", 3), ("m4", 4), ("m5", 5)] {
            let draft = Sendable::draft(SendableKind::Message, Default::default());
            let stamped = draft.stamped(id, "alice", time::from_millis(millis).unwrap());
            lane.driver
                .insert(lane.path(), id, stamped.to_fields())
                .await
                .unwrap();
        }

        let date = |ms| time::from_millis(ms).unwrap();
        let ids = |sendables: Vec<Sendable>| -> Vec<String> {
            sendables.iter().map(|s| s.id().to_string()).collect()
        };

        assert_eq!(
            ids(lane.load_more_messages(date(2), date(4)).await.unwrap()),
            ["m3", "m4"]
        );
        assert_eq!(
            ids(lane.load_more_messages_from(date(2), 2).await.unwrap()),
            ["m3", "m4"]
        );
        assert_eq!(
            ids(lane.load_more_messages_to(date(4), 2).await.unwrap()),
            ["m3", "m4"]
        );
        assert_eq!(
            ids(lane.load_more_messages_before(date(4), 1).await.unwrap()),
            ["m3"]
        );
    }

    #[tokio::test]
    async fn send_stamps_identity_and_timestamp() {
        let (lane, driver) = lane_with_driver();
        let draft = estuary_sendable::TextMessage::new("hello").into_sendable();

        let id = lane.send("alice", &draft).await.unwrap();
        assert!(!id.is_empty());

        let entries = driver
            .query(
                lane.path(),
                StoreQuery::to(driver.server_timestamp(), 10),
            )
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        let stored = Sendable::from_fields(&entries[0].id, &entries[0].fields).unwrap();
        assert_eq!(stored.id(), id);
        assert_eq!(stored.from(), "alice");
    }
}
