//! In-memory reference driver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use estuary_events::{EventEnvelope, StreamError};
use estuary_types::FieldMap;
use futures_util::stream::{self, StreamExt};
use uuid::Uuid;

use crate::driver::{ListStream, StoreDriver, StoreError, ValueStream};
use crate::{apply_query, BatchOp, ChangeFeed, ListEntry, Path, StoreQuery};

/// Capacity of the driver-wide change broadcast.
const CHANGE_CAPACITY: usize = 1024;

/// One collection: entries in arrival order, unique by id.
type Collection = Vec<(String, FieldMap)>;

struct Inner {
    /// All collections keyed by path. Lock sections are brief and never
    /// span an `.await`; the change broadcast is sent while holding the
    /// lock so watcher attachment (snapshot + subscribe, also under the
    /// lock) observes each change exactly once.
    state: Mutex<HashMap<String, Collection>>,
    changes: ChangeFeed,
}

/// An in-memory [`StoreDriver`].
///
/// Serves as the reference implementation of the driver contract and as
/// the test substrate for everything above the store seam. Contents live
/// as long as the driver; clones share the same store.
#[derive(Clone)]
pub struct MemoryDriver {
    inner: Arc<Inner>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(HashMap::new()),
                changes: ChangeFeed::new(CHANGE_CAPACITY),
            }),
        }
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    /// Sends a change while the caller holds the state lock.
    fn emit(&self, path: &str, envelope: EventEnvelope<ListEntry>) {
        self.changes.publish(path, envelope);
    }

    fn apply(&self, collection: &mut Collection, path: &str, op: BatchOp) {
        match op {
            BatchOp::Insert { id, fields } => {
                match collection.iter_mut().find(|(eid, _)| *eid == id) {
                    Some((_, existing)) => {
                        *existing = fields.clone();
                        self.emit(path, EventEnvelope::modified(ListEntry::new(id, fields)));
                    }
                    None => {
                        collection.push((id.clone(), fields.clone()));
                        self.emit(path, EventEnvelope::added(ListEntry::new(id, fields)));
                    }
                }
            }
            BatchOp::Update { id, fields } => {
                if let Some((_, existing)) = collection.iter_mut().find(|(eid, _)| *eid == id) {
                    for (key, value) in fields {
                        existing.insert(key, value);
                    }
                    let merged = existing.clone();
                    self.emit(path, EventEnvelope::modified(ListEntry::new(id, merged)));
                }
            }
            BatchOp::Delete { id } => {
                if let Some(index) = collection.iter().position(|(eid, _)| *eid == id) {
                    let (_, fields) = collection.remove(index);
                    self.emit(path, EventEnvelope::removed(ListEntry::new(id, fields)));
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl StoreDriver for MemoryDriver {
    fn watch_list(&self, path: &Path) -> ListStream {
        let key = path.to_string();
        let state = self.inner.state.lock().expect("memory store lock poisoned");
        let snapshot: Vec<EventEnvelope<ListEntry>> = state
            .get(&key)
            .into_iter()
            .flatten()
            .map(|(id, fields)| EventEnvelope::added(ListEntry::new(id.clone(), fields.clone())))
            .collect();
        let tail = self.inner.changes.subscribe(&key);
        drop(state);

        Box::pin(stream::iter(snapshot.into_iter().map(Ok)).chain(tail))
    }

    fn watch_value(&self, path: &Path) -> ValueStream {
        let Some((parent, id)) = path.split_last() else {
            return Box::pin(stream::once(async {
                Err(StreamError::new("cannot watch the store root as a value"))
            }));
        };
        let key = parent.to_string();
        let id = id.to_string();

        let state = self.inner.state.lock().expect("memory store lock poisoned");
        let snapshot: Option<FieldMap> = state
            .get(&key)
            .and_then(|c| c.iter().find(|(eid, _)| *eid == id))
            .map(|(_, fields)| fields.clone());
        let live = self.inner.changes.subscribe(&key);
        drop(state);

        let tail = live.filter_map(move |result| {
            let id = id.clone();
            async move {
                match result {
                    Ok(envelope) => envelope
                        .into_payload()
                        .filter(|entry| entry.id == id)
                        .map(|entry| Ok(entry.fields)),
                    Err(e) => Some(Err(e)),
                }
            }
        });

        Box::pin(stream::iter(snapshot.into_iter().map(Ok)).chain(tail))
    }

    fn allocate_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    async fn insert(&self, path: &Path, id: &str, fields: FieldMap) -> Result<(), StoreError> {
        let key = path.to_string();
        let mut state = self.inner.state.lock().expect("memory store lock poisoned");
        let collection = state.entry(key.clone()).or_default();
        self.inner.apply(
            collection,
            &key,
            BatchOp::Insert {
                id: id.to_string(),
                fields,
            },
        );
        Ok(())
    }

    async fn update(&self, path: &Path, id: &str, fields: FieldMap) -> Result<(), StoreError> {
        let key = path.to_string();
        let mut state = self.inner.state.lock().expect("memory store lock poisoned");
        let collection = state.entry(key.clone()).or_default();
        if !collection.iter().any(|(eid, _)| eid == id) {
            return Err(StoreError::NotFound {
                path: key,
                id: id.to_string(),
            });
        }
        self.inner.apply(
            collection,
            &key,
            BatchOp::Update {
                id: id.to_string(),
                fields,
            },
        );
        Ok(())
    }

    async fn delete(&self, path: &Path, id: &str) -> Result<(), StoreError> {
        let key = path.to_string();
        let mut state = self.inner.state.lock().expect("memory store lock poisoned");
        if let Some(collection) = state.get_mut(&key) {
            self.inner
                .apply(collection, &key, BatchOp::Delete { id: id.to_string() });
        }
        Ok(())
    }

    async fn write_batch(&self, path: &Path, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        let key = path.to_string();
        let mut state = self.inner.state.lock().expect("memory store lock poisoned");
        let collection = state.entry(key.clone()).or_default();

        // Validate first so the batch is all-or-nothing.
        for op in &ops {
            if let BatchOp::Update { id, .. } = op {
                if !collection.iter().any(|(eid, _)| eid == id) {
                    return Err(StoreError::NotFound {
                        path: key,
                        id: id.clone(),
                    });
                }
            }
        }

        for op in ops {
            self.inner.apply(collection, &key, op);
        }
        Ok(())
    }

    async fn query(&self, path: &Path, query: StoreQuery) -> Result<Vec<ListEntry>, StoreError> {
        let key = path.to_string();
        let state = self.inner.state.lock().expect("memory store lock poisoned");
        let entries: Vec<ListEntry> = state
            .get(&key)
            .into_iter()
            .flatten()
            .map(|(id, fields)| ListEntry::new(id.clone(), fields.clone()))
            .collect();
        drop(state);
        Ok(apply_query(entries, &query))
    }

    fn server_timestamp(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estuary_events::EventKind;
    use estuary_types::{keys, time};
    use serde_json::Value;
    use tokio::time::{timeout, Duration};

    fn fields(pairs: &[(&str, Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    async fn next_envelope(stream: &mut ListStream) -> EventEnvelope<ListEntry> {
        timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("watch should yield in time")
            .expect("watch should not end")
            .expect("watch should not error")
    }

    #[tokio::test]
    async fn watch_replays_current_entries_then_live_changes() {
        let driver = MemoryDriver::new();
        let path = Path::parse("estuary/prod/chats/c1/users");

        driver
            .insert(&path, "alice", fields(&[(keys::ROLE, Value::from("owner"))]))
            .await
            .unwrap();

        let mut watch = driver.watch_list(&path);
        let first = next_envelope(&mut watch).await;
        assert_eq!(first.kind(), EventKind::Added);
        assert_eq!(first.payload().unwrap().id, "alice");

        driver
            .insert(&path, "bob", fields(&[(keys::ROLE, Value::from("member"))]))
            .await
            .unwrap();
        let second = next_envelope(&mut watch).await;
        assert_eq!(second.kind(), EventKind::Added);
        assert_eq!(second.payload().unwrap().id, "bob");

        driver.delete(&path, "bob").await.unwrap();
        let third = next_envelope(&mut watch).await;
        assert_eq!(third.kind(), EventKind::Removed);
        assert_eq!(third.payload().unwrap().id, "bob");
    }

    #[tokio::test]
    async fn reinsert_becomes_a_modification() {
        let driver = MemoryDriver::new();
        let path = Path::parse("estuary/prod/chats/c1/users");
        let mut watch = driver.watch_list(&path);

        driver
            .insert(&path, "alice", fields(&[(keys::ROLE, Value::from("member"))]))
            .await
            .unwrap();
        driver
            .insert(&path, "alice", fields(&[(keys::ROLE, Value::from("admin"))]))
            .await
            .unwrap();

        assert_eq!(next_envelope(&mut watch).await.kind(), EventKind::Added);
        let modified = next_envelope(&mut watch).await;
        assert_eq!(modified.kind(), EventKind::Modified);
        assert_eq!(
            modified.payload().unwrap().fields.get(keys::ROLE),
            Some(&Value::from("admin"))
        );
    }

    #[tokio::test]
    async fn update_missing_entry_is_not_found() {
        let driver = MemoryDriver::new();
        let path = Path::parse("estuary/prod/users/alice/contacts");
        let err = driver
            .update(&path, "ghost", FieldMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_missing_entry_is_a_no_op() {
        let driver = MemoryDriver::new();
        let path = Path::parse("estuary/prod/users/alice/contacts");
        driver.delete(&path, "ghost").await.unwrap();
    }

    #[tokio::test]
    async fn batch_with_bad_update_applies_nothing() {
        let driver = MemoryDriver::new();
        let path = Path::parse("estuary/prod/chats/c1/users");

        let err = driver
            .write_batch(
                &path,
                vec![
                    BatchOp::Insert {
                        id: "alice".to_string(),
                        fields: fields(&[(keys::DATE, Value::from(1))]),
                    },
                    BatchOp::Update {
                        id: "ghost".to_string(),
                        fields: FieldMap::new(),
                    },
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        let entries = driver.query(&path, StoreQuery::default()).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn query_honors_date_bounds() {
        let driver = MemoryDriver::new();
        let path = Path::parse("estuary/prod/chats/c1/messages");
        for (id, millis) in [("m1", 1), ("m2", 2), ("m3", 3), ("m4", 4), ("m5", 5)] {
            driver
                .insert(&path, id, fields(&[(keys::DATE, Value::from(millis))]))
                .await
                .unwrap();
        }

        let result = driver
            .query(
                &path,
                StoreQuery::between(
                    time::from_millis(2).unwrap(),
                    time::from_millis(4).unwrap(),
                ),
            )
            .await
            .unwrap();
        let ids: Vec<&str> = result.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["m3", "m4"]);
    }

    #[tokio::test]
    async fn watch_value_sees_snapshot_and_updates() {
        let driver = MemoryDriver::new();
        let meta_path = Path::parse("estuary/prod/chats/c1/meta");
        let chat_path = Path::parse("estuary/prod/chats/c1");

        driver
            .insert(
                &chat_path,
                "meta",
                fields(&[(keys::NAME, Value::from("Before"))]),
            )
            .await
            .unwrap();

        let mut watch = driver.watch_value(&meta_path);
        let snapshot = timeout(Duration::from_secs(1), watch.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.get(keys::NAME), Some(&Value::from("Before")));

        driver
            .update(
                &chat_path,
                "meta",
                fields(&[(keys::NAME, Value::from("After"))]),
            )
            .await
            .unwrap();
        let updated = timeout(Duration::from_secs(1), watch.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(updated.get(keys::NAME), Some(&Value::from("After")));
    }
}
