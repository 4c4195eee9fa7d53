//! The SQLite [`StoreDriver`] implementation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use estuary_events::{EventEnvelope, StreamError};
use estuary_store::{
    apply_query, BatchOp, ChangeFeed, ListEntry, ListStream, Path, StoreDriver, StoreError,
    StoreQuery, ValueStream,
};
use estuary_types::{keys, FieldMap};
use futures_util::stream::{self, StreamExt};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use uuid::Uuid;

use crate::migrations::run_migrations;
use crate::pool::{create_pool, DbPool, DbRuntimeSettings};
use crate::DbError;

/// Capacity of the driver-wide change broadcast.
const CHANGE_CAPACITY: usize = 1024;

/// A persistent [`StoreDriver`] on a single SQLite database.
///
/// Writes and watcher attachment serialize on one internal lock: a write
/// commits and broadcasts its change while holding it, and `watch_list`
/// takes its attach snapshot and subscribes under the same lock, so a
/// watcher observes each change exactly once — in its snapshot or on the
/// live tail, never both.
#[derive(Clone)]
pub struct SqliteDriver {
    pool: DbPool,
    shared: Arc<Shared>,
}

struct Shared {
    changes: ChangeFeed,
    /// Serializes writes against watcher attachment. Held across the
    /// SQL statement and the change broadcast; all holders run on
    /// blocking threads or in short synchronous sections.
    sync: Mutex<()>,
}

impl SqliteDriver {
    /// Opens (creating if needed) a database file and applies pending
    /// migrations. Use `:memory:` for a throwaway store.
    pub fn open(db_path: &str) -> Result<Self, DbError> {
        Self::open_with(db_path, DbRuntimeSettings::default())
    }

    pub fn open_with(db_path: &str, settings: DbRuntimeSettings) -> Result<Self, DbError> {
        let pool = create_pool(db_path, settings)?;
        let conn = pool.get()?;
        run_migrations(&conn)?;
        Ok(Self {
            pool,
            shared: Arc::new(Shared {
                changes: ChangeFeed::new(CHANGE_CAPACITY),
                sync: Mutex::new(()),
            }),
        })
    }

    /// Runs a write on the blocking pool, holding the sync lock across
    /// the statement and its change broadcast.
    async fn write<F>(&self, op: F) -> Result<(), StoreError>
    where
        F: FnOnce(&Connection, &Shared) -> Result<(), StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        let shared = self.shared.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(backend)?;
            let _guard = shared.sync.lock().expect("sqlite driver lock poisoned");
            op(&conn, &shared)
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    }
}

fn backend(error: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(error.to_string())
}

fn date_ms(fields: &FieldMap) -> Option<i64> {
    fields.get(keys::DATE).and_then(Value::as_i64)
}

fn encode_fields(fields: &FieldMap) -> Result<String, StoreError> {
    serde_json::to_string(fields).map_err(backend)
}

fn decode_fields(json: &str) -> Result<FieldMap, StoreError> {
    serde_json::from_str(json).map_err(backend)
}

/// Reads one entry's fields, if present.
fn get_fields(conn: &Connection, path: &str, id: &str) -> Result<Option<FieldMap>, StoreError> {
    let json: Option<String> = conn
        .query_row(
            "SELECT fields_json FROM entries WHERE path = ?1 AND entry_id = ?2",
            params![path, id],
            |row| row.get(0),
        )
        .optional()
        .map_err(backend)?;
    json.as_deref().map(decode_fields).transpose()
}

/// Applies one batch operation and returns the change to broadcast.
/// `Update` of a missing entry yields no change; `Delete` of a missing
/// entry is a no-op.
fn apply_op(
    conn: &Connection,
    path: &str,
    op: BatchOp,
) -> Result<Option<EventEnvelope<ListEntry>>, StoreError> {
    match op {
        BatchOp::Insert { id, fields } => {
            let json = encode_fields(&fields)?;
            let existed = get_fields(conn, path, &id)?.is_some();
            if existed {
                conn.execute(
                    "UPDATE entries SET fields_json = ?1, date_ms = ?2
                     WHERE path = ?3 AND entry_id = ?4",
                    params![json, date_ms(&fields), path, id],
                )
                .map_err(backend)?;
                Ok(Some(EventEnvelope::modified(ListEntry::new(id, fields))))
            } else {
                conn.execute(
                    "INSERT INTO entries (path, entry_id, fields_json, date_ms)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![path, id, json, date_ms(&fields)],
                )
                .map_err(backend)?;
                Ok(Some(EventEnvelope::added(ListEntry::new(id, fields))))
            }
        }
        BatchOp::Update { id, fields } => {
            let Some(mut merged) = get_fields(conn, path, &id)? else {
                return Ok(None);
            };
            for (key, value) in fields {
                merged.insert(key, value);
            }
            let json = encode_fields(&merged)?;
            conn.execute(
                "UPDATE entries SET fields_json = ?1, date_ms = ?2
                 WHERE path = ?3 AND entry_id = ?4",
                params![json, date_ms(&merged), path, id],
            )
            .map_err(backend)?;
            Ok(Some(EventEnvelope::modified(ListEntry::new(id, merged))))
        }
        BatchOp::Delete { id } => {
            let Some(fields) = get_fields(conn, path, &id)? else {
                return Ok(None);
            };
            conn.execute(
                "DELETE FROM entries WHERE path = ?1 AND entry_id = ?2",
                params![path, id],
            )
            .map_err(backend)?;
            Ok(Some(EventEnvelope::removed(ListEntry::new(id, fields))))
        }
    }
}

/// Reads a collection snapshot in arrival order.
fn snapshot(conn: &Connection, path: &str) -> Result<Vec<ListEntry>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT entry_id, fields_json FROM entries WHERE path = ?1 ORDER BY seq ASC")
        .map_err(backend)?;
    let rows = stmt
        .query_map([path], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(backend)?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, json) = row.map_err(backend)?;
        entries.push(ListEntry::new(id, decode_fields(&json)?));
    }
    Ok(entries)
}

#[async_trait]
impl StoreDriver for SqliteDriver {
    fn watch_list(&self, path: &Path) -> ListStream {
        let key = path.to_string();
        let conn = match self.pool.get() {
            Ok(conn) => conn,
            Err(e) => return error_stream(backend(e)),
        };

        let _guard = self.shared.sync.lock().expect("sqlite driver lock poisoned");
        let entries = match snapshot(&conn, &key) {
            Ok(entries) => entries,
            Err(e) => return error_stream(e),
        };
        let tail = self.shared.changes.subscribe(&key);
        drop(_guard);

        let head = stream::iter(entries.into_iter().map(|e| Ok(EventEnvelope::added(e))));
        Box::pin(head.chain(tail))
    }

    fn watch_value(&self, path: &Path) -> ValueStream {
        let Some((parent, id)) = path.split_last() else {
            return Box::pin(stream::once(async {
                Err(StreamError::new("cannot watch the store root as a value"))
            }));
        };
        let key = parent.to_string();
        let id = id.to_string();

        let conn = match self.pool.get() {
            Ok(conn) => conn,
            Err(e) => {
                let e = StreamError::new(e.to_string());
                return Box::pin(stream::once(async move { Err(e) }));
            }
        };

        let _guard = self.shared.sync.lock().expect("sqlite driver lock poisoned");
        let current = match get_fields(&conn, &key, &id) {
            Ok(current) => current,
            Err(e) => {
                let e = StreamError::new(e.to_string());
                return Box::pin(stream::once(async move { Err(e) }));
            }
        };
        let live = self.shared.changes.subscribe(&key);
        drop(_guard);

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

        Box::pin(stream::iter(current.into_iter().map(Ok)).chain(tail))
    }

    fn allocate_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    async fn insert(&self, path: &Path, id: &str, fields: FieldMap) -> Result<(), StoreError> {
        let key = path.to_string();
        let id = id.to_string();
        self.write(move |conn, shared| {
            if let Some(envelope) = apply_op(conn, &key, BatchOp::Insert { id, fields })? {
                shared.changes.publish(&key, envelope);
            }
            Ok(())
        })
        .await
    }

    async fn update(&self, path: &Path, id: &str, fields: FieldMap) -> Result<(), StoreError> {
        let key = path.to_string();
        let id = id.to_string();
        self.write(move |conn, shared| {
            match apply_op(conn, &key, BatchOp::Update { id: id.clone(), fields })? {
                Some(envelope) => {
                    shared.changes.publish(&key, envelope);
                    Ok(())
                }
                None => Err(StoreError::NotFound { path: key, id }),
            }
        })
        .await
    }

    async fn delete(&self, path: &Path, id: &str) -> Result<(), StoreError> {
        let key = path.to_string();
        let id = id.to_string();
        self.write(move |conn, shared| {
            if let Some(envelope) = apply_op(conn, &key, BatchOp::Delete { id })? {
                shared.changes.publish(&key, envelope);
            }
            Ok(())
        })
        .await
    }

    async fn write_batch(&self, path: &Path, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        let key = path.to_string();
        self.write(move |conn, shared| {
            // Validate updates up front so the batch is all-or-nothing.
            for op in &ops {
                if let BatchOp::Update { id, .. } = op {
                    if get_fields(conn, &key, id)?.is_none() {
                        return Err(StoreError::NotFound {
                            path: key.clone(),
                            id: id.clone(),
                        });
                    }
                }
            }

            conn.execute_batch("BEGIN").map_err(backend)?;
            let mut envelopes = Vec::new();
            for op in ops {
                match apply_op(conn, &key, op) {
                    Ok(Some(envelope)) => envelopes.push(envelope),
                    Ok(None) => {}
                    Err(e) => {
                        let _ = conn.execute_batch("ROLLBACK");
                        return Err(e);
                    }
                }
            }
            conn.execute_batch("COMMIT").map_err(backend)?;

            for envelope in envelopes {
                shared.changes.publish(&key, envelope);
            }
            Ok(())
        })
        .await
    }

    async fn query(&self, path: &Path, query: StoreQuery) -> Result<Vec<ListEntry>, StoreError> {
        let key = path.to_string();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(backend)?;
            Ok(apply_query(snapshot(&conn, &key)?, &query))
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    }

    fn server_timestamp(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

fn error_stream(error: StoreError) -> ListStream {
    let e = StreamError::new(error.to_string());
    Box::pin(stream::once(async move { Err(e) }))
}
