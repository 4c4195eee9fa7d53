//! The driver trait every backing store implements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use estuary_events::{EventEnvelope, EventStream};
use estuary_types::FieldMap;

use crate::{BatchOp, ListEntry, Path, StoreQuery};

/// An ordered, at-least-once stream of collection change envelopes.
pub type ListStream = EventStream<EventEnvelope<ListEntry>>;

/// A stream of scalar snapshots: the current value on attach (when the
/// scalar exists), then one snapshot per change.
pub type ValueStream = EventStream<FieldMap>;

/// Errors surfaced by a backing-store driver.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A path segment contains characters outside `[A-Za-z0-9_]`.
    #[error("invalid path segment: {0:?}")]
    InvalidPathSegment(String),

    /// The addressed entry does not exist.
    #[error("entry not found: {path}/{id}")]
    NotFound { path: String, id: String },

    /// A backend failure, propagated unchanged. The SDK does not retry;
    /// callers re-issue the operation if they want another attempt.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// The minimum backing-store surface the SDK depends on.
///
/// Implementations must deliver `watch_list` events in arrival order and
/// never reorder them; redelivery (at-least-once) is tolerated by the
/// reconcilers upstream. All methods take `&self`; drivers are shared
/// behind an `Arc` and used concurrently.
#[async_trait]
pub trait StoreDriver: Send + Sync + 'static {
    /// Watches an identity-keyed collection. Current entries are
    /// replayed as `Added` envelopes on attach, then live changes
    /// follow. A driver failure terminates the stream with an error
    /// without affecting other watchers.
    fn watch_list(&self, path: &Path) -> ListStream;

    /// Watches a scalar document (e.g. chat metadata).
    fn watch_value(&self, path: &Path) -> ValueStream;

    /// Allocates the id of a future entry. The id is available to the
    /// caller synchronously, before the corresponding insert commits.
    fn allocate_id(&self) -> String;

    /// Creates or overwrites one entry.
    async fn insert(&self, path: &Path, id: &str, fields: FieldMap) -> Result<(), StoreError>;

    /// Merges fields into an existing entry. Fails with
    /// [`StoreError::NotFound`] if the entry does not exist.
    async fn update(&self, path: &Path, id: &str, fields: FieldMap) -> Result<(), StoreError>;

    /// Removes one entry. Removing an absent entry is a no-op.
    async fn delete(&self, path: &Path, id: &str) -> Result<(), StoreError>;

    /// Applies several operations to one collection atomically: either
    /// every operation is applied or none is.
    async fn write_batch(&self, path: &Path, ops: Vec<BatchOp>) -> Result<(), StoreError>;

    /// Runs a date-range query over one collection. Ordering and
    /// boundary semantics are those of [`StoreQuery`].
    async fn query(&self, path: &Path, query: StoreQuery) -> Result<Vec<ListEntry>, StoreError>;

    /// The canonical timestamp written on sends.
    fn server_timestamp(&self) -> DateTime<Utc>;
}
