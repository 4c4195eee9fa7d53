//! Change fan-out shared by driver implementations.

use estuary_events::{EventEnvelope, StreamError};
use futures_util::stream::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::ListEntry;

/// A change to one collection, addressed by its path.
#[derive(Clone)]
struct Change {
    path: String,
    envelope: EventEnvelope<ListEntry>,
}

/// A driver-wide broadcast of collection changes.
///
/// Drivers publish every mutation here while holding their own state
/// lock, and subscribe watchers under the same lock, so a watcher's
/// attach snapshot and its live tail never overlap or miss a change.
pub struct ChangeFeed {
    tx: broadcast::Sender<Change>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes one change. Send errors only mean nobody is watching.
    pub fn publish(&self, path: &str, envelope: EventEnvelope<ListEntry>) {
        let _ = self.tx.send(Change {
            path: path.to_string(),
            envelope,
        });
    }

    /// Subscribes to the live changes of one collection. The stream ends
    /// when the feed is dropped; a lagged subscriber skips the lost
    /// prefix with a warning.
    pub fn subscribe(
        &self,
        path: &str,
    ) -> impl Stream<Item = Result<EventEnvelope<ListEntry>, StreamError>> + Send {
        let path = path.to_string();
        BroadcastStream::new(self.tx.subscribe()).filter_map(move |result| {
            let path = path.clone();
            async move {
                match result {
                    Ok(change) if change.path == path => Some(Ok(change.envelope)),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, %path, "store watcher lagged; changes were dropped");
                        None
                    }
                }
            }
        })
    }
}
