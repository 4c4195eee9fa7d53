//! Scoped background task ownership.

use std::future::Future;
use std::sync::Mutex;

use tokio::task::AbortHandle;

/// Owns the abort handles of every watcher task spawned for one scope
/// (a chat or the whole session).
///
/// Disconnecting the scope aborts all of its tasks synchronously, which
/// unregisters the store listeners they hold. In-flight operations are
/// not force-cancelled, but their results die with the aborted task, so
/// nothing mutates state owned by a disconnected scope.
#[derive(Default)]
pub(crate) struct TaskBag {
    handles: Mutex<Vec<AbortHandle>>,
}

impl TaskBag {
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future).abort_handle();
        self.handles
            .lock()
            .expect("task bag lock poisoned")
            .push(handle);
    }

    /// Aborts every task spawned into this bag.
    pub fn abort_all(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().expect("task bag lock poisoned"));
        for handle in handles {
            handle.abort();
        }
    }
}

impl Drop for TaskBag {
    fn drop(&mut self) {
        self.abort_all();
    }
}
