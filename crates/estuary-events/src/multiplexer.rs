//! Fan-out broadcaster with live, replay-all and latest-value views.

use std::pin::Pin;
use std::sync::Mutex;

use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast;

use crate::{EventEnvelope, StreamError};

/// A boxed stream of values or a single terminal error.
pub type EventStream<T> = Pin<Box<dyn Stream<Item = Result<T, StreamError>> + Send>>;

/// Capacity of the live broadcast channel. A subscriber that falls this
/// far behind has its oldest pending events dropped with a warning.
const LIVE_CAPACITY: usize = 1024;

/// What a subscriber receives over the live channel.
#[derive(Clone)]
enum Signal<T> {
    Item(T),
    Complete,
    Error(StreamError),
}

enum Termination {
    Complete,
    Error(StreamError),
}

struct MuxState<T> {
    /// Every value published since creation, in order. Unbounded; lives
    /// exactly as long as the multiplexer's owning scope.
    buffer: Vec<T>,
    /// The most recently published value.
    latest: Option<T>,
    terminated: Option<Termination>,
}

/// A fan-out broadcaster offering three views of one change sequence.
///
/// `publish` is synchronous with respect to all three internal sinks:
/// state updates and the live broadcast happen under one lock, and
/// subscription takes the same lock, so no subscriber can observe a
/// partially applied publish (an event present in the replay buffer but
/// not yet broadcast, or vice versa).
///
/// Completion and error termination propagate to all views and are
/// terminal: later publishes are dropped, and late subscribers replay
/// any buffered catch-up followed by the termination.
pub struct Multiplexer<T> {
    state: Mutex<MuxState<T>>,
    live_tx: broadcast::Sender<Signal<T>>,
}

impl<T: Clone + Send + 'static> Multiplexer<T> {
    pub fn new() -> Self {
        let (live_tx, _) = broadcast::channel(LIVE_CAPACITY);
        Self {
            state: Mutex::new(MuxState {
                buffer: Vec::new(),
                latest: None,
                terminated: None,
            }),
            live_tx,
        }
    }

    /// Publishes a value to all three views. Dropped silently if the
    /// multiplexer has terminated.
    pub fn publish(&self, value: T) {
        let mut state = self.state.lock().expect("multiplexer lock poisoned");
        if state.terminated.is_some() {
            tracing::debug!("publish after termination dropped");
            return;
        }
        state.buffer.push(value.clone());
        state.latest = Some(value.clone());
        // Send while holding the lock so a concurrent subscriber sees
        // this value either in its catch-up snapshot or on the live
        // channel, never both and never neither. Send errors only mean
        // there are no live subscribers.
        let _ = self.live_tx.send(Signal::Item(value));
    }

    /// Terminates the sequence normally. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("multiplexer lock poisoned");
        if state.terminated.is_some() {
            return;
        }
        state.terminated = Some(Termination::Complete);
        let _ = self.live_tx.send(Signal::Complete);
    }

    /// Terminates the sequence with an error, delivered to every view.
    /// Idempotent; only the first termination wins.
    pub fn fail(&self, error: StreamError) {
        let mut state = self.state.lock().expect("multiplexer lock poisoned");
        if state.terminated.is_some() {
            return;
        }
        state.terminated = Some(Termination::Error(error.clone()));
        let _ = self.live_tx.send(Signal::Error(error));
    }

    /// A stream of values published after this call. Nothing is
    /// replayed; events published while no subscriber is attached are
    /// dropped for this view.
    pub fn live(&self) -> EventStream<T> {
        let state = self.state.lock().expect("multiplexer lock poisoned");
        match &state.terminated {
            None => Box::pin(live_tail(self.live_tx.subscribe())),
            Some(Termination::Complete) => Box::pin(stream::empty()),
            Some(Termination::Error(e)) => {
                let e = e.clone();
                Box::pin(stream::once(async move { Err(e) }))
            }
        }
    }

    /// A stream that first delivers every value published since the
    /// multiplexer's creation, in original order, then continues live.
    pub fn replay_all(&self) -> EventStream<T> {
        let state = self.state.lock().expect("multiplexer lock poisoned");
        self.with_catch_up(state.buffer.clone(), &state.terminated)
    }

    /// A stream that immediately delivers the most recently published
    /// value, if any, then continues live. Each subscriber gets exactly
    /// one catch-up delivery of the current value, not the history.
    pub fn latest(&self) -> EventStream<T> {
        let state = self.state.lock().expect("multiplexer lock poisoned");
        self.with_catch_up(state.latest.clone().into_iter().collect(), &state.terminated)
    }

    /// Builds a view stream from a catch-up prefix plus, unless already
    /// terminated, a live tail subscribed under the caller's lock.
    fn with_catch_up(&self, catch_up: Vec<T>, terminated: &Option<Termination>) -> EventStream<T> {
        let head = stream::iter(catch_up.into_iter().map(Ok));
        match terminated {
            None => Box::pin(head.chain(live_tail(self.live_tx.subscribe()))),
            Some(Termination::Complete) => Box::pin(head),
            Some(Termination::Error(e)) => {
                let e = e.clone();
                Box::pin(head.chain(stream::once(async move { Err(e) })))
            }
        }
    }
}

impl<T: Clone + Send + 'static> Default for Multiplexer<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience alias: a multiplexer of change envelopes.
pub type EnvelopeMux<T> = Multiplexer<EventEnvelope<T>>;

/// Adapts a broadcast receiver into a terminating stream. Ends on
/// `Complete`, after yielding the error on `Error`, or when the sender
/// is dropped. Lagged subscribers skip the lost prefix with a warning,
/// mirroring how a slow fan-out consumer is handled elsewhere in the
/// stack.
fn live_tail<T: Clone + Send + 'static>(
    rx: broadcast::Receiver<Signal<T>>,
) -> impl Stream<Item = Result<T, StreamError>> + Send {
    stream::unfold(Some(rx), |rx| async move {
        let mut rx = rx?;
        loop {
            match rx.recv().await {
                Ok(Signal::Item(value)) => return Some((Ok(value), Some(rx))),
                Ok(Signal::Complete) => return None,
                Ok(Signal::Error(e)) => return Some((Err(e), None)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "multiplexer live subscriber lagged; events were dropped for this view");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio::time::{timeout, Duration};

    async fn next_ok<T: Clone>(stream: &mut EventStream<T>) -> T {
        timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("stream should yield in time")
            .expect("stream should not end")
            .expect("stream should not error")
    }

    #[tokio::test]
    async fn replay_all_delivers_history_then_live() {
        let mux = Multiplexer::new();
        mux.publish(1);
        mux.publish(2);
        mux.publish(3);

        let mut replay = mux.replay_all();
        let mut live = mux.live();

        for expected in [1, 2, 3] {
            assert_eq!(next_ok(&mut replay).await, expected);
        }

        mux.publish(4);
        assert_eq!(next_ok(&mut replay).await, 4);
        // The live view saw none of the first three.
        assert_eq!(next_ok(&mut live).await, 4);
    }

    #[tokio::test]
    async fn latest_delivers_current_value_once_per_subscriber() {
        let mux = Multiplexer::new();
        mux.publish("a");
        mux.publish("b");

        let mut first = mux.latest();
        let mut second = mux.latest();

        assert_eq!(next_ok(&mut first).await, "b");
        assert_eq!(next_ok(&mut second).await, "b");

        mux.publish("c");
        assert_eq!(next_ok(&mut first).await, "c");
        assert_eq!(next_ok(&mut second).await, "c");
    }

    #[tokio::test]
    async fn latest_on_empty_multiplexer_delivers_nothing_until_publish() {
        let mux = Multiplexer::new();
        let mut latest = mux.latest();
        mux.publish(9);
        assert_eq!(next_ok(&mut latest).await, 9);
    }

    #[tokio::test]
    async fn close_terminates_every_view() {
        let mux = Multiplexer::new();
        mux.publish(1);

        let mut live = mux.live();
        let mut replay = mux.replay_all();

        mux.close();
        mux.publish(2); // dropped

        assert!(live.next().await.is_none());
        assert_eq!(next_ok(&mut replay).await, 1);
        assert!(replay.next().await.is_none());
    }

    #[tokio::test]
    async fn error_is_delivered_then_terminal() {
        let mux = Multiplexer::new();
        mux.publish(1);

        let mut replay = mux.replay_all();
        mux.fail(StreamError::new("listener failed"));

        assert_eq!(next_ok(&mut replay).await, 1);
        let err = replay.next().await.expect("error should be delivered");
        assert!(err.is_err());
        assert!(replay.next().await.is_none());

        // A late subscriber replays the buffer, then the error.
        let mut late = mux.replay_all();
        assert_eq!(next_ok(&mut late).await, 1);
        assert!(late.next().await.unwrap().is_err());
        assert!(late.next().await.is_none());

        // A late live subscriber gets only the error.
        let mut late_live = mux.live();
        assert!(late_live.next().await.unwrap().is_err());
        assert!(late_live.next().await.is_none());
    }

    #[tokio::test]
    async fn dropping_the_multiplexer_ends_live_streams() {
        let mux = Multiplexer::new();
        mux.publish(1);
        let mut replay = mux.replay_all();
        assert_eq!(next_ok(&mut replay).await, 1);
        drop(mux);
        assert!(replay.next().await.is_none());
    }
}
