//! Shared fixtures for the integration suite.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use estuary_chat::{Chat, Config, Session};
use estuary_events::{EventKind, EventStream};
use estuary_store::MemoryDriver;
use futures_util::StreamExt;
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(5);

/// Installs a subscriber once so `RUST_LOG` works for test debugging.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Connects a session with default configuration on a shared driver.
pub async fn connect(driver: &Arc<MemoryDriver>, user_id: &str) -> Session {
    init_tracing();
    Session::connect(Config::default(), driver.clone(), user_id)
        .await
        .expect("session should connect")
}

/// Polls a condition until it holds, panicking after the shared wait
/// budget.
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Next successful item of an event stream, bounded by the wait budget.
pub async fn next_ok<T>(stream: &mut EventStream<T>) -> T {
    timeout(WAIT, stream.next())
        .await
        .expect("stream should yield in time")
        .expect("stream should not end")
        .expect("stream should not error")
}

/// Waits for a session's chat-list reconciler to surface a chat.
pub async fn wait_for_chat(session: &Session, chat_id: &str) -> Chat {
    let mut events = session.chat_events().replay_all();
    timeout(WAIT, async {
        loop {
            let envelope = events
                .next()
                .await
                .expect("chat events should not end")
                .expect("chat events should not error");
            if !envelope.is(EventKind::Added) {
                continue;
            }
            if let Some(chat) = envelope.payload() {
                if chat.id() == chat_id {
                    return chat.clone();
                }
            }
        }
    })
    .await
    .expect("chat should appear in time")
}
