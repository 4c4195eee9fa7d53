//! The full session stack over the persistent SQLite driver.
//!
//! The memory driver covers most of the suite; this file checks that
//! the orchestration layer behaves identically behind the pooled,
//! blocking-thread driver.

mod common;

use std::sync::Arc;

use common::{eventually, init_tracing, next_ok};
use estuary_chat::{Config, Session};
use estuary_db::SqliteDriver;
use estuary_events::EventKind;
use estuary_sendable::TextMessage;
use estuary_types::{ContactType, DeliveryReceiptType, RoleType, User};

#[tokio::test]
async fn sessions_interoperate_over_sqlite() {
    init_tracing();
    let dir = tempfile::tempdir().expect("should create temp dir");
    let db_path = dir.path().join("estuary.db");
    let driver = Arc::new(
        SqliteDriver::open(db_path.to_str().unwrap()).expect("driver should open"),
    );

    let alice = Session::connect(Config::default(), driver.clone(), "alice")
        .await
        .expect("alice should connect");
    let bob = Session::connect(Config::default(), driver.clone(), "bob")
        .await
        .expect("bob should connect");

    // Contacts reconcile through the database feed.
    alice
        .add_contact(&User::new("bob"), ContactType::Contact)
        .await
        .expect("add contact should succeed");
    {
        let alice = alice.clone();
        eventually("the contact to materialize", move || {
            alice.contacts().iter().any(|u| u.id == "bob")
        })
        .await;
    }

    // Group chat: creation, convergence, delivery and acknowledgement.
    let chat = alice
        .create_chat("Persistent", "", None, &[User::with_role("bob", RoleType::Member)])
        .await
        .expect("chat creation should succeed");
    {
        let chat = chat.clone();
        eventually("the roster to converge", move || chat.users().len() == 2).await;
    }

    let bob_chat = common::wait_for_chat(&bob, chat.id()).await;
    let message_id = chat
        .send_message_with_text("still here after a restart")
        .await
        .expect("send should succeed");

    let mut bob_messages = bob_chat.events().messages().replay_all();
    let event = next_ok(&mut bob_messages).await;
    assert!(event.is(EventKind::Added));
    let message = event.payload().expect("message payload expected");
    assert_eq!(message.id(), message_id);
    assert_eq!(
        TextMessage::from_sendable(message.as_ref())
            .unwrap()
            .text()
            .unwrap(),
        "still here after a restart"
    );

    let mut receipts = chat.events().delivery_receipts().replay_all();
    let receipt = next_ok(&mut receipts).await;
    let receipt = receipt.payload().expect("receipt payload expected");
    assert_eq!(receipt.message_id().unwrap(), message_id);
    assert_eq!(receipt.receipt_type().unwrap(), DeliveryReceiptType::Received);

    alice.disconnect();
    bob.disconnect();

    // A fresh session over the same file sees the persisted history.
    let again = Session::connect(Config::default(), driver.clone(), "alice")
        .await
        .expect("alice should reconnect");
    let chat_again = common::wait_for_chat(&again, chat.id()).await;
    {
        let chat_again = chat_again.clone();
        let message_id = message_id.clone();
        eventually("the message history to rematerialize", move || {
            chat_again.sendable(&message_id).is_some()
        })
        .await;
    }
    again.disconnect();
}
