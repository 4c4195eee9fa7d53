//! End-to-end group chat flow: creation, roster convergence, invitation
//! auto-accept, message delivery and automatic delivery receipts.

mod common;

use std::sync::Arc;

use common::{connect, eventually, next_ok, wait_for_chat};
use estuary_events::EventKind;
use estuary_sendable::{SendableKind, TextMessage};
use estuary_store::MemoryDriver;
use estuary_types::{DeliveryReceiptType, RoleType, User};
use tokio::time::{sleep, Duration};

#[tokio::test]
async fn create_chat_converges_roster_and_acknowledges_messages() {
    let driver = Arc::new(MemoryDriver::new());
    let alice = connect(&driver, "alice").await;
    let bob = connect(&driver, "bob").await;

    let chat = alice
        .create_chat(
            "Test",
            "https://example.com/test.png",
            None,
            &[User::with_role("bob", RoleType::Member), User::new("carol")],
        )
        .await
        .expect("chat creation should succeed");

    // Roster converges to three members with the creator as owner,
    // whatever order the envelopes arrived in.
    {
        let chat = chat.clone();
        eventually("alice's roster to reach 3 members", move || {
            chat.users().len() == 3
        })
        .await;
    }
    assert_eq!(chat.role_of("alice"), Some(RoleType::Owner));
    assert_eq!(chat.role_of("bob"), Some(RoleType::Member));
    assert_eq!(chat.role_of("carol"), Some(RoleType::Member));
    assert_eq!(chat.name(), "Test");

    // Bob's session auto-accepts the invitation and materializes its
    // own connected chat instance.
    let bob_chat = wait_for_chat(&bob, chat.id()).await;

    // Alice sends a text message; Bob receives exactly one Added
    // message event carrying it.
    let message_id = chat
        .send_message_with_text("hi")
        .await
        .expect("send should succeed");

    let mut bob_messages = bob_chat.events().messages().replay_all();
    let event = next_ok(&mut bob_messages).await;
    assert!(event.is(EventKind::Added));
    let message = event.payload().expect("message payload expected");
    assert_eq!(message.id(), message_id);
    let text = TextMessage::from_sendable(message.as_ref())
        .expect("should project as text message");
    assert_eq!(text.text().unwrap(), "hi");

    // Bob's engine acknowledges with exactly one received receipt
    // referencing the message, visible in Alice's chat instance.
    let mut receipts = chat.events().delivery_receipts().replay_all();
    let receipt_event = next_ok(&mut receipts).await;
    let receipt = receipt_event.payload().expect("receipt payload expected");
    assert_eq!(receipt.from(), "bob");
    assert_eq!(receipt.message_id().unwrap(), message_id);
    assert_eq!(receipt.receipt_type().unwrap(), DeliveryReceiptType::Received);

    // Give any stray duplicate time to arrive, then count.
    sleep(Duration::from_millis(100)).await;
    let acknowledgements: Vec<_> = chat
        .sendables_of_kind(SendableKind::DeliveryReceipt)
        .into_iter()
        .filter(|s| s.body_str("id").ok() == Some(message_id.as_str()))
        .collect();
    assert_eq!(acknowledgements.len(), 1);

    alice.disconnect();
    bob.disconnect();
}

#[tokio::test]
async fn metadata_changes_propagate_to_every_instance() {
    let driver = Arc::new(MemoryDriver::new());
    let alice = connect(&driver, "alice").await;
    let bob = connect(&driver, "bob").await;

    let chat = alice
        .create_chat("Before", "", None, &[User::new("bob")])
        .await
        .expect("chat creation should succeed");
    let bob_chat = wait_for_chat(&bob, chat.id()).await;
    {
        let chat = chat.clone();
        eventually("the creator to appear in the roster", move || {
            chat.my_role() == Some(RoleType::Owner)
        })
        .await;
    }

    chat.set_name("After").await.expect("rename should succeed");
    chat.set_image_url("https://example.com/after.png")
        .await
        .expect("image change should succeed");

    {
        let bob_chat = bob_chat.clone();
        eventually("bob to observe the new name", move || {
            bob_chat.name() == "After"
        })
        .await;
    }
    {
        let bob_chat = bob_chat.clone();
        eventually("bob to observe the new image", move || {
            bob_chat.image_url() == "https://example.com/after.png"
        })
        .await;
    }

    // The name watch channel carries the change too.
    let mut names = bob_chat.name_events();
    assert_eq!(*names.borrow_and_update(), "After");

    alice.disconnect();
    bob.disconnect();
}

#[tokio::test]
async fn role_lattice_gates_mutating_operations() {
    let driver = Arc::new(MemoryDriver::new());
    let alice = connect(&driver, "alice").await;
    let bob = connect(&driver, "bob").await;

    let chat = alice
        .create_chat("Gated", "", None, &[User::new("bob")])
        .await
        .expect("chat creation should succeed");
    let bob_chat = wait_for_chat(&bob, chat.id()).await;
    {
        let bob_chat = bob_chat.clone();
        eventually("bob to see himself in the roster", move || {
            bob_chat.my_role() == Some(RoleType::Member)
        })
        .await;
    }
    {
        let chat = chat.clone();
        eventually("alice to see herself in the roster", move || {
            chat.my_role() == Some(RoleType::Owner)
        })
        .await;
    }

    // A member may send but not administrate.
    bob_chat
        .send_message_with_text("allowed")
        .await
        .expect("member send should succeed");
    let err = bob_chat.set_name("Denied").await.unwrap_err();
    assert!(matches!(
        err,
        estuary_chat::ChatError::PermissionDenied(RoleType::Admin)
    ));

    // Promotion by the owner takes effect and unlocks admin actions.
    chat.set_role("bob", RoleType::Admin)
        .await
        .expect("owner may promote");
    {
        let bob_chat = bob_chat.clone();
        eventually("bob's promotion to reconcile", move || {
            bob_chat.my_role() == Some(RoleType::Admin)
        })
        .await;
    }
    bob_chat
        .set_name("Renamed by admin")
        .await
        .expect("admin rename should succeed");

    // Ownership stays owner-gated.
    let err = bob_chat
        .set_role("carol", RoleType::Owner)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        estuary_chat::ChatError::PermissionDenied(RoleType::Owner)
    ));

    // Available-role offers follow the lattice: the owner may hand out
    // anything but ownership, nobody may retarget themselves, and an
    // admin only hands out sub-admin roles.
    assert_eq!(
        chat.available_roles("bob"),
        RoleType::all_excluding(&[RoleType::Owner])
    );
    assert!(chat.available_roles("alice").is_empty());
    assert_eq!(
        bob_chat.available_roles("carol"),
        RoleType::all_excluding(&[RoleType::Owner, RoleType::Admin])
    );

    // Demotion to watcher revokes write access.
    chat.set_role("bob", RoleType::Watcher)
        .await
        .expect("owner may demote");
    {
        let bob_chat = bob_chat.clone();
        eventually("bob's demotion to reconcile", move || {
            bob_chat.my_role() == Some(RoleType::Watcher)
        })
        .await;
    }
    let err = bob_chat.send_message_with_text("denied").await.unwrap_err();
    assert!(matches!(
        err,
        estuary_chat::ChatError::PermissionDenied(RoleType::Member)
    ));

    alice.disconnect();
    bob.disconnect();
}

#[tokio::test]
async fn leave_semantics() {
    let driver = Arc::new(MemoryDriver::new());
    let alice = connect(&driver, "alice").await;
    let bob = connect(&driver, "bob").await;

    let chat = alice
        .create_chat("Leavers", "", None, &[User::new("bob")])
        .await
        .expect("chat creation should succeed");
    let bob_chat = wait_for_chat(&bob, chat.id()).await;
    {
        let chat = chat.clone();
        eventually("both members to reconcile", move || chat.users().len() == 2).await;
    }

    // An owner cannot abandon a chat that still has other members.
    let err = chat.leave().await.unwrap_err();
    assert!(matches!(err, estuary_chat::ChatError::GroupNotEmpty));

    // A member leaving removes the chat from their session and their
    // entry from everyone's roster.
    bob_chat.leave().await.expect("member leave should succeed");
    {
        let bob = bob.clone();
        let id = chat.id().to_string();
        eventually("bob's chat instance to be torn down", move || {
            bob.chat(&id).is_none()
        })
        .await;
    }
    {
        let chat = chat.clone();
        eventually("alice to see bob gone", move || chat.users().len() == 1).await;
    }

    // Now the sole owner may leave, which deletes the chat.
    chat.leave().await.expect("sole owner leave should succeed");
    {
        let alice = alice.clone();
        let id = chat.id().to_string();
        eventually("alice's chat instance to be torn down", move || {
            alice.chat(&id).is_none()
        })
        .await;
    }

    alice.disconnect();
    bob.disconnect();
}
