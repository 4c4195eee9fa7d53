//! The per-chat orchestrator.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use estuary_events::{EventEnvelope, EventKind, Multiplexer, StreamError};
use estuary_sendable::{
    filter, DeliveryReceipt, Invitation, Message, Sendable, SendableKind, TextMessage, TypingState,
};
use estuary_store::{BatchOp, ListEntry, StoreDriver};
use estuary_types::{
    keys, level_of, ChatMeta, DeliveryReceiptType, FieldMap, InvitationType, MutedUntil, RoleType,
    TypingStateType, User,
};
use futures_util::StreamExt;
use tokio::sync::watch;

use crate::hub::SendableHub;
use crate::lane::MessageLane;
use crate::roster::{spawn_roster_watcher, Roster};
use crate::session::SessionCore;
use crate::tasks::TaskBag;
use crate::ChatError;

/// One entry of the user's joined-chats collection.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChatRecord {
    pub id: String,
    pub joined: Option<DateTime<Utc>>,
}

impl ChatRecord {
    pub fn from_entry(entry: &ListEntry) -> Self {
        Self {
            id: entry.id.clone(),
            joined: entry.date(),
        }
    }
}

struct ChatShared {
    core: Arc<SessionCore>,
    id: String,
    joined: Option<DateTime<Utc>>,
    meta: Arc<Mutex<ChatMeta>>,
    roster: Arc<Roster<User>>,
    lane: Arc<MessageLane>,
    name_tx: watch::Sender<String>,
    image_url_tx: watch::Sender<String>,
    custom_data_tx: watch::Sender<Option<FieldMap>>,
    tasks: TaskBag,
}

/// A group or 1-to-1 chat: the materialized roster and message list for
/// one chat id, plus the mutating operation surface gated by the role
/// lattice.
///
/// Instances are created and connected by their [`crate::Session`] when
/// a joined-chats entry appears, and torn down when it is removed.
/// Cloning is cheap and shares the same chat.
#[derive(Clone)]
pub struct Chat {
    shared: Arc<ChatShared>,
}

impl Chat {
    pub(crate) fn new(core: Arc<SessionCore>, record: ChatRecord) -> Self {
        let lane = MessageLane::new(core.driver(), core.paths().chat_messages(&record.id));
        let (name_tx, _) = watch::channel(String::new());
        let (image_url_tx, _) = watch::channel(String::new());
        let (custom_data_tx, _) = watch::channel(None);
        Self {
            shared: Arc::new(ChatShared {
                core,
                id: record.id,
                joined: record.joined,
                meta: Arc::new(Mutex::new(ChatMeta::default())),
                roster: Arc::new(Roster::new()),
                lane,
                name_tx,
                image_url_tx,
                custom_data_tx,
                tasks: TaskBag::default(),
            }),
        }
    }

    /// Starts the chat's watcher tasks: roster, metadata, message lane
    /// and, when enabled, the auto-receipt pipeline.
    ///
    /// The roster and metadata streams are independently ordered; a
    /// consumer must not assume a member event and a metadata event for
    /// the same chat arrive in any particular relative order.
    pub(crate) fn connect(&self) {
        let shared = &self.shared;
        let core = &shared.core;
        tracing::debug!(chat = %shared.id, "connecting chat");

        spawn_roster_watcher(
            &shared.tasks,
            &core.driver(),
            core.paths().chat_users(&shared.id),
            &shared.roster,
            &shared.lane,
        );
        SessionCore::forward_errors(core, &shared.tasks, &shared.lane);

        self.spawn_meta_watcher();

        if core.config().delivery_receipts_enabled {
            self.spawn_receipt_pipeline();
        }

        MessageLane::attach(
            &shared.lane,
            &shared.tasks,
            Some(core.config().message_history_limit),
        );
    }

    fn spawn_meta_watcher(&self) {
        let shared = &self.shared;
        let driver = shared.core.driver();
        let path = shared.core.paths().chat_meta(&shared.id);
        let meta = shared.meta.clone();
        let lane = shared.lane.clone();
        let name_tx = shared.name_tx.clone();
        let image_url_tx = shared.image_url_tx.clone();
        let custom_data_tx = shared.custom_data_tx.clone();

        shared.tasks.spawn(async move {
            let mut watch = driver.watch_value(&path);
            while let Some(result) = watch.next().await {
                match result {
                    Ok(fields) => {
                        let incoming = ChatMeta::from_fields(&fields);
                        let mut current = meta.lock().expect("chat meta lock poisoned");
                        if !incoming.name.is_empty() && incoming.name != current.name {
                            current.name = incoming.name.clone();
                            name_tx.send_replace(incoming.name);
                        }
                        if !incoming.image_url.is_empty() && incoming.image_url != current.image_url
                        {
                            current.image_url = incoming.image_url.clone();
                            image_url_tx.send_replace(incoming.image_url);
                        }
                        if incoming.data.is_some() && incoming.data != current.data {
                            current.data = incoming.data.clone();
                            custom_data_tx.send_replace(incoming.data);
                        }
                        if incoming.created.is_some() {
                            current.created = incoming.created;
                        }
                    }
                    Err(e) => {
                        lane.hub().publish_error(e);
                        break;
                    }
                }
            }
        });
    }

    /// Reacts to inbound messages with an automatic `received` receipt,
    /// posted into the chat's own lane. The predicate chain is ANDed
    /// left to right and short-circuits: (caller-supplied filter, or the
    /// config default) and not-from-me and kind-is-Added.
    fn spawn_receipt_pipeline(&self) {
        let shared = &self.shared;
        let core = shared.core.clone();
        let roster = shared.roster.clone();
        let lane = shared.lane.clone();
        // The override is resolved per event so it can be replaced
        // after connect.
        let head: filter::Predicate<Message> = {
            let core = core.clone();
            Arc::new(move |event| (core.mark_received_predicate())(event))
        };
        let chain = filter::all(vec![
            head,
            filter::not_from(core.user_id().to_string()),
            filter::by_event_kind(&[EventKind::Added]),
        ]);

        shared.tasks.spawn(async move {
            // Receipts are member-gated, so wait until our own roster
            // entry has been reconciled before acknowledging anything.
            let mut own_entry = roster.events().replay_all();
            while !roster.contains(core.user_id()) {
                match own_entry.next().await {
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            }
            drop(own_entry);

            let mut messages = lane.hub().messages().replay_all();
            while let Some(result) = messages.next().await {
                let Ok(event) = result else { break };
                if !chain(&event) {
                    continue;
                }
                let Some(message) = event.payload() else {
                    continue;
                };
                let receipt = DeliveryReceipt::new(DeliveryReceiptType::Received, message.id());
                if let Err(e) =
                    send_gated(&core, &roster, &lane, &receipt.into_sendable()).await
                {
                    lane.hub().publish_error(StreamError::new(e.to_string()));
                }
            }
        });
    }

    /// Tears the chat down: aborts every watcher, terminates the event
    /// streams, and releases the store listeners they held.
    pub(crate) fn disconnect(&self) {
        tracing::debug!(chat = %self.shared.id, "disconnecting chat");
        self.shared.tasks.abort_all();
        self.shared.roster.close();
        self.shared.lane.close();
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn joined(&self) -> Option<DateTime<Utc>> {
        self.shared.joined
    }

    // ── Metadata ─────────────────────────────────────────────────────

    pub fn name(&self) -> String {
        self.shared.meta.lock().expect("chat meta lock poisoned").name.clone()
    }

    pub fn image_url(&self) -> String {
        self.shared
            .meta
            .lock()
            .expect("chat meta lock poisoned")
            .image_url
            .clone()
    }

    pub fn custom_data(&self) -> Option<FieldMap> {
        self.shared
            .meta
            .lock()
            .expect("chat meta lock poisoned")
            .data
            .clone()
    }

    pub async fn set_name(&self, name: &str) -> Result<(), ChatError> {
        self.require(RoleType::Admin)?;
        if self.name() == name {
            return Ok(());
        }
        self.update_meta_field(keys::NAME, serde_json::Value::from(name))
            .await
    }

    pub async fn set_image_url(&self, image_url: &str) -> Result<(), ChatError> {
        self.require(RoleType::Admin)?;
        if self.image_url() == image_url {
            return Ok(());
        }
        self.update_meta_field(keys::IMAGE_URL, serde_json::Value::from(image_url))
            .await
    }

    pub async fn set_custom_data(&self, data: FieldMap) -> Result<(), ChatError> {
        self.require(RoleType::Admin)?;
        self.update_meta_field(keys::DATA, serde_json::Value::Object(data))
            .await
    }

    async fn update_meta_field(
        &self,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), ChatError> {
        let core = &self.shared.core;
        let mut fields = FieldMap::new();
        fields.insert(key.to_string(), value);
        core.driver()
            .update(&core.paths().chat(&self.shared.id), keys::META, fields)
            .await?;
        Ok(())
    }

    /// The current chat name, then every change.
    pub fn name_events(&self) -> watch::Receiver<String> {
        self.shared.name_tx.subscribe()
    }

    pub fn image_url_events(&self) -> watch::Receiver<String> {
        self.shared.image_url_tx.subscribe()
    }

    pub fn custom_data_events(&self) -> watch::Receiver<Option<FieldMap>> {
        self.shared.custom_data_tx.subscribe()
    }

    // ── Roster ───────────────────────────────────────────────────────

    /// Detached snapshots of the current members, in arrival order.
    pub fn users(&self) -> Vec<User> {
        self.shared.roster.snapshot()
    }

    pub fn users_for_role(&self, role: RoleType) -> Vec<User> {
        self.shared
            .roster
            .snapshot()
            .into_iter()
            .filter(|u| u.role == Some(role))
            .collect()
    }

    pub fn user_events(&self) -> &Multiplexer<EventEnvelope<User>> {
        self.shared.roster.events()
    }

    pub fn role_of(&self, user_id: &str) -> Option<RoleType> {
        self.shared.roster.get(user_id).and_then(|u| u.role)
    }

    pub fn my_role(&self) -> Option<RoleType> {
        self.role_of(self.shared.core.user_id())
    }

    /// True when the caller's own role satisfies `required`.
    pub fn has_permission(&self, required: RoleType) -> bool {
        level_of(self.my_role()) <= required.level()
    }

    fn require(&self, required: RoleType) -> Result<(), ChatError> {
        if self.has_permission(required) {
            Ok(())
        } else {
            Err(ChatError::PermissionDenied(required))
        }
    }

    /// The roles the caller may assign to `user_id`. Empty unless the
    /// caller is an admin or better and isn't targeting themselves; the
    /// owner may assign anything but ownership; an admin may not alter
    /// another admin and may only hand out sub-admin roles.
    pub fn available_roles(&self, user_id: &str) -> Vec<RoleType> {
        if user_id == self.shared.core.user_id() || !self.has_permission(RoleType::Admin) {
            return Vec::new();
        }
        if self.has_permission(RoleType::Owner) {
            return RoleType::all_excluding(&[RoleType::Owner]);
        }
        if self.role_of(user_id) == Some(RoleType::Admin) {
            return Vec::new();
        }
        RoleType::all_excluding(&[RoleType::Owner, RoleType::Admin])
    }

    /// Changes one member's role. Granting or revoking ownership takes
    /// the owner; everything else takes an admin.
    pub async fn set_role(&self, user_id: &str, role: RoleType) -> Result<(), ChatError> {
        if (role == RoleType::Owner || self.role_of(user_id) == Some(RoleType::Owner))
            && !self.has_permission(RoleType::Owner)
        {
            return Err(ChatError::PermissionDenied(RoleType::Owner));
        }
        self.require(RoleType::Admin)?;

        let user = User::with_role(user_id, role);
        self.write_users(vec![user], WriteUsers::Update).await
    }

    /// Adds members to the roster; a user without an explicit role
    /// joins as a member. With `send_invite`, every added user other
    /// than the caller also gets a chat invitation in their inbox.
    pub async fn add_users(&self, send_invite: bool, users: &[User]) -> Result<(), ChatError> {
        self.write_users(users.to_vec(), WriteUsers::Insert).await?;
        if send_invite {
            let core = &self.shared.core;
            for user in users {
                if user.id != core.user_id() {
                    let invitation = Invitation::new(InvitationType::Chat, &self.shared.id);
                    core.send_to_user(&user.id, &invitation.into_sendable())
                        .await?;
                }
            }
        }
        Ok(())
    }

    pub async fn update_users(&self, users: &[User]) -> Result<(), ChatError> {
        self.write_users(users.to_vec(), WriteUsers::Update).await
    }

    pub async fn remove_users(&self, users: &[User]) -> Result<(), ChatError> {
        let core = &self.shared.core;
        let ops = users
            .iter()
            .map(|u| BatchOp::Delete { id: u.id.clone() })
            .collect();
        core.driver()
            .write_batch(&core.paths().chat_users(&self.shared.id), ops)
            .await?;
        Ok(())
    }

    async fn write_users(&self, users: Vec<User>, mode: WriteUsers) -> Result<(), ChatError> {
        let core = &self.shared.core;
        let ops = users
            .into_iter()
            .map(|mut user| {
                user.role = user.role.or(Some(RoleType::Member));
                let fields = user.role_fields();
                match mode {
                    WriteUsers::Insert => BatchOp::Insert {
                        id: user.id,
                        fields,
                    },
                    WriteUsers::Update => BatchOp::Update {
                        id: user.id,
                        fields,
                    },
                }
            })
            .collect();
        core.driver()
            .write_batch(&core.paths().chat_users(&self.shared.id), ops)
            .await?;
        Ok(())
    }

    // ── Sending ──────────────────────────────────────────────────────

    /// Sends any sendable into the chat; requires member access. The
    /// returned id is the one the written entry carries.
    pub async fn send(&self, sendable: &Sendable) -> Result<String, ChatError> {
        send_gated(
            &self.shared.core,
            &self.shared.roster,
            &self.shared.lane,
            sendable,
        )
        .await
    }

    /// Like [`Chat::send`] with a caller-allocated id (see
    /// [`Chat::allocate_id`]), for callers that need the id before the
    /// write resolves.
    pub async fn send_with_id(&self, id: &str, sendable: &Sendable) -> Result<(), ChatError> {
        self.require(RoleType::Member)?;
        self.shared
            .lane
            .send_with_id(id, self.shared.core.user_id(), sendable)
            .await
    }

    /// Allocates an entry id for use with [`Chat::send_with_id`].
    pub fn allocate_id(&self) -> String {
        self.shared.lane.allocate_id()
    }

    pub async fn send_message_with_text(&self, text: &str) -> Result<String, ChatError> {
        self.send(&TextMessage::new(text).into_sendable()).await
    }

    pub async fn send_message_with_body(&self, body: FieldMap) -> Result<String, ChatError> {
        self.send(&Message::with_body(body).into_sendable()).await
    }

    pub async fn send_typing_indicator(
        &self,
        state: TypingStateType,
    ) -> Result<String, ChatError> {
        self.send(&TypingState::new(state).into_sendable()).await
    }

    pub async fn send_delivery_receipt(
        &self,
        receipt_type: DeliveryReceiptType,
        message_id: &str,
    ) -> Result<String, ChatError> {
        self.send(&DeliveryReceipt::new(receipt_type, message_id).into_sendable())
            .await
    }

    pub async fn mark_received(&self, sendable: &Sendable) -> Result<String, ChatError> {
        self.send_delivery_receipt(DeliveryReceiptType::Received, sendable.id())
            .await
    }

    pub async fn mark_read(&self, sendable: &Sendable) -> Result<String, ChatError> {
        self.send_delivery_receipt(DeliveryReceiptType::Read, sendable.id())
            .await
    }

    pub async fn delete_sendable(&self, sendable_id: &str) -> Result<(), ChatError> {
        self.shared.lane.delete_sendable(sendable_id).await
    }

    // ── Materialized sendables and events ────────────────────────────

    pub fn sendables(&self) -> Vec<Sendable> {
        self.shared.lane.sendables()
    }

    pub fn sendables_of_kind(&self, kind: SendableKind) -> Vec<Sendable> {
        self.shared.lane.sendables_of_kind(kind)
    }

    pub fn sendable(&self, id: &str) -> Option<Sendable> {
        self.shared.lane.sendable(id)
    }

    /// The chat's event hub: untyped and per-kind streams plus errors.
    pub fn events(&self) -> &SendableHub {
        self.shared.lane.hub()
    }

    // ── Pagination ───────────────────────────────────────────────────

    pub async fn load_more_messages(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Sendable>, ChatError> {
        self.shared.lane.load_more_messages(from, to).await
    }

    pub async fn load_more_messages_from(
        &self,
        from: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Sendable>, ChatError> {
        self.shared.lane.load_more_messages_from(from, limit).await
    }

    pub async fn load_more_messages_to(
        &self,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Sendable>, ChatError> {
        self.shared.lane.load_more_messages_to(to, limit).await
    }

    pub async fn load_more_messages_before(
        &self,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Sendable>, ChatError> {
        self.shared.lane.load_more_messages_before(to, limit).await
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Leaves the chat. An owner must remove the other members first;
    /// a sole owner leaving deletes the chat. The local instance is
    /// torn down when the joined-chats removal is reconciled.
    pub async fn leave(&self) -> Result<(), ChatError> {
        let core = &self.shared.core;
        if self.my_role() == Some(RoleType::Owner) {
            if self.users().len() > 1 {
                return Err(ChatError::GroupNotEmpty);
            }
            core.driver()
                .delete(&core.paths().chat(&self.shared.id), keys::META)
                .await?;
        }
        core.driver()
            .delete(
                &core.paths().chat_users(&self.shared.id),
                core.user_id(),
            )
            .await?;
        core.leave_chat(&self.shared.id).await
    }

    // ── Muting ───────────────────────────────────────────────────────

    pub async fn mute(&self) -> Result<(), ChatError> {
        self.shared
            .core
            .mute(&self.shared.id, MutedUntil::Forever)
            .await
    }

    pub async fn mute_until(&self, until: DateTime<Utc>) -> Result<(), ChatError> {
        self.shared
            .core
            .mute(&self.shared.id, MutedUntil::Until(until))
            .await
    }

    pub async fn unmute(&self) -> Result<(), ChatError> {
        self.shared.core.unmute(&self.shared.id).await
    }

    pub fn muted(&self) -> bool {
        self.shared.core.muted(&self.shared.id)
    }

    pub fn muted_until(&self) -> Option<MutedUntil> {
        self.shared.core.muted_until(&self.shared.id)
    }
}

enum WriteUsers {
    Insert,
    Update,
}

/// The member-gated send every message path funnels through, including
/// the auto-receipt pipeline.
async fn send_gated(
    core: &SessionCore,
    roster: &Roster<User>,
    lane: &MessageLane,
    sendable: &Sendable,
) -> Result<String, ChatError> {
    let role = roster.get(core.user_id()).and_then(|u| u.role);
    if level_of(role) > RoleType::Member.level() {
        return Err(ChatError::PermissionDenied(RoleType::Member));
    }
    lane.send(core.user_id(), sendable).await
}
