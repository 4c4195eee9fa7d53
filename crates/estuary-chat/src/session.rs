//! The session-wide orchestrator.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use estuary_events::{
    ConnectionEvent, EventEnvelope, EventKind, EventStream, Multiplexer, StreamError,
};
use estuary_sendable::{
    filter, DeliveryReceipt, Invitation, Message, Presence, Sendable, SendableKind, TextMessage,
    TypingState,
};
use estuary_store::{Paths, StoreDriver};
use estuary_types::{
    date_fields, ContactType, DeliveryReceiptType, FieldMap, InvitationType, MutedEntry,
    MutedUntil, PresenceType, RoleType, TypingStateType, User,
};
use futures_util::StreamExt;
use tokio::sync::watch;

use crate::chat::{Chat, ChatRecord};
use crate::hub::SendableHub;
use crate::lane::{send_to_path, MessageLane};
use crate::roster::{spawn_roster_watcher, Roster};
use crate::tasks::TaskBag;
use crate::{ChatError, Config};

/// State shared between a session and the chats it owns: the store
/// driver, configuration, namespace, current user, the muted map, and
/// the mark-received override.
pub(crate) struct SessionCore {
    driver: Arc<dyn StoreDriver>,
    config: Config,
    paths: Paths,
    user_id: String,
    muted: Arc<Roster<MutedEntry>>,
    mark_received_filter: Mutex<Option<filter::Predicate<Message>>>,
    /// Aggregates every reconciliation error in the session's scope,
    /// its own watchers and each chat's.
    errors: Multiplexer<StreamError>,
}

impl SessionCore {
    pub fn driver(&self) -> Arc<dyn StoreDriver> {
        self.driver.clone()
    }

    /// Publishes one error on the session-wide stream.
    pub fn report_error(&self, error: StreamError) {
        self.errors.publish(error);
    }

    /// Spawns a task forwarding a lane's errors onto the session-wide
    /// stream, so no scope's failure goes unobserved.
    pub fn forward_errors(core: &Arc<Self>, tasks: &TaskBag, lane: &Arc<MessageLane>) {
        let core = core.clone();
        let lane = lane.clone();
        tasks.spawn(async move {
            let mut errors = lane.hub().errors();
            while let Some(result) = errors.next().await {
                if let Ok(error) = result {
                    core.report_error(error);
                }
            }
        });
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The head of the delivery-receipt predicate chain: the installed
    /// override, or a constant predicate from configuration.
    pub fn mark_received_predicate(&self) -> filter::Predicate<Message> {
        let custom = self
            .mark_received_filter
            .lock()
            .expect("mark-received filter lock poisoned")
            .clone();
        match custom {
            Some(predicate) => predicate,
            None => {
                let enabled =
                    self.config.delivery_receipts_enabled && self.config.auto_mark_received;
                Arc::new(move |_| enabled)
            }
        }
    }

    /// Writes a sendable into another user's inbox. Returns the written
    /// entry's id.
    pub async fn send_to_user(&self, to: &str, sendable: &Sendable) -> Result<String, ChatError> {
        let id = self.driver.allocate_id();
        self.send_to_user_with_id(to, &id, sendable).await?;
        Ok(id)
    }

    pub async fn send_to_user_with_id(
        &self,
        to: &str,
        id: &str,
        sendable: &Sendable,
    ) -> Result<(), ChatError> {
        send_to_path(
            self.driver.as_ref(),
            &self.paths.messages(to),
            id,
            &self.user_id,
            sendable,
        )
        .await
    }

    pub async fn join_chat(&self, chat_id: &str) -> Result<(), ChatError> {
        self.driver
            .insert(
                &self.paths.user_chats(&self.user_id),
                chat_id,
                date_fields(self.driver.server_timestamp()),
            )
            .await?;
        Ok(())
    }

    pub async fn leave_chat(&self, chat_id: &str) -> Result<(), ChatError> {
        self.driver
            .delete(&self.paths.user_chats(&self.user_id), chat_id)
            .await?;
        Ok(())
    }

    pub async fn mute(&self, id: &str, until: MutedUntil) -> Result<(), ChatError> {
        let mut fields = FieldMap::new();
        fields.insert(
            estuary_types::keys::DATE.to_string(),
            serde_json::Value::from(until.as_millis()),
        );
        self.driver
            .insert(&self.paths.muted(&self.user_id), id, fields)
            .await?;
        Ok(())
    }

    pub async fn unmute(&self, id: &str) -> Result<(), ChatError> {
        self.driver
            .delete(&self.paths.muted(&self.user_id), id)
            .await?;
        Ok(())
    }

    pub fn muted_until(&self, id: &str) -> Option<MutedUntil> {
        self.muted.get(id).map(|entry| entry.until)
    }

    pub fn muted(&self, id: &str) -> bool {
        self.muted_until(id)
            .is_some_and(|until| until.is_active(self.driver.server_timestamp()))
    }
}

struct SessionInner {
    core: Arc<SessionCore>,
    contacts: Arc<Roster<User>>,
    blocked: Arc<Roster<User>>,
    chats: Arc<Mutex<Vec<Chat>>>,
    chat_events: Arc<Multiplexer<EventEnvelope<Chat>>>,
    connection_tx: watch::Sender<ConnectionEvent>,
    /// The session's own 1-to-1 inbox.
    lane: Arc<MessageLane>,
    tasks: TaskBag,
}

/// One logical user session over one backing store.
///
/// Owns the contact list, blocked list, muted map, joined-chat list and
/// the user's 1-to-1 inbox; every chat instance is created by and scoped
/// to its session. Constructed explicitly by the embedding application —
/// there is no shared global session. Cloning is cheap and shares the
/// same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Connects a session for `user_id`. Validates the configured
    /// namespace synchronously, then registers every store listener and
    /// starts the inbox pipelines.
    pub async fn connect(
        config: Config,
        driver: Arc<dyn StoreDriver>,
        user_id: impl Into<String>,
    ) -> Result<Self, ChatError> {
        let user_id = user_id.into();
        let paths = Paths::new(&config.root, &config.sandbox)?;
        let lane = MessageLane::new(driver.clone(), paths.messages(&user_id));

        let core = Arc::new(SessionCore {
            driver,
            config,
            paths,
            user_id,
            muted: Arc::new(Roster::new()),
            mark_received_filter: Mutex::new(None),
            errors: Multiplexer::new(),
        });

        let (connection_tx, _) = watch::channel(ConnectionEvent::None);
        let session = Self {
            inner: Arc::new(SessionInner {
                core,
                contacts: Arc::new(Roster::new()),
                blocked: Arc::new(Roster::new()),
                chats: Arc::new(Mutex::new(Vec::new())),
                chat_events: Arc::new(Multiplexer::new()),
                connection_tx,
                lane,
                tasks: TaskBag::default(),
            }),
        };

        session.start();
        Ok(session)
    }

    fn start(&self) {
        let inner = &self.inner;
        let core = &inner.core;
        let _ = inner.connection_tx.send(ConnectionEvent::WillConnect);
        tracing::info!(user = core.user_id(), "connecting session");

        // Identity-keyed collections.
        spawn_roster_watcher(
            &inner.tasks,
            &core.driver(),
            core.paths().blocked(core.user_id()),
            &inner.blocked,
            &inner.lane,
        );
        spawn_roster_watcher(
            &inner.tasks,
            &core.driver(),
            core.paths().contacts(core.user_id()),
            &inner.contacts,
            &inner.lane,
        );
        spawn_roster_watcher(
            &inner.tasks,
            &core.driver(),
            core.paths().muted(core.user_id()),
            &core.muted,
            &inner.lane,
        );

        SessionCore::forward_errors(core, &inner.tasks, &inner.lane);

        self.spawn_chat_list_watcher();
        self.spawn_inbox_cleanup();
        self.spawn_receipt_pipeline();
        if core.config().auto_accept_chat_invite {
            self.spawn_invitation_handler();
        }

        // The inbox lane attaches after the event pipelines above have
        // subscribed, so none of them misses a replayed sendable.
        MessageLane::attach(
            &inner.lane,
            &inner.tasks,
            Some(core.config().message_history_limit),
        );

        let _ = inner.connection_tx.send(ConnectionEvent::DidConnect);
    }

    /// Reconciles the joined-chats collection into live chat instances:
    /// an added entry becomes a connected chat, a removed entry tears
    /// its chat down.
    fn spawn_chat_list_watcher(&self) {
        let inner = &self.inner;
        let core = inner.core.clone();
        let chats = inner.chats.clone();
        let chat_events = inner.chat_events.clone();
        let lane = inner.lane.clone();
        let path = core.paths().user_chats(core.user_id());

        inner.tasks.spawn(async move {
            let mut watch = core.driver().watch_list(&path);
            while let Some(result) = watch.next().await {
                let envelope = match result {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        lane.hub().publish_error(e);
                        break;
                    }
                };
                let Some(entry) = envelope.payload() else {
                    continue;
                };
                let record = ChatRecord::from_entry(entry);

                match envelope.kind() {
                    EventKind::Added => {
                        let known = chats
                            .lock()
                            .expect("chat list lock poisoned")
                            .iter()
                            .any(|c| c.id() == record.id);
                        if known {
                            continue;
                        }
                        let chat = Chat::new(core.clone(), record);
                        chat.connect();
                        chats
                            .lock()
                            .expect("chat list lock poisoned")
                            .push(chat.clone());
                        chat_events.publish(envelope.with_payload(chat));
                    }
                    EventKind::Removed => {
                        let removed = {
                            let mut chats = chats.lock().expect("chat list lock poisoned");
                            chats
                                .iter()
                                .position(|c| c.id() == record.id)
                                .map(|index| chats.remove(index))
                        };
                        if let Some(chat) = removed {
                            chat.disconnect();
                            chat_events.publish(envelope.with_payload(chat));
                        }
                    }
                    EventKind::Modified => {
                        let known = chats
                            .lock()
                            .expect("chat list lock poisoned")
                            .iter()
                            .find(|c| c.id() == record.id)
                            .cloned();
                        if let Some(chat) = known {
                            chat_events.publish(envelope.with_payload(chat));
                        }
                    }
                    EventKind::None => {}
                }
            }
        });
    }

    /// Deletes processed inbox sendables. Typing-state and presence
    /// sendables are always deleted; with `delete_messages_on_receipt`
    /// everything is.
    fn spawn_inbox_cleanup(&self) {
        let inner = &self.inner;
        let lane = inner.lane.clone();
        let delete_all = inner.core.config().delete_messages_on_receipt;
        let ephemeral = filter::by_sendable_kind::<Sendable>(&[
            SendableKind::TypingState,
            SendableKind::Presence,
        ]);

        inner.tasks.spawn(async move {
            let mut sendables = lane.hub().sendables().replay_all();
            while let Some(result) = sendables.next().await {
                let Ok(event) = result else { break };
                if !event.is(EventKind::Added) {
                    continue;
                }
                if !delete_all && !ephemeral(&event) {
                    continue;
                }
                let Some(sendable) = event.payload() else {
                    continue;
                };
                if let Err(e) = lane.delete_sendable(sendable.id()).await {
                    lane.hub().publish_error(StreamError::new(e.to_string()));
                }
            }
        });
    }

    /// Acknowledges inbound 1-to-1 messages with a `received` receipt
    /// sent back to the author's inbox. Same predicate chain as the
    /// per-chat pipeline.
    fn spawn_receipt_pipeline(&self) {
        let inner = &self.inner;
        let core = inner.core.clone();
        let lane = inner.lane.clone();
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

        inner.tasks.spawn(async move {
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
                if let Err(e) = core
                    .send_to_user(message.from(), &receipt.into_sendable())
                    .await
                {
                    lane.hub().publish_error(StreamError::new(e.to_string()));
                }
            }
        });
    }

    /// Joins the chat referenced by an inbound `chat` invitation.
    /// Invitations with unrecognised sub-tags are ignored.
    fn spawn_invitation_handler(&self) {
        let inner = &self.inner;
        let core = inner.core.clone();
        let lane = inner.lane.clone();

        inner.tasks.spawn(async move {
            let mut invitations = lane.hub().invitations().replay_all();
            while let Some(result) = invitations.next().await {
                let Ok(event) = result else { break };
                if !event.is(EventKind::Added) {
                    continue;
                }
                let Some(invitation) = event.payload() else {
                    continue;
                };
                if invitation.invitation_type().ok() != Some(InvitationType::Chat) {
                    continue;
                }
                let chat_id = match invitation.chat_id() {
                    Ok(chat_id) => chat_id.to_string(),
                    Err(e) => {
                        lane.hub().publish_error(StreamError::new(e.to_string()));
                        continue;
                    }
                };
                if let Err(e) = core.join_chat(&chat_id).await {
                    lane.hub().publish_error(StreamError::new(e.to_string()));
                }
            }
        });
    }

    /// Tears the session down: aborts every watcher, disconnects every
    /// chat, and terminates the owned event streams. In-flight store
    /// operations are not force-cancelled; their results die with the
    /// aborted tasks.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        let _ = inner.connection_tx.send(ConnectionEvent::WillDisconnect);
        tracing::info!(user = inner.core.user_id(), "disconnecting session");

        inner.tasks.abort_all();
        let chats = std::mem::take(&mut *inner.chats.lock().expect("chat list lock poisoned"));
        for chat in chats {
            chat.disconnect();
        }
        inner.contacts.close();
        inner.blocked.close();
        inner.core.muted.close();
        inner.core.errors.close();
        inner.chat_events.close();
        inner.lane.close();

        let _ = inner.connection_tx.send(ConnectionEvent::DidDisconnect);
    }

    pub fn current_user_id(&self) -> &str {
        self.inner.core.user_id()
    }

    pub fn config(&self) -> &Config {
        self.inner.core.config()
    }

    /// The current connection state, then every transition.
    pub fn connection_events(&self) -> watch::Receiver<ConnectionEvent> {
        self.inner.connection_tx.subscribe()
    }

    /// The session-wide error stream: every reconciliation error in
    /// this session's scope, including its chats'. Live-only: errors
    /// are observed, not replayed.
    pub fn errors(&self) -> EventStream<StreamError> {
        self.inner.core.errors.live()
    }

    /// The inbox event hub: typed streams of the user's 1-to-1 lane.
    pub fn events(&self) -> &SendableHub {
        self.inner.lane.hub()
    }

    // ── Contacts ─────────────────────────────────────────────────────

    pub async fn add_contact(
        &self,
        user: &User,
        contact_type: ContactType,
    ) -> Result<(), ChatError> {
        let core = &self.inner.core;
        let mut contact = user.clone();
        contact.contact_type = Some(contact_type);
        core.driver()
            .insert(
                &core.paths().contacts(core.user_id()),
                &contact.id,
                contact.contact_fields(),
            )
            .await?;
        Ok(())
    }

    pub async fn remove_contact(&self, user: &User) -> Result<(), ChatError> {
        let core = &self.inner.core;
        core.driver()
            .delete(&core.paths().contacts(core.user_id()), &user.id)
            .await?;
        Ok(())
    }

    pub fn contacts(&self) -> Vec<User> {
        self.inner.contacts.snapshot()
    }

    pub fn contact_events(&self) -> &Multiplexer<EventEnvelope<User>> {
        self.inner.contacts.events()
    }

    // ── Blocking ─────────────────────────────────────────────────────

    pub async fn block(&self, user: &User) -> Result<(), ChatError> {
        let core = &self.inner.core;
        core.driver()
            .insert(
                &core.paths().blocked(core.user_id()),
                &user.id,
                date_fields(core.driver().server_timestamp()),
            )
            .await?;
        Ok(())
    }

    pub async fn unblock(&self, user: &User) -> Result<(), ChatError> {
        let core = &self.inner.core;
        core.driver()
            .delete(&core.paths().blocked(core.user_id()), &user.id)
            .await?;
        Ok(())
    }

    pub fn blocked(&self) -> Vec<User> {
        self.inner.blocked.snapshot()
    }

    pub fn is_blocked(&self, user_id: &str) -> bool {
        self.inner.blocked.contains(user_id)
    }

    pub fn blocked_events(&self) -> &Multiplexer<EventEnvelope<User>> {
        self.inner.blocked.events()
    }

    // ── Muting ───────────────────────────────────────────────────────

    pub async fn mute(&self, id: &str) -> Result<(), ChatError> {
        self.inner.core.mute(id, MutedUntil::Forever).await
    }

    pub async fn mute_until(&self, id: &str, until: DateTime<Utc>) -> Result<(), ChatError> {
        self.inner.core.mute(id, MutedUntil::Until(until)).await
    }

    pub async fn unmute(&self, id: &str) -> Result<(), ChatError> {
        self.inner.core.unmute(id).await
    }

    pub fn muted(&self, id: &str) -> bool {
        self.inner.core.muted(id)
    }

    pub fn muted_until(&self, id: &str) -> Option<MutedUntil> {
        self.inner.core.muted_until(id)
    }

    pub fn muted_events(&self) -> &Multiplexer<EventEnvelope<MutedEntry>> {
        self.inner.core.muted.events()
    }

    // ── Chats ────────────────────────────────────────────────────────

    /// Creates a chat, adds the given users (the caller becomes owner,
    /// users without an explicit role become members), invites them,
    /// joins it, and returns the connected chat instance.
    pub async fn create_chat(
        &self,
        name: &str,
        image_url: &str,
        custom_data: Option<FieldMap>,
        users: &[User],
    ) -> Result<Chat, ChatError> {
        let core = &self.inner.core;
        let chat_id = core.driver().allocate_id();

        let mut meta = estuary_types::ChatMeta::with_data(name, image_url, custom_data);
        meta.created = Some(core.driver().server_timestamp());
        core.driver()
            .insert(
                &core.paths().chat(&chat_id),
                estuary_types::keys::META,
                meta.to_fields(),
            )
            .await?;

        // Everyone but the caller keeps their given role (default
        // member); the caller is always the owner.
        let mut members: Vec<User> = users
            .iter()
            .filter(|u| u.id != core.user_id())
            .cloned()
            .map(|mut u| {
                u.role = u.role.or(Some(RoleType::Member));
                u
            })
            .collect();
        members.push(User::with_role(core.user_id(), RoleType::Owner));

        let ops = members
            .iter()
            .map(|u| estuary_store::BatchOp::Insert {
                id: u.id.clone(),
                fields: u.role_fields(),
            })
            .collect();
        core.driver()
            .write_batch(&core.paths().chat_users(&chat_id), ops)
            .await?;

        for member in &members {
            if member.id != core.user_id() {
                let invitation = Invitation::new(InvitationType::Chat, &chat_id);
                core.send_to_user(&member.id, &invitation.into_sendable())
                    .await?;
            }
        }

        core.join_chat(&chat_id).await?;
        self.await_chat(&chat_id).await
    }

    /// Waits for the joined-chats reconciler to surface the chat.
    async fn await_chat(&self, chat_id: &str) -> Result<Chat, ChatError> {
        let mut events = self.inner.chat_events.replay_all();
        while let Some(result) = events.next().await {
            let Ok(envelope) = result else { break };
            if !envelope.is(EventKind::Added) {
                continue;
            }
            if let Some(chat) = envelope.payload() {
                if chat.id() == chat_id {
                    return Ok(chat.clone());
                }
            }
        }
        Err(ChatError::ChatNotFound(chat_id.to_string()))
    }

    /// Joins an existing chat by id and returns the connected instance.
    pub async fn join_chat(&self, chat_id: &str) -> Result<Chat, ChatError> {
        self.inner.core.join_chat(chat_id).await?;
        self.await_chat(chat_id).await
    }

    /// Accepts an invitation: joins the referenced chat when the
    /// sub-tag is `chat`. Any other sub-tag is accepted as a no-op and
    /// yields `None`.
    pub async fn accept_invitation(
        &self,
        invitation: &Invitation,
    ) -> Result<Option<Chat>, ChatError> {
        if invitation.invitation_type().ok() != Some(InvitationType::Chat) {
            return Ok(None);
        }
        let chat_id = invitation.chat_id()?.to_string();
        Ok(Some(self.join_chat(&chat_id).await?))
    }

    /// Leaves a chat: removes it from the joined-chats collection. The
    /// local instance is torn down when the removal is reconciled.
    pub async fn leave_chat(&self, chat_id: &str) -> Result<(), ChatError> {
        self.inner.core.leave_chat(chat_id).await
    }

    pub fn chat(&self, chat_id: &str) -> Option<Chat> {
        self.inner
            .chats
            .lock()
            .expect("chat list lock poisoned")
            .iter()
            .find(|c| c.id() == chat_id)
            .cloned()
    }

    pub fn chats(&self) -> Vec<Chat> {
        self.inner
            .chats
            .lock()
            .expect("chat list lock poisoned")
            .clone()
    }

    pub fn chat_events(&self) -> &Multiplexer<EventEnvelope<Chat>> {
        &self.inner.chat_events
    }

    // ── 1-to-1 messaging ─────────────────────────────────────────────

    /// Sends any sendable to another user's inbox. Returns the written
    /// entry's id.
    pub async fn send_to_user(&self, to: &str, sendable: &Sendable) -> Result<String, ChatError> {
        self.inner.core.send_to_user(to, sendable).await
    }

    /// Like [`Session::send_to_user`] with a caller-allocated id (see
    /// [`Session::allocate_id`]), for callers that need the id before
    /// the write resolves.
    pub async fn send_to_user_with_id(
        &self,
        to: &str,
        id: &str,
        sendable: &Sendable,
    ) -> Result<(), ChatError> {
        self.inner.core.send_to_user_with_id(to, id, sendable).await
    }

    /// Allocates an entry id for use with
    /// [`Session::send_to_user_with_id`].
    pub fn allocate_id(&self) -> String {
        self.inner.core.driver().allocate_id()
    }

    pub async fn send_message_with_text(
        &self,
        to: &str,
        text: &str,
    ) -> Result<String, ChatError> {
        self.send_to_user(to, &TextMessage::new(text).into_sendable())
            .await
    }

    pub async fn send_message_with_body(
        &self,
        to: &str,
        body: FieldMap,
    ) -> Result<String, ChatError> {
        self.send_to_user(to, &Message::with_body(body).into_sendable())
            .await
    }

    pub async fn send_typing_indicator(
        &self,
        to: &str,
        state: TypingStateType,
    ) -> Result<String, ChatError> {
        self.send_to_user(to, &TypingState::new(state).into_sendable())
            .await
    }

    pub async fn send_presence(
        &self,
        to: &str,
        presence: PresenceType,
    ) -> Result<String, ChatError> {
        self.send_to_user(to, &Presence::new(presence).into_sendable())
            .await
    }

    pub async fn send_invitation(
        &self,
        to: &str,
        invitation_type: InvitationType,
        chat_id: &str,
    ) -> Result<String, ChatError> {
        self.send_to_user(to, &Invitation::new(invitation_type, chat_id).into_sendable())
            .await
    }

    pub async fn send_delivery_receipt(
        &self,
        to: &str,
        receipt_type: DeliveryReceiptType,
        message_id: &str,
    ) -> Result<String, ChatError> {
        self.send_to_user(
            to,
            &DeliveryReceipt::new(receipt_type, message_id).into_sendable(),
        )
        .await
    }

    /// Sends a `received` receipt back to a sendable's author.
    pub async fn mark_received(&self, sendable: &Sendable) -> Result<String, ChatError> {
        self.send_delivery_receipt(sendable.from(), DeliveryReceiptType::Received, sendable.id())
            .await
    }

    /// Sends a `read` receipt back to a sendable's author.
    pub async fn mark_read(&self, sendable: &Sendable) -> Result<String, ChatError> {
        self.send_delivery_receipt(sendable.from(), DeliveryReceiptType::Read, sendable.id())
            .await
    }

    /// Deletes one sendable from the session's own inbox.
    pub async fn delete_sendable(&self, sendable_id: &str) -> Result<(), ChatError> {
        self.inner.lane.delete_sendable(sendable_id).await
    }

    /// Replaces the head of the delivery-receipt predicate chain. Pass
    /// `None` to fall back to the configuration default.
    pub fn set_mark_received_filter(&self, predicate: Option<filter::Predicate<Message>>) {
        *self
            .inner
            .core
            .mark_received_filter
            .lock()
            .expect("mark-received filter lock poisoned") = predicate;
    }

    // ── Inbox sendables and pagination ───────────────────────────────

    pub fn sendables(&self) -> Vec<Sendable> {
        self.inner.lane.sendables()
    }

    pub fn sendables_of_kind(&self, kind: SendableKind) -> Vec<Sendable> {
        self.inner.lane.sendables_of_kind(kind)
    }

    pub fn sendable(&self, id: &str) -> Option<Sendable> {
        self.inner.lane.sendable(id)
    }

    pub async fn load_more_messages(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Sendable>, ChatError> {
        self.inner.lane.load_more_messages(from, to).await
    }

    pub async fn load_more_messages_from(
        &self,
        from: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Sendable>, ChatError> {
        self.inner.lane.load_more_messages_from(from, limit).await
    }

    pub async fn load_more_messages_to(
        &self,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Sendable>, ChatError> {
        self.inner.lane.load_more_messages_to(to, limit).await
    }

    pub async fn load_more_messages_before(
        &self,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Sendable>, ChatError> {
        self.inner.lane.load_more_messages_before(to, limit).await
    }
}
