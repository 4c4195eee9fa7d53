//! The per-lane event hub.
//!
//! Exposes one multiplexer per sendable kind plus the untyped sendable
//! stream and the lane's error stream. Routing an envelope publishes it
//! on the untyped stream and, when its kind projects cleanly, on the
//! matching typed stream.

use estuary_events::{EnvelopeMux, EventEnvelope, Multiplexer, StreamError};
use estuary_sendable::{
    DeliveryReceipt, Invitation, Message, Presence, Sendable, SendableKind, TypingState,
};

/// The event streams of one message lane.
///
/// The untyped sendable stream carries the most information: every
/// envelope, whatever its kind tag. The typed streams only see
/// envelopes whose payload projects to their kind.
pub struct SendableHub {
    sendables: EnvelopeMux<Sendable>,
    messages: EnvelopeMux<Message>,
    delivery_receipts: EnvelopeMux<DeliveryReceipt>,
    typing_states: EnvelopeMux<TypingState>,
    presences: EnvelopeMux<Presence>,
    invitations: EnvelopeMux<Invitation>,
    errors: Multiplexer<StreamError>,
}

impl SendableHub {
    pub(crate) fn new() -> Self {
        Self {
            sendables: Multiplexer::new(),
            messages: Multiplexer::new(),
            delivery_receipts: Multiplexer::new(),
            typing_states: Multiplexer::new(),
            presences: Multiplexer::new(),
            invitations: Multiplexer::new(),
            errors: Multiplexer::new(),
        }
    }

    /// Publishes one sendable envelope to the untyped stream and to the
    /// typed stream matching its kind tag. Unknown kinds only reach the
    /// untyped stream.
    pub(crate) fn route(&self, envelope: &EventEnvelope<Sendable>) {
        self.sendables.publish(envelope.clone());

        let Some(sendable) = envelope.payload() else {
            return;
        };

        if sendable.is_kind(SendableKind::Message) {
            match Message::from_sendable(sendable) {
                Ok(message) => self.messages.publish(envelope.with_payload(message)),
                Err(e) => self.publish_error(StreamError::new(e.to_string())),
            }
        } else if sendable.is_kind(SendableKind::DeliveryReceipt) {
            match DeliveryReceipt::from_sendable(sendable) {
                Ok(receipt) => self
                    .delivery_receipts
                    .publish(envelope.with_payload(receipt)),
                Err(e) => self.publish_error(StreamError::new(e.to_string())),
            }
        } else if sendable.is_kind(SendableKind::TypingState) {
            match TypingState::from_sendable(sendable) {
                Ok(typing) => self.typing_states.publish(envelope.with_payload(typing)),
                Err(e) => self.publish_error(StreamError::new(e.to_string())),
            }
        } else if sendable.is_kind(SendableKind::Presence) {
            match Presence::from_sendable(sendable) {
                Ok(presence) => self.presences.publish(envelope.with_payload(presence)),
                Err(e) => self.publish_error(StreamError::new(e.to_string())),
            }
        } else if sendable.is_kind(SendableKind::Invitation) {
            match Invitation::from_sendable(sendable) {
                Ok(invitation) => self.invitations.publish(envelope.with_payload(invitation)),
                Err(e) => self.publish_error(StreamError::new(e.to_string())),
            }
        }
    }

    pub(crate) fn publish_error(&self, error: StreamError) {
        tracing::debug!(%error, "lane error");
        self.errors.publish(error);
    }

    /// Every envelope, whatever its kind.
    pub fn sendables(&self) -> &EnvelopeMux<Sendable> {
        &self.sendables
    }

    pub fn messages(&self) -> &EnvelopeMux<Message> {
        &self.messages
    }

    pub fn delivery_receipts(&self) -> &EnvelopeMux<DeliveryReceipt> {
        &self.delivery_receipts
    }

    pub fn typing_states(&self) -> &EnvelopeMux<TypingState> {
        &self.typing_states
    }

    pub fn presences(&self) -> &EnvelopeMux<Presence> {
        &self.presences
    }

    pub fn invitations(&self) -> &EnvelopeMux<Invitation> {
        &self.invitations
    }

    /// The lane's error stream. Live-only: errors are observed, not
    /// replayed to late subscribers.
    pub fn errors(&self) -> estuary_events::EventStream<StreamError> {
        self.errors.live()
    }

    /// Terminates every stream owned by this hub.
    pub(crate) fn close(&self) {
        self.sendables.close();
        self.messages.close();
        self.delivery_receipts.close();
        self.typing_states.close();
        self.presences.close();
        self.invitations.close();
        self.errors.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estuary_types::{DeliveryReceiptType, FieldMap};
    use futures_util::StreamExt;

    fn stamped(kind: SendableKind, body: FieldMap) -> Sendable {
        Sendable::draft(kind, body).stamped("s1", "alice", chrono::Utc::now())
    }

    #[tokio::test]
    async fn routes_to_untyped_and_typed_streams() {
        let hub = SendableHub::new();
        let receipt = DeliveryReceipt::new(DeliveryReceiptType::Received, "m1")
            .into_sendable()
            .stamped("r1", "bob", chrono::Utc::now());

        hub.route(&EventEnvelope::added(receipt));

        let envelope = hub.sendables().replay_all().next().await.unwrap().unwrap();
        assert_eq!(envelope.payload().unwrap().id(), "r1");

        let typed = hub
            .delivery_receipts()
            .replay_all()
            .next()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(typed.payload().unwrap().message_id().unwrap(), "m1");
    }

    #[tokio::test]
    async fn unknown_kind_reaches_only_the_untyped_stream() {
        let hub = SendableHub::new();
        let mut fields = FieldMap::new();
        fields.insert("emoji".to_string(), serde_json::Value::from("+1"));
        let mut sendable = stamped(SendableKind::Message, fields);
        // Rewrite the kind tag to something no typed stream knows.
        let mut raw = sendable.to_fields();
        raw.insert(
            estuary_types::keys::TYPE.to_string(),
            serde_json::Value::from("reaction"),
        );
        sendable = Sendable::from_fields("x1", &raw).unwrap();

        hub.route(&EventEnvelope::added(sendable));

        let untyped = hub.sendables().replay_all().next().await.unwrap().unwrap();
        assert_eq!(untyped.payload().unwrap().kind(), "reaction");

        hub.messages().close();
        let mut messages = hub.messages().replay_all();
        assert!(messages.next().await.is_none());
    }
}
