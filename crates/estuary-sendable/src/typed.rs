//! Typed projections over [`Sendable`].
//!
//! Each projection wraps a complete sendable and is only constructible
//! from one of the right kind, so converting sendable → projection →
//! sendable round-trips exactly.

use estuary_types::{
    keys, DeliveryReceiptType, FieldMap, InvitationType, PresenceType, TypingStateType,
};
use serde_json::Value;

use crate::{Sendable, SendableError, SendableKind};

fn expect_kind(sendable: &Sendable, kind: SendableKind) -> Result<Sendable, SendableError> {
    if sendable.is_kind(kind) {
        Ok(sendable.clone())
    } else {
        Err(SendableError::KindMismatch {
            expected: kind.as_str(),
            found: sendable.kind().to_string(),
        })
    }
}

fn tagged_body(tag: &str) -> FieldMap {
    let mut body = FieldMap::new();
    body.insert(keys::TYPE.to_string(), Value::from(tag));
    body
}

/// A user-visible message with an arbitrary body.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    inner: Sendable,
}

impl Message {
    pub fn with_body(body: FieldMap) -> Self {
        Self {
            inner: Sendable::draft(SendableKind::Message, body),
        }
    }

    pub fn from_sendable(sendable: &Sendable) -> Result<Self, SendableError> {
        expect_kind(sendable, SendableKind::Message).map(|inner| Self { inner })
    }

    pub fn into_sendable(self) -> Sendable {
        self.inner
    }
}

impl std::ops::Deref for Message {
    type Target = Sendable;

    fn deref(&self) -> &Sendable {
        &self.inner
    }
}

impl AsRef<Sendable> for Message {
    fn as_ref(&self) -> &Sendable {
        &self.inner
    }
}

/// A text message: a [`Message`] whose body carries a `text` field.
#[derive(Debug, Clone, PartialEq)]
pub struct TextMessage {
    inner: Sendable,
}

impl TextMessage {
    /// Body key holding the text.
    pub const TEXT: &'static str = "text";

    pub fn new(text: &str) -> Self {
        let mut body = FieldMap::new();
        body.insert(Self::TEXT.to_string(), Value::from(text));
        Self {
            inner: Sendable::draft(SendableKind::Message, body),
        }
    }

    pub fn from_sendable(sendable: &Sendable) -> Result<Self, SendableError> {
        expect_kind(sendable, SendableKind::Message).map(|inner| Self { inner })
    }

    pub fn text(&self) -> Result<&str, SendableError> {
        self.inner.body_str(Self::TEXT)
    }

    pub fn into_sendable(self) -> Sendable {
        self.inner
    }
}

impl std::ops::Deref for TextMessage {
    type Target = Sendable;

    fn deref(&self) -> &Sendable {
        &self.inner
    }
}

impl AsRef<Sendable> for TextMessage {
    fn as_ref(&self) -> &Sendable {
        &self.inner
    }
}

/// A receipt acknowledging one message, referencing it by id.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReceipt {
    inner: Sendable,
}

impl DeliveryReceipt {
    /// Body key holding the referenced message id.
    pub const MESSAGE_ID: &'static str = "id";

    pub fn new(receipt_type: DeliveryReceiptType, message_id: &str) -> Self {
        let mut body = tagged_body(receipt_type.as_str());
        body.insert(Self::MESSAGE_ID.to_string(), Value::from(message_id));
        Self {
            inner: Sendable::draft(SendableKind::DeliveryReceipt, body),
        }
    }

    pub fn from_sendable(sendable: &Sendable) -> Result<Self, SendableError> {
        expect_kind(sendable, SendableKind::DeliveryReceipt).map(|inner| Self { inner })
    }

    pub fn message_id(&self) -> Result<&str, SendableError> {
        self.inner.body_str(Self::MESSAGE_ID)
    }

    pub fn receipt_type(&self) -> Result<DeliveryReceiptType, SendableError> {
        Ok(self.inner.body_str(keys::TYPE)?.parse()?)
    }

    pub fn into_sendable(self) -> Sendable {
        self.inner
    }
}

impl std::ops::Deref for DeliveryReceipt {
    type Target = Sendable;

    fn deref(&self) -> &Sendable {
        &self.inner
    }
}

impl AsRef<Sendable> for DeliveryReceipt {
    fn as_ref(&self) -> &Sendable {
        &self.inner
    }
}

/// A typing indicator; carries only its sub-type tag.
#[derive(Debug, Clone, PartialEq)]
pub struct TypingState {
    inner: Sendable,
}

impl TypingState {
    pub fn new(state: TypingStateType) -> Self {
        Self {
            inner: Sendable::draft(SendableKind::TypingState, tagged_body(state.as_str())),
        }
    }

    pub fn from_sendable(sendable: &Sendable) -> Result<Self, SendableError> {
        expect_kind(sendable, SendableKind::TypingState).map(|inner| Self { inner })
    }

    pub fn typing_state_type(&self) -> Result<TypingStateType, SendableError> {
        Ok(self.inner.body_str(keys::TYPE)?.parse()?)
    }

    pub fn into_sendable(self) -> Sendable {
        self.inner
    }
}

impl std::ops::Deref for TypingState {
    type Target = Sendable;

    fn deref(&self) -> &Sendable {
        &self.inner
    }
}

impl AsRef<Sendable> for TypingState {
    fn as_ref(&self) -> &Sendable {
        &self.inner
    }
}

/// A presence update; carries only its sub-type tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Presence {
    inner: Sendable,
}

impl Presence {
    pub fn new(presence_type: PresenceType) -> Self {
        Self {
            inner: Sendable::draft(SendableKind::Presence, tagged_body(presence_type.as_str())),
        }
    }

    pub fn from_sendable(sendable: &Sendable) -> Result<Self, SendableError> {
        expect_kind(sendable, SendableKind::Presence).map(|inner| Self { inner })
    }

    pub fn presence_type(&self) -> Result<PresenceType, SendableError> {
        Ok(self.inner.body_str(keys::TYPE)?.parse()?)
    }

    pub fn into_sendable(self) -> Sendable {
        self.inner
    }
}

impl std::ops::Deref for Presence {
    type Target = Sendable;

    fn deref(&self) -> &Sendable {
        &self.inner
    }
}

impl AsRef<Sendable> for Presence {
    fn as_ref(&self) -> &Sendable {
        &self.inner
    }
}

/// An invitation to join something, referencing it by id.
///
/// Only the `chat` sub-tag is actionable; other sub-tags are accepted
/// off the wire and ignored by the invitation handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Invitation {
    inner: Sendable,
}

impl Invitation {
    /// Body key holding the referenced chat id.
    pub const CHAT_ID: &'static str = "id";

    pub fn new(invitation_type: InvitationType, chat_id: &str) -> Self {
        let mut body = tagged_body(invitation_type.as_str());
        body.insert(Self::CHAT_ID.to_string(), Value::from(chat_id));
        Self {
            inner: Sendable::draft(SendableKind::Invitation, body),
        }
    }

    pub fn from_sendable(sendable: &Sendable) -> Result<Self, SendableError> {
        expect_kind(sendable, SendableKind::Invitation).map(|inner| Self { inner })
    }

    pub fn chat_id(&self) -> Result<&str, SendableError> {
        self.inner.body_str(Self::CHAT_ID)
    }

    /// The parsed sub-tag; unrecognised tags return an error the caller
    /// treats as "not actionable".
    pub fn invitation_type(&self) -> Result<InvitationType, SendableError> {
        Ok(self.inner.body_str(keys::TYPE)?.parse()?)
    }

    pub fn into_sendable(self) -> Sendable {
        self.inner
    }
}

impl std::ops::Deref for Invitation {
    type Target = Sendable;

    fn deref(&self) -> &Sendable {
        &self.inner
    }
}

impl AsRef<Sendable> for Invitation {
    fn as_ref(&self) -> &Sendable {
        &self.inner
    }
}
