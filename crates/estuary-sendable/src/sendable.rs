//! The concrete sendable struct.

use chrono::{DateTime, Utc};
use estuary_types::{keys, time, FieldMap};
use serde_json::Value;

use crate::SendableError;

/// The closed set of protocol kind tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendableKind {
    Message,
    DeliveryReceipt,
    TypingState,
    Presence,
    Invitation,
}

impl SendableKind {
    /// Returns the wire tag for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::DeliveryReceipt => "receipt",
            Self::TypingState => "typing",
            Self::Presence => "presence",
            Self::Invitation => "invitation",
        }
    }
}

impl std::fmt::Display for SendableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any typed payload exchanged between users.
///
/// The kind tag stays a plain string so unrecognised payloads from newer
/// peers still flow through the untyped sendable stream; the typed
/// projections in [`crate::typed`] only accept their own kind.
///
/// A sendable is immutable once it sits in a chat's materialized list,
/// except for the in-place field copy performed when a `Modified`
/// reconciliation updates it (see [`Sendable::merge_from`]).
#[derive(Debug, Clone, PartialEq)]
pub struct Sendable {
    id: String,
    from: String,
    date: DateTime<Utc>,
    kind: String,
    body: FieldMap,
}

impl Sendable {
    /// Creates an outbound draft: no id, no sender, and a local
    /// timestamp estimate. The lane stamps all three at send time.
    pub fn draft(kind: SendableKind, body: FieldMap) -> Self {
        Self {
            id: String::new(),
            from: String::new(),
            date: Utc::now(),
            kind: kind.as_str().to_string(),
            body,
        }
    }

    /// Returns a copy stamped with the identity the store write will
    /// carry: the allocated entry id, the sending user, and the
    /// canonical server timestamp.
    pub fn stamped(&self, id: &str, from: &str, date: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            from: from.to_string(),
            date,
            kind: self.kind.clone(),
            body: self.body.clone(),
        }
    }

    /// Parses a sendable from a stored entry. `from`, `date` and `type`
    /// are required; the body defaults to an empty map.
    pub fn from_fields(id: &str, fields: &FieldMap) -> Result<Self, SendableError> {
        let missing = |field: &'static str| SendableError::MissingField {
            id: id.to_string(),
            field,
        };
        let from = fields
            .get(keys::FROM)
            .and_then(Value::as_str)
            .ok_or(missing(keys::FROM))?;
        let date = fields
            .get(keys::DATE)
            .and_then(Value::as_i64)
            .and_then(time::from_millis)
            .ok_or(missing(keys::DATE))?;
        let kind = fields
            .get(keys::TYPE)
            .and_then(Value::as_str)
            .ok_or(missing(keys::TYPE))?;
        let body = fields
            .get(keys::BODY)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Ok(Self {
            id: id.to_string(),
            from: from.to_string(),
            date,
            kind: kind.to_string(),
            body,
        })
    }

    /// Serialises this sendable to its stored field map.
    pub fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert(keys::FROM.to_string(), Value::from(self.from.clone()));
        fields.insert(keys::DATE.to_string(), Value::from(time::to_millis(self.date)));
        fields.insert(keys::TYPE.to_string(), Value::from(self.kind.clone()));
        fields.insert(keys::BODY.to_string(), Value::Object(self.body.clone()));
        fields
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    /// The wire kind tag.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is_kind(&self, kind: SendableKind) -> bool {
        self.kind == kind.as_str()
    }

    pub fn body(&self) -> &FieldMap {
        &self.body
    }

    /// The body's sub-type tag, when present.
    pub fn body_type(&self) -> Option<&str> {
        self.body.get(keys::TYPE).and_then(Value::as_str)
    }

    /// Reads a required string out of the body.
    pub fn body_str(&self, key: &'static str) -> Result<&str, SendableError> {
        self.body
            .get(key)
            .and_then(Value::as_str)
            .ok_or(SendableError::MissingBodyKey(key))
    }

    /// Copies the value fields of `other` onto `self`, preserving the
    /// receiver's identity. Used when a `Modified` reconciliation
    /// updates an entry held in a materialized list.
    pub fn merge_from(&mut self, other: &Sendable) {
        self.from = other.from.clone();
        self.date = other.date;
        self.kind = other.kind.clone();
        self.body = other.body.clone();
    }
}

impl AsRef<Sendable> for Sendable {
    fn as_ref(&self) -> &Sendable {
        self
    }
}
