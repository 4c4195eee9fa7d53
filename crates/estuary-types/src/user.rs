//! User records as they appear in rosters, contact lists and blocked
//! lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{keys, time, ContactType, FieldMap, RoleType};

/// A user as materialized from one identity-keyed collection.
///
/// The optional fields depend on which collection the record came from: a
/// chat roster entry carries a role, a contact entry carries a contact
/// type, and a blocked entry carries neither. Values handed to API
/// callers are detached snapshots; mutating a snapshot never mutates the
/// collection it was copied from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_type: Option<ContactType>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: None,
            contact_type: None,
        }
    }

    pub fn with_role(id: impl Into<String>, role: RoleType) -> Self {
        Self {
            role: Some(role),
            ..Self::new(id)
        }
    }

    pub fn with_contact_type(id: impl Into<String>, contact_type: ContactType) -> Self {
        Self {
            contact_type: Some(contact_type),
            ..Self::new(id)
        }
    }

    /// Parses a user from a raw entry, using the fields present to decide
    /// the record's shape: a `role` field marks a chat roster entry, a
    /// `type` field marks a contact entry, anything else is id-only.
    pub fn from_fields(id: &str, fields: &FieldMap) -> Self {
        if let Some(role) = fields
            .get(keys::ROLE)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
        {
            return Self::with_role(id, role);
        }
        if let Some(contact_type) = fields
            .get(keys::TYPE)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
        {
            return Self::with_contact_type(id, contact_type);
        }
        Self::new(id)
    }

    /// Copies the updatable fields of `other` onto `self`, preserving the
    /// receiver's identity. Used when reconciling a `Modified` event onto
    /// an existing collection entry.
    pub fn merge_from(&mut self, other: &User) {
        self.role = other.role;
        self.contact_type = other.contact_type;
    }

    /// The fields written for this user into a chat roster.
    pub fn role_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        if let Some(role) = self.role {
            fields.insert(keys::ROLE.to_string(), Value::from(role.as_str()));
        }
        fields
    }

    /// The fields written for this user into the contact list.
    pub fn contact_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        if let Some(contact_type) = self.contact_type {
            fields.insert(keys::TYPE.to_string(), Value::from(contact_type.as_str()));
        }
        fields
    }
}

/// The fields written for date-stamped entries (e.g. the blocked list).
pub fn date_fields(date: DateTime<Utc>) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert(keys::DATE.to_string(), Value::from(time::to_millis(date)));
    fields
}
