//! Shared value types for the Estuary messaging SDK.
//!
//! This crate provides the foundational types used across all Estuary
//! crates: the role permission lattice, contact and sendable sub-type
//! tags, user and chat-metadata records, mute horizons, and the wire
//! field-name constants.
//!
//! No crate in the workspace depends on anything *except* `estuary-types`
//! for cross-cutting type definitions. This keeps the dependency graph
//! clean and prevents circular dependencies.

mod meta;
mod muted;
mod role;
mod tags;
pub mod time;
mod user;

pub mod keys;

pub use meta::ChatMeta;
pub use muted::{MutedEntry, MutedUntil};
pub use role::{level_of, RoleType};
pub use tags::{
    ContactType, DeliveryReceiptType, InvitationType, ParseTagError, PresenceType,
    TypingStateType,
};
pub use user::{date_fields, User};

/// A raw field map as stored by the backing store: string keys to JSON
/// values. This is the pre-parse shape of every entry and scalar document.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;
