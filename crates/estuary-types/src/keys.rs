//! Wire field-name constants shared by every entry and payload written to
//! the backing store.

/// Sendable type tag / contact type tag field.
pub const TYPE: &str = "type";
/// Sender user id field on a sendable.
pub const FROM: &str = "from";
/// Canonical timestamp field (integer Unix milliseconds).
pub const DATE: &str = "date";
/// Typed body field on a sendable.
pub const BODY: &str = "body";

/// Chat display name field.
pub const NAME: &str = "name";
/// Chat image URL field.
pub const IMAGE_URL: &str = "image-url";
/// Chat creation timestamp field.
pub const CREATED: &str = "created";
/// Role field on a chat roster entry.
pub const ROLE: &str = "role";
/// Custom data field on chat metadata.
pub const DATA: &str = "data";

/// Path segment: per-user and per-chat user collections.
pub const USERS: &str = "users";
/// Path segment: message lanes.
pub const MESSAGES: &str = "messages";
/// Path segment: the current user's contact list.
pub const CONTACTS: &str = "contacts";
/// Path segment: the current user's blocked list.
pub const BLOCKED: &str = "blocked";
/// Path segment: chat collections.
pub const CHATS: &str = "chats";
/// Path segment: chat metadata scalar.
pub const META: &str = "meta";
/// Path segment: the current user's muted map.
pub const MUTED: &str = "muted";
