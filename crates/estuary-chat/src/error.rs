//! Errors surfaced by chat and session operations.

use estuary_sendable::SendableError;
use estuary_store::StoreError;
use estuary_types::RoleType;

/// Errors returned by the public operation surface.
///
/// Permission and precondition failures are recoverable: the operation
/// failed, the session and its chats stay healthy. Store failures are
/// propagated unchanged; the SDK never retries on the caller's behalf.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The caller's role does not satisfy the operation's requirement.
    #[error("you must be a group {0} or higher to perform this action")]
    PermissionDenied(RoleType),

    /// No chat with the given id is known to this session.
    #[error("chat not found: {0}")]
    ChatNotFound(String),

    /// A group owner tried to leave a chat that still has other members.
    #[error("remove the other members before you can delete the group")]
    GroupNotEmpty,

    /// A backing-store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A payload failed to parse or project.
    #[error(transparent)]
    Sendable(#[from] SendableError),
}
