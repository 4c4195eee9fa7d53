//! Session connection lifecycle events.

/// The connection state transitions of a session.
///
/// Delivered through a `tokio::sync::watch` channel, so a new observer
/// always sees the current state first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionEvent {
    /// No connection attempt has been made yet.
    #[default]
    None,
    WillConnect,
    DidConnect,
    WillDisconnect,
    DidDisconnect,
}

impl ConnectionEvent {
    /// True once the session has connected and not yet begun
    /// disconnecting.
    pub fn is_connected(self) -> bool {
        self == Self::DidConnect
    }
}
