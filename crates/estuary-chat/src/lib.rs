//! Chat orchestration for the Estuary messaging SDK.
//!
//! Composes the lower layers — change envelopes and multiplexers
//! (`estuary-events`), the backing-store abstraction (`estuary-store`)
//! and the typed payload model (`estuary-sendable`) — into the public
//! SDK surface:
//!
//! - [`Session`]: one logical user session; owns the contact list,
//!   blocked list, muted map, joined-chat list and the user's 1-to-1
//!   inbox.
//! - [`Chat`]: one group or 1-to-1 chat; owns its member roster,
//!   metadata and message lane, and gates every mutating operation on
//!   the role lattice.
//!
//! # Usage
//!
//! ```rust,ignore
//! use estuary_chat::{Config, Session};
//! use estuary_store::MemoryDriver;
//! use std::sync::Arc;
//!
//! let driver = Arc::new(MemoryDriver::new());
//! let session = Session::connect(Config::default(), driver, "alice").await?;
//! let chat = session
//!     .create_chat("Crew", "https://example.com/crew.png", None, &users)
//!     .await?;
//! chat.send_message_with_text("ahoy").await?;
//! ```
//!
//! # Ordering contract
//!
//! Each watched collection is reconciled strictly in arrival order, but
//! different collections (say a chat's roster and its metadata) are
//! independent streams with no cross-stream ordering guarantee.

mod chat;
mod config;
mod error;
mod hub;
mod lane;
mod roster;
mod session;
mod tasks;

pub use chat::Chat;
pub use config::{Config, ConfigError};
pub use error::ChatError;
pub use hub::SendableHub;
pub use session::Session;
