//! The typed payload model exchanged between Estuary users.
//!
//! Everything sent through a message lane is a [`Sendable`]: one concrete
//! struct carrying an id, a sender, a timestamp, a kind tag and a typed
//! body map. The five protocol variants — [`Message`], [`DeliveryReceipt`],
//! [`TypingState`], [`Presence`], [`Invitation`] — are projections over a
//! `Sendable`, validated by the kind tag. Converting a sendable to a
//! projection and back is a lossless field copy.
//!
//! [`filter`] provides the composable predicates used by the
//! delivery-receipt policy and the inbox cleanup rules.

mod error;
pub mod filter;
mod sendable;
mod typed;

pub use error::SendableError;
pub use sendable::{Sendable, SendableKind};
pub use typed::{DeliveryReceipt, Invitation, Message, Presence, TextMessage, TypingState};
