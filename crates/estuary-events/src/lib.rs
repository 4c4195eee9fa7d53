//! Event distribution primitives for the Estuary messaging SDK.
//!
//! Every change that flows through Estuary is wrapped in an
//! [`EventEnvelope`] tagged with the kind of change (`Added`, `Modified`,
//! `Removed`, `None`). Envelopes are fanned out to subscribers through a
//! [`Multiplexer`], which offers three views of the same change sequence:
//!
//! | View | On subscribe | Then |
//! |------|--------------|------|
//! | [`Multiplexer::live`] | nothing | only events published afterwards |
//! | [`Multiplexer::replay_all`] | every event since creation, in order | live events |
//! | [`Multiplexer::latest`] | the most recent event, once | live events |
//!
//! Publishing and subscribing synchronize on one internal lock, so a
//! subscriber observes either all of a publish or none of it, never a
//! partially applied one.

mod connection;
mod envelope;
mod error;
mod multiplexer;

pub use connection::ConnectionEvent;
pub use envelope::{EventEnvelope, EventKind};
pub use error::StreamError;
pub use multiplexer::{EnvelopeMux, EventStream, Multiplexer};
