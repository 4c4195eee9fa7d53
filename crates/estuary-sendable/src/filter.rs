//! Composable predicates over sendable event envelopes.
//!
//! Used to build the delivery-receipt policy and the inbox cleanup
//! rules: predicates compose with [`all`], which ANDs them in order and
//! short-circuits at the first failure.

use std::sync::Arc;

use estuary_events::{EventEnvelope, EventKind};

use crate::{Sendable, SendableKind};

/// A shareable predicate over change envelopes.
pub type Predicate<T> = Arc<dyn Fn(&EventEnvelope<T>) -> bool + Send + Sync>;

/// ANDs predicates left to right, stopping at the first that fails.
pub fn all<T: 'static>(predicates: Vec<Predicate<T>>) -> Predicate<T> {
    Arc::new(move |event| predicates.iter().all(|p| p(event)))
}

/// Passes events whose kind is one of `kinds`.
pub fn by_event_kind<T: 'static>(kinds: &[EventKind]) -> Predicate<T> {
    let kinds = kinds.to_vec();
    Arc::new(move |event| kinds.contains(&event.kind()))
}

/// Passes events whose payload was not sent by `user_id`.
pub fn not_from<T: AsRef<Sendable> + 'static>(user_id: impl Into<String>) -> Predicate<T> {
    let user_id = user_id.into();
    Arc::new(move |event| {
        event
            .payload()
            .map(|p| p.as_ref().from() != user_id)
            .unwrap_or(false)
    })
}

/// Passes events whose payload is one of the given sendable kinds.
pub fn by_sendable_kind<T: AsRef<Sendable> + 'static>(kinds: &[SendableKind]) -> Predicate<T> {
    let kinds = kinds.to_vec();
    Arc::new(move |event| {
        event
            .payload()
            .map(|p| kinds.iter().any(|k| p.as_ref().is_kind(*k)))
            .unwrap_or(false)
    })
}

/// Passes every event. Used as the neutral element when a caller
/// supplies no override predicate.
pub fn always<T: 'static>() -> Predicate<T> {
    Arc::new(|_| true)
}
