//! Backing-store abstraction for the Estuary messaging SDK.
//!
//! Estuary is built on a generic hierarchical realtime data store. This
//! crate defines the minimum surface the SDK depends on — the
//! [`StoreDriver`] trait — together with the path model, the raw entry
//! shape ([`ListEntry`]), date-range queries ([`StoreQuery`]) and an
//! in-memory reference driver ([`MemoryDriver`]).
//!
//! The driver contract every backend must honor:
//!
//! - `watch_list` streams are ordered and at-least-once; on attach the
//!   collection's current entries are replayed as `Added` envelopes,
//!   then live changes follow in arrival order.
//! - Queries are ordered ascending by the entry's `date` field, `from`
//!   exclusive, `to` inclusive; entries with equal dates keep their
//!   arrival order.
//! - `allocate_id` hands out the id of a future entry synchronously,
//!   before any write is committed.

mod driver;
mod entry;
mod feed;
mod memory;
mod path;

pub use driver::{ListStream, StoreDriver, StoreError, ValueStream};
pub use entry::{apply_query, BatchOp, ListEntry, StoreQuery};
pub use feed::ChangeFeed;
pub use memory::MemoryDriver;
pub use path::{segment_valid, Path, Paths};
