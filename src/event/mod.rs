//! The event fabric (spec §4.5): event types, per-run sequence numbering,
//! in-memory fan-out bus, and an append-only event store.

mod bus;
mod event;
mod seq;
mod store;

pub use bus::{EventBus, Subscription};
pub use event::{Event, EventBuilder, EventKind};
pub use seq::SequenceCounter;
pub use store::{EventStore, InMemoryEventStore};
