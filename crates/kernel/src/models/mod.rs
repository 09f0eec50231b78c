//! Stored records and the storage abstraction.

pub mod event;
pub mod record;

pub use event::{Event, EventInput};
pub use record::{Base, MemoryStore, Record, Store, StoreError};
