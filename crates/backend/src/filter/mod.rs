//! Seen-set tracking
//!
//! [`SeenFilter`] is the bounded-memory bloom filter itself; [`FilterStore`]
//! owns the process-wide instance and its load/save lifecycle against a
//! [`FilterPersistence`] collaborator.

mod persist;
mod seen;
mod store;

pub use persist::{FilePersistence, FilterPersistence, MemoryPersistence, PersistenceError};
pub use seen::{FilterError, SeenFilter};
pub use store::{FilterStats, FilterStore};
