//! Storage backends for the canonical graph.
//!
//! [`traits::GraphStore`] is the abstract contract; [`memory`] is the
//! in-memory reference backend, and [`sqlite`] (feature `sqlite`) the
//! durable one.

mod memory;
mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::InMemoryGraphStore;
pub use traits::{
    EdgeUpsert, EventUpsert, GraphStore, StorageError, StoreCounts, Upserted,
};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteGraphStore;
