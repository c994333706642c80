//! Persistence Adapters - In-Memory Store and File Storage
//!
//! Implements the `Store` port in memory, the `Journal` port using
//! append-only JSONL files, and atomic JSON snapshots that let the
//! store survive a restart. No database dependency.

pub mod journal;
pub mod memory_store;
pub mod state;

pub use journal::JsonlJournal;
pub use memory_store::InMemoryStore;
pub use state::{SnapshotFile, StoreSnapshot};
