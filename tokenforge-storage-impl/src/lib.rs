pub mod loader;
pub mod memory;
pub mod storage_traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export the main types for convenience
pub use loader::{AggregateLoader, TransitionRequest};
pub use memory::MemoryRecordStore;
pub use storage_traits::{ConditionalUpdate, Filter, Record, RecordStore, Table};

// Re-export the storage implementations
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRecordStore;
