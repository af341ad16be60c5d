//! Shared building blocks for logship: the remote append-store abstraction and
//! its backends, the mutual-exclusion gate, and the wall clock.

pub mod clock;
pub mod gate;
pub mod storage;

pub use clock::{Clock, MockClock, SystemClock};
pub use gate::Gate;
pub use storage::config::ObjectStoreConfig;
pub use storage::factory::{create_append_store, create_object_store};
pub use storage::in_memory::InMemoryAppendStore;
pub use storage::object::ObjectAppendStore;
pub use storage::{AppendStore, ListPage, StorageError, StorageResult};
