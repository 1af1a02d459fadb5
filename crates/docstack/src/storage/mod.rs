pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

pub use memory::{MemoryIndexStore, MemoryStoreFactory};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteIndexStore, SqliteStoreFactory};
pub use traits::{IndexStore, KeyRange, StoreFactory};
