// Re-export the public items of the ledger store modules
pub use memory_store::MemoryLedger;
pub use sqlite_store::SqliteLedger;
pub use store::{FieldChange, LedgerStore, MappingStore, ObjectMapping};

pub mod memory_store;
pub mod sqlite_store;
pub mod store;
