pub mod error;
pub mod hooks;
pub mod ledger;
pub mod notifier;
pub mod object;
pub mod recorder;
pub mod registry;
pub mod tracker;
pub mod value;

pub use error::LedgerError;
pub use ledger::{FieldChange, LedgerStore, MappingStore, MemoryLedger, ObjectMapping, SqliteLedger};
pub use recorder::ChangeRecorder;
pub use tracker::{ChangeTracker, RecordContext};
pub use rusqlite;
pub use rusqlite_migration;
