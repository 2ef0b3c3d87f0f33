use thiserror::Error;

/// All errors that can arise from ledger operations.
///
/// Note the propagation split: [`LedgerError::IntegrationNotFound`] aborts a
/// whole record call, while a hook veto ([`crate::hooks::FieldChangeRejected`])
/// is deliberately not represented here — it only ever skips one integration
/// and never reaches the caller.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An enabled integration name has no registered definition.
    #[error("integration not found: {name}")]
    IntegrationNotFound { name: String },

    /// An error from the underlying SQLite store.
    #[error("ledger store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Schema migration failure while opening a store.
    #[error("migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    /// A column value failed to encode to its stored form.
    #[error("value encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// A stored column value failed to decode.
    #[error("value decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Registry configuration failed to parse.
    #[error("registry config error: {0}")]
    Config(#[from] serde_json::Error),

    /// A stored row could not be mapped back onto its struct.
    #[error("row mapping error: {0}")]
    RowMapping(#[from] serde_rusqlite::Error),

    /// A shared lock was poisoned by a panicking writer.
    #[error("ledger lock poisoned")]
    LockPoisoned,
}
