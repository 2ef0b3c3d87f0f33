use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::object::ObjectType;
use crate::value::VariableType;

/// One pending field change awaiting sync. At most one "current" row exists
/// per (object_type, object_id, column_name, integration); the invariant is
/// enforced by delete-before-insert, not by a key.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldChange {
    /// UUIDv7 row id. Leave empty to have the store assign one on insert.
    pub id: String,
    pub object_type: ObjectType,
    pub object_id: i64,
    pub column_name: String,
    pub column_type: VariableType,
    pub column_value: Vec<u8>,
    /// Unix epoch milliseconds.
    pub modified_at: i64,
    pub integration: String,
}

/// Correlates an object with its counterpart in an external system. Only the
/// deletion cascade and minimal save/list operations are in scope here; the
/// external sync driver owns the rest of its lifecycle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMapping {
    /// UUIDv7 row id. Leave empty to have the store assign one on save.
    #[serde(default)]
    pub id: String,
    pub integration: String,
    pub object_type: ObjectType,
    pub object_id: i64,
    pub external_object_name: String,
    pub external_object_id: String,
    pub last_sync_at: Option<i64>,
}

/// Persistence seam for the field-change ledger.
pub trait LedgerStore: Send + Sync {
    /// Removes every ledger row for the object, across all integrations.
    fn delete_for_object(&self, object_id: i64, object_type: ObjectType)
        -> Result<(), LedgerError>;

    /// Removes the ledger rows for the object whose column is in `columns`,
    /// across all integrations. Empty `columns` is a no-op.
    fn delete_for_object_columns(
        &self,
        object_id: i64,
        object_type: ObjectType,
        columns: &[String],
    ) -> Result<(), LedgerError>;

    /// Inserts the rows, assigning ids where absent. Empty input is a no-op.
    fn save_batch(&self, rows: Vec<FieldChange>) -> Result<(), LedgerError>;

    /// Releases per-batch cached resources. Write-through stores with nothing
    /// cached may no-op.
    fn clear_unit_of_work(&self) -> Result<(), LedgerError>;

    /// Replaces the "current" rows for the touched columns: delete then
    /// insert. The default is best-effort two-step; transactional stores
    /// should override this to run both steps in one transaction.
    fn replace_for_columns(
        &self,
        object_id: i64,
        object_type: ObjectType,
        columns: &[String],
        rows: Vec<FieldChange>,
    ) -> Result<(), LedgerError> {
        self.delete_for_object_columns(object_id, object_type, columns)?;
        self.save_batch(rows)
    }

    /// All pending rows for one integration and object type, ordered by
    /// (modified_at, object_id, column_name).
    fn pending_changes(
        &self,
        integration: &str,
        object_type: ObjectType,
    ) -> Result<Vec<FieldChange>, LedgerError>;

    /// All pending rows for one object across integrations, ordered by
    /// (modified_at, column_name, integration).
    fn changes_for_object(
        &self,
        object_id: i64,
        object_type: ObjectType,
    ) -> Result<Vec<FieldChange>, LedgerError>;
}

/// Persistence seam for external-object mappings.
pub trait MappingStore: Send + Sync {
    /// Upserts a mapping, assigning an id when absent, and returns it.
    fn save_mapping(&self, mapping: ObjectMapping) -> Result<ObjectMapping, LedgerError>;

    /// All mappings for one object, ordered by integration name.
    fn mappings_for_object(
        &self,
        object_id: i64,
        object_type: ObjectType,
    ) -> Result<Vec<ObjectMapping>, LedgerError>;

    /// Removes every mapping for the object.
    fn delete_for_object(&self, object_id: i64, object_type: ObjectType)
        -> Result<(), LedgerError>;
}
