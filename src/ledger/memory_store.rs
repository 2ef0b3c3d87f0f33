use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::error::LedgerError;
use crate::ledger::store::{FieldChange, LedgerStore, MappingStore, ObjectMapping};
use crate::object::ObjectType;

/// In-memory ledger store for tests and embedding without SQLite. Clones
/// share the same rows. Write-through: `clear_unit_of_work` has nothing to
/// release.
pub struct MemoryLedger {
    changes: Arc<RwLock<Vec<FieldChange>>>,
    mappings: Arc<RwLock<Vec<ObjectMapping>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self {
            changes: Arc::new(RwLock::new(Vec::new())),
            mappings: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Clone for MemoryLedger {
    fn clone(&self) -> Self {
        Self {
            changes: self.changes.clone(),
            mappings: self.mappings.clone(),
        }
    }
}

impl LedgerStore for MemoryLedger {
    fn delete_for_object(
        &self,
        object_id: i64,
        object_type: ObjectType,
    ) -> Result<(), LedgerError> {
        let mut changes = self.changes.write().map_err(|_| LedgerError::LockPoisoned)?;
        changes.retain(|c| !(c.object_id == object_id && c.object_type == object_type));
        Ok(())
    }

    fn delete_for_object_columns(
        &self,
        object_id: i64,
        object_type: ObjectType,
        columns: &[String],
    ) -> Result<(), LedgerError> {
        if columns.is_empty() {
            return Ok(());
        }
        let mut changes = self.changes.write().map_err(|_| LedgerError::LockPoisoned)?;
        changes.retain(|c| {
            !(c.object_id == object_id
                && c.object_type == object_type
                && columns.contains(&c.column_name))
        });
        Ok(())
    }

    fn save_batch(&self, rows: Vec<FieldChange>) -> Result<(), LedgerError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut changes = self.changes.write().map_err(|_| LedgerError::LockPoisoned)?;
        for mut row in rows {
            if row.id.is_empty() {
                row.id = Uuid::now_v7().to_string();
            }
            changes.push(row);
        }
        Ok(())
    }

    fn clear_unit_of_work(&self) -> Result<(), LedgerError> {
        Ok(())
    }

    fn pending_changes(
        &self,
        integration: &str,
        object_type: ObjectType,
    ) -> Result<Vec<FieldChange>, LedgerError> {
        let changes = self.changes.read().map_err(|_| LedgerError::LockPoisoned)?;
        let mut rows: Vec<FieldChange> = changes
            .iter()
            .filter(|c| c.integration == integration && c.object_type == object_type)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (a.modified_at, a.object_id, &a.column_name)
                .cmp(&(b.modified_at, b.object_id, &b.column_name))
        });
        Ok(rows)
    }

    fn changes_for_object(
        &self,
        object_id: i64,
        object_type: ObjectType,
    ) -> Result<Vec<FieldChange>, LedgerError> {
        let changes = self.changes.read().map_err(|_| LedgerError::LockPoisoned)?;
        let mut rows: Vec<FieldChange> = changes
            .iter()
            .filter(|c| c.object_id == object_id && c.object_type == object_type)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (a.modified_at, &a.column_name, &a.integration)
                .cmp(&(b.modified_at, &b.column_name, &b.integration))
        });
        Ok(rows)
    }
}

impl MappingStore for MemoryLedger {
    fn save_mapping(&self, mut mapping: ObjectMapping) -> Result<ObjectMapping, LedgerError> {
        if mapping.id.is_empty() {
            mapping.id = Uuid::now_v7().to_string();
        }
        let mut mappings = self.mappings.write().map_err(|_| LedgerError::LockPoisoned)?;
        mappings.retain(|m| m.id != mapping.id);
        mappings.push(mapping.clone());
        Ok(mapping)
    }

    fn mappings_for_object(
        &self,
        object_id: i64,
        object_type: ObjectType,
    ) -> Result<Vec<ObjectMapping>, LedgerError> {
        let mappings = self.mappings.read().map_err(|_| LedgerError::LockPoisoned)?;
        let mut rows: Vec<ObjectMapping> = mappings
            .iter()
            .filter(|m| m.object_id == object_id && m.object_type == object_type)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.integration.cmp(&b.integration));
        Ok(rows)
    }

    fn delete_for_object(
        &self,
        object_id: i64,
        object_type: ObjectType,
    ) -> Result<(), LedgerError> {
        let mut mappings = self.mappings.write().map_err(|_| LedgerError::LockPoisoned)?;
        mappings.retain(|m| !(m.object_id == object_id && m.object_type == object_type));
        Ok(())
    }
}
