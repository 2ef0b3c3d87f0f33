use std::sync::{Arc, Mutex};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql, params};
use rusqlite_migration::{M, Migrations};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::ledger::store::{FieldChange, LedgerStore, MappingStore, ObjectMapping};
use crate::object::ObjectType;
use crate::value::VariableType;

impl ToSql for ObjectType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for ObjectType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        ObjectType::parse(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

impl ToSql for VariableType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for VariableType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        VariableType::parse(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

/// SQLite-backed ledger store. Writes go through a single connection behind a
/// write lock; `replace_for_columns` runs its delete and insert steps in one
/// transaction.
#[derive(Clone)]
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    pub fn open_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn from_connection(mut conn: Connection) -> Result<Self, LedgerError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Self::migrations().to_latest(&mut conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrations() -> Migrations<'static> {
        Migrations::new(vec![M::up(
            "
            CREATE TABLE field_change (
                id           TEXT NOT NULL PRIMARY KEY,
                object_type  TEXT NOT NULL,
                object_id    INTEGER NOT NULL,
                column_name  TEXT NOT NULL,
                column_type  TEXT NOT NULL,
                column_value BLOB NOT NULL,
                modified_at  INTEGER NOT NULL,
                integration  TEXT NOT NULL
            );

            CREATE INDEX idx_field_change_object
                ON field_change (object_type, object_id);

            CREATE INDEX idx_field_change_integration
                ON field_change (integration, object_type);

            CREATE TABLE object_mapping (
                id                   TEXT NOT NULL PRIMARY KEY,
                integration          TEXT NOT NULL,
                object_type          TEXT NOT NULL,
                object_id            INTEGER NOT NULL,
                external_object_name TEXT NOT NULL,
                external_object_id   TEXT NOT NULL,
                last_sync_at         INTEGER
            );

            CREATE INDEX idx_object_mapping_object
                ON object_mapping (object_type, object_id);
            ",
        )])
    }

    fn delete_columns(
        conn: &Connection,
        object_id: i64,
        object_type: ObjectType,
        columns: &[String],
    ) -> Result<usize, LedgerError> {
        if columns.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "DELETE FROM field_change WHERE object_id = ? AND object_type = ? AND column_name IN ({})",
            placeholders
        );

        let mut values: Vec<&dyn ToSql> = vec![&object_id, &object_type];
        for column in columns {
            values.push(column);
        }

        log::debug!("SQL EXECUTE: {}", sql);
        let affected = conn.execute(&sql, &values[..])?;
        log::debug!("SQL EXECUTE RESULT: {} rows affected", affected);
        Ok(affected)
    }

    fn insert_rows(conn: &Connection, rows: Vec<FieldChange>) -> Result<(), LedgerError> {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO field_change (id, object_type, object_id, column_name, column_type, column_value, modified_at, integration)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for mut row in rows {
            if row.id.is_empty() {
                row.id = Uuid::now_v7().to_string();
            }
            log::debug!(
                "SQL EXECUTE: INSERT INTO field_change ({}/{} {} for {})",
                row.object_type,
                row.object_id,
                row.column_name,
                row.integration
            );
            stmt.execute(params![
                row.id,
                row.object_type,
                row.object_id,
                row.column_name,
                row.column_type,
                row.column_value,
                row.modified_at,
                row.integration,
            ])?;
        }
        Ok(())
    }

    fn row_to_field_change(row: &rusqlite::Row) -> rusqlite::Result<FieldChange> {
        Ok(FieldChange {
            id: row.get(0)?,
            object_type: row.get(1)?,
            object_id: row.get(2)?,
            column_name: row.get(3)?,
            column_type: row.get(4)?,
            column_value: row.get(5)?,
            modified_at: row.get(6)?,
            integration: row.get(7)?,
        })
    }
}

impl LedgerStore for SqliteLedger {
    fn delete_for_object(
        &self,
        object_id: i64,
        object_type: ObjectType,
    ) -> Result<(), LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::LockPoisoned)?;
        log::debug!("SQL EXECUTE: DELETE FROM field_change WHERE object_id = ? AND object_type = ?");
        let affected = conn.execute(
            "DELETE FROM field_change WHERE object_id = ? AND object_type = ?",
            params![object_id, object_type],
        )?;
        log::debug!("SQL EXECUTE RESULT: {} rows affected", affected);
        Ok(())
    }

    fn delete_for_object_columns(
        &self,
        object_id: i64,
        object_type: ObjectType,
        columns: &[String],
    ) -> Result<(), LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::LockPoisoned)?;
        Self::delete_columns(&conn, object_id, object_type, columns)?;
        Ok(())
    }

    fn save_batch(&self, rows: Vec<FieldChange>) -> Result<(), LedgerError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let tx = conn.transaction()?;
        Self::insert_rows(&tx, rows)?;
        tx.commit()?;
        Ok(())
    }

    fn clear_unit_of_work(&self) -> Result<(), LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::LockPoisoned)?;
        conn.flush_prepared_statement_cache();
        Ok(())
    }

    /// Delete and insert in a single transaction so a crash cannot leave the
    /// touched columns without a current row.
    fn replace_for_columns(
        &self,
        object_id: i64,
        object_type: ObjectType,
        columns: &[String],
        rows: Vec<FieldChange>,
    ) -> Result<(), LedgerError> {
        if columns.is_empty() && rows.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let tx = conn.transaction()?;
        Self::delete_columns(&tx, object_id, object_type, columns)?;
        Self::insert_rows(&tx, rows)?;
        tx.commit()?;
        Ok(())
    }

    fn pending_changes(
        &self,
        integration: &str,
        object_type: ObjectType,
    ) -> Result<Vec<FieldChange>, LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, object_type, object_id, column_name, column_type, column_value, modified_at, integration
             FROM field_change
             WHERE integration = ? AND object_type = ?
             ORDER BY modified_at, object_id, column_name",
        )?;
        let rows = stmt.query_map(params![integration, object_type], Self::row_to_field_change)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn changes_for_object(
        &self,
        object_id: i64,
        object_type: ObjectType,
    ) -> Result<Vec<FieldChange>, LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, object_type, object_id, column_name, column_type, column_value, modified_at, integration
             FROM field_change
             WHERE object_id = ? AND object_type = ?
             ORDER BY modified_at, column_name, integration",
        )?;
        let rows = stmt.query_map(params![object_id, object_type], Self::row_to_field_change)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl MappingStore for SqliteLedger {
    fn save_mapping(&self, mut mapping: ObjectMapping) -> Result<ObjectMapping, LedgerError> {
        if mapping.id.is_empty() {
            mapping.id = Uuid::now_v7().to_string();
        }
        let conn = self.conn.lock().map_err(|_| LedgerError::LockPoisoned)?;
        log::debug!(
            "SQL EXECUTE: INSERT OR REPLACE INTO object_mapping ({}/{} via {})",
            mapping.object_type,
            mapping.object_id,
            mapping.integration
        );
        conn.execute(
            "INSERT OR REPLACE INTO object_mapping (id, integration, object_type, object_id, external_object_name, external_object_id, last_sync_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                mapping.id,
                mapping.integration,
                mapping.object_type,
                mapping.object_id,
                mapping.external_object_name,
                mapping.external_object_id,
                mapping.last_sync_at,
            ],
        )?;
        Ok(mapping)
    }

    fn mappings_for_object(
        &self,
        object_id: i64,
        object_type: ObjectType,
    ) -> Result<Vec<ObjectMapping>, LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT * FROM object_mapping WHERE object_id = ? AND object_type = ? ORDER BY integration",
        )?;
        let mappings = serde_rusqlite::from_rows::<ObjectMapping>(
            stmt.query(params![object_id, object_type])?,
        )
        .collect::<Result<Vec<_>, _>>()?;
        Ok(mappings)
    }

    fn delete_for_object(
        &self,
        object_id: i64,
        object_type: ObjectType,
    ) -> Result<(), LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::LockPoisoned)?;
        log::debug!("SQL EXECUTE: DELETE FROM object_mapping WHERE object_id = ? AND object_type = ?");
        let affected = conn.execute(
            "DELETE FROM object_mapping WHERE object_id = ? AND object_type = ?",
            params![object_id, object_type],
        )?;
        log::debug!("SQL EXECUTE RESULT: {} rows affected", affected);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{FieldValue, encode_variable};

    fn change(
        object_id: i64,
        column: &str,
        value: &str,
        integration: &str,
    ) -> anyhow::Result<FieldChange> {
        let encoded = encode_variable(&FieldValue::Text(value.to_string()))?;
        Ok(FieldChange {
            id: String::new(),
            object_type: ObjectType::Contact,
            object_id,
            column_name: column.to_string(),
            column_type: encoded.value_type,
            column_value: encoded.data,
            modified_at: 1_700_000_000_000,
            integration: integration.to_string(),
        })
    }

    #[test]
    fn save_and_read_back() -> anyhow::Result<()> {
        let store = SqliteLedger::open_memory()?;
        store.save_batch(vec![
            change(5, "email", "a@x.com", "hubspot")?,
            change(5, "firstname", "Ada", "hubspot")?,
        ])?;

        let rows = store.pending_changes("hubspot", ObjectType::Contact)?;
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| !r.id.is_empty()));
        assert_eq!(rows[0].column_name, "email");
        assert_eq!(rows[0].column_type, VariableType::Text);
        Ok(())
    }

    #[test]
    fn delete_scopes_to_named_columns() -> anyhow::Result<()> {
        let store = SqliteLedger::open_memory()?;
        store.save_batch(vec![
            change(5, "email", "a@x.com", "hubspot")?,
            change(5, "firstname", "Ada", "hubspot")?,
            change(6, "email", "other@x.com", "hubspot")?,
        ])?;

        store.delete_for_object_columns(5, ObjectType::Contact, &["email".to_string()])?;

        let rows = store.changes_for_object(5, ObjectType::Contact)?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].column_name, "firstname");
        // Other objects keep their rows for the same column
        assert_eq!(store.changes_for_object(6, ObjectType::Contact)?.len(), 1);
        Ok(())
    }

    #[test]
    fn delete_with_no_columns_is_a_noop() -> anyhow::Result<()> {
        let store = SqliteLedger::open_memory()?;
        store.save_batch(vec![change(5, "email", "a@x.com", "hubspot")?])?;
        store.delete_for_object_columns(5, ObjectType::Contact, &[])?;
        assert_eq!(store.changes_for_object(5, ObjectType::Contact)?.len(), 1);
        Ok(())
    }

    #[test]
    fn replace_removes_stale_rows_across_integrations() -> anyhow::Result<()> {
        let store = SqliteLedger::open_memory()?;
        store.save_batch(vec![
            change(5, "email", "a@x.com", "hubspot")?,
            change(5, "email", "a@x.com", "pipedrive")?,
        ])?;

        // Replace touches the column for all integrations, then inserts only
        // the surviving integration's row.
        store.replace_for_columns(
            5,
            ObjectType::Contact,
            &["email".to_string()],
            vec![change(5, "email", "b@x.com", "hubspot")?],
        )?;

        let rows = store.changes_for_object(5, ObjectType::Contact)?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].integration, "hubspot");
        store.clear_unit_of_work()?;
        Ok(())
    }

    #[test]
    fn mapping_round_trip_and_cascade() -> anyhow::Result<()> {
        let store = SqliteLedger::open_memory()?;
        let mapping = store.save_mapping(ObjectMapping {
            integration: "hubspot".to_string(),
            object_type: ObjectType::Contact,
            object_id: 5,
            external_object_name: "contact".to_string(),
            external_object_id: "ext-77".to_string(),
            last_sync_at: None,
            ..Default::default()
        })?;
        assert!(!mapping.id.is_empty());

        let found = store.mappings_for_object(5, ObjectType::Contact)?;
        assert_eq!(found, vec![mapping]);

        MappingStore::delete_for_object(&store, 5, ObjectType::Contact)?;
        assert!(store.mappings_for_object(5, ObjectType::Contact)?.is_empty());
        Ok(())
    }
}
