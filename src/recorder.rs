use std::sync::Arc;

use crate::error::LedgerError;
use crate::hooks::{FieldChangeHook, FieldChangeRejected};
use crate::ledger::{FieldChange, LedgerStore};
use crate::notifier::{LedgerEvent, LedgerNotifier};
use crate::object::{ChangeSet, SyncObject};
use crate::registry::SyncEnablement;
use crate::value::encode_variable;

pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Records field deltas into the ledger, one row per (column, integration),
/// replacing any prior current rows for the touched columns.
pub struct ChangeRecorder {
    registry: Arc<dyn SyncEnablement>,
    store: Arc<dyn LedgerStore>,
    hooks: Vec<Box<dyn FieldChangeHook>>,
    notifier: LedgerNotifier,
}

impl ChangeRecorder {
    pub fn new(registry: Arc<dyn SyncEnablement>, store: Arc<dyn LedgerStore>) -> Self {
        Self {
            registry,
            store,
            hooks: Vec::new(),
            notifier: LedgerNotifier::new(),
        }
    }

    /// Adds a pre-change hook. Hooks run in the order they were added.
    pub fn with_hook(mut self, hook: Box<dyn FieldChangeHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Uses an existing notifier instead of a fresh one, so several
    /// components can share one observer list.
    pub fn with_notifier(mut self, notifier: LedgerNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn notifier(&self) -> &LedgerNotifier {
        &self.notifier
    }

    /// Persists one ledger row per (changed column, enabled integration) for
    /// the object, after consulting the hooks per integration. A hook
    /// rejection skips that integration only. Enablement is queried fresh on
    /// every call; an enabled-but-unregistered integration aborts the whole
    /// call with [`LedgerError::IntegrationNotFound`].
    ///
    /// Prior current rows for the touched columns are deleted across all
    /// integrations before the new rows are inserted.
    pub fn record_changes(
        &self,
        changes: &ChangeSet,
        object_id: i64,
        object: &SyncObject,
    ) -> Result<(), LedgerError> {
        if changes.is_empty() {
            return Ok(());
        }

        let object_type = object.object_type();
        let integrations = self.registry.integrations_syncing(object_type)?;
        if integrations.is_empty() {
            return Ok(());
        }

        let modified_at = now_millis();
        let mut to_persist = Vec::new();
        let mut recorded_for = Vec::new();

        for integration in integrations {
            if let Err(rejected) = self.consult_hooks(&integration, object) {
                // Do not record changes for an object and integration pair a
                // hook has rejected; the remaining integrations still record.
                log::debug!(
                    "skipping field changes for {} on {}/{}: {}",
                    integration,
                    object_type,
                    object_id,
                    rejected.reason
                );
                continue;
            }

            for (column, delta) in changes.iter() {
                let encoded = encode_variable(&delta.new)?;
                to_persist.push(FieldChange {
                    id: String::new(),
                    object_type,
                    object_id,
                    column_name: column.clone(),
                    column_type: encoded.value_type,
                    column_value: encoded.data,
                    modified_at,
                    integration: integration.clone(),
                });
            }
            recorded_for.push(integration);
        }

        if recorded_for.is_empty() {
            // Every integration was vetoed; existing rows stay untouched.
            return Ok(());
        }

        let columns = changes.column_names();
        self.store
            .replace_for_columns(object_id, object_type, &columns, to_persist)?;
        self.store.clear_unit_of_work()?;

        self.notifier.notify(LedgerEvent::ChangesRecorded {
            object_type,
            object_id,
            integrations: recorded_for,
            columns,
        });

        Ok(())
    }

    fn consult_hooks(
        &self,
        integration: &str,
        object: &SyncObject,
    ) -> Result<(), FieldChangeRejected> {
        for hook in &self.hooks {
            hook.before_field_changes(integration, object)?;
        }
        Ok(())
    }
}
