use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::LedgerError;
use crate::hooks::FieldChangeHook;
use crate::ledger::{LedgerStore, MappingStore};
use crate::notifier::{LedgerEvent, LedgerNotifier};
use crate::object::{
    COMPANY_FIELD, ChangeSet, Contact, DNC_FIELD_PREFIX, DncChange, FieldDelta, OWNER_FIELD,
    ObjectChanges, ObjectType, POINTS_FIELD, SyncObject,
};
use crate::recorder::ChangeRecorder;
use crate::registry::SyncEnablement;

/// Explicit per-call context. A sync driver writing values it just pulled
/// from an integration passes `suppress_change_tracking` so its own writes do
/// not re-enter the ledger.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecordContext {
    pub suppress_change_tracking: bool,
}

impl RecordContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suppressed() -> Self {
        Self {
            suppress_change_tracking: true,
        }
    }
}

/// An object was saved; `changes` is the object layer's dirty-tracking
/// output for that save.
#[derive(Clone, Debug)]
pub struct ObjectSaved {
    pub object: SyncObject,
    pub changes: ObjectChanges,
}

#[derive(Clone, Copy, Debug)]
pub struct ObjectDeleted {
    pub object_type: ObjectType,
    pub object_id: i64,
}

/// A contact's company membership changed; `contact.company` holds the new
/// company name.
#[derive(Clone, Debug)]
pub struct ContactCompanyChanged {
    pub contact: Contact,
}

/// Outcome of a batch of save events: per-item success or typed error, keyed
/// by the item's position in the batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<usize>,
    pub errors: BTreeMap<usize, LedgerError>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Orchestrates the recorder over object lifecycle events: guards, field
/// remapping, the delete cascade, and batch processing.
pub struct ChangeTracker {
    recorder: ChangeRecorder,
    ledger: Arc<dyn LedgerStore>,
    mappings: Arc<dyn MappingStore>,
    registry: Arc<dyn SyncEnablement>,
    notifier: LedgerNotifier,
}

impl ChangeTracker {
    pub fn new(
        registry: Arc<dyn SyncEnablement>,
        ledger: Arc<dyn LedgerStore>,
        mappings: Arc<dyn MappingStore>,
    ) -> Self {
        let notifier = LedgerNotifier::new();
        let recorder = ChangeRecorder::new(registry.clone(), ledger.clone())
            .with_notifier(notifier.clone());
        Self {
            recorder,
            ledger,
            mappings,
            registry,
            notifier,
        }
    }

    /// Adds a pre-change hook to the underlying recorder.
    pub fn with_hook(mut self, hook: Box<dyn FieldChangeHook>) -> Self {
        self.recorder = self.recorder.with_hook(hook);
        self
    }

    pub fn notifier(&self) -> &LedgerNotifier {
        &self.notifier
    }

    pub fn recorder(&self) -> &ChangeRecorder {
        &self.recorder
    }

    /// Handles a save event. Skips anonymous visitor placeholders, suppressed
    /// contexts, and object types no enabled integration syncs. Otherwise
    /// remaps the dirty-tracking output into field changes and records them;
    /// do-not-contact status changes are expanded per channel and recorded as
    /// a second pass.
    pub fn on_object_saved(
        &self,
        event: &ObjectSaved,
        ctx: &RecordContext,
    ) -> Result<(), LedgerError> {
        if let SyncObject::Contact(contact) = &event.object {
            if contact.anonymous {
                // Do not track visitor changes
                return Ok(());
            }
        }

        if ctx.suppress_change_tracking {
            // Don't track changes just made by an active sync
            return Ok(());
        }

        let object_type = event.object.object_type();
        if !self.registry.has_object_sync_enabled(object_type)? {
            // Only track if an integration is syncing this object type
            return Ok(());
        }

        let fields = extract_field_changes(&event.object, &event.changes);
        if !fields.is_empty() {
            self.recorder
                .record_changes(&fields, event.object.id(), &event.object)?;
        }

        if matches!(event.object, SyncObject::Contact(_))
            && !event.changes.dnc_channel_status.is_empty()
        {
            let dnc = expand_dnc_changes(&event.changes.dnc_channel_status);
            self.recorder
                .record_changes(&dnc, event.object.id(), &event.object)?;
        }

        Ok(())
    }

    /// Handles a delete event: removes every ledger and mapping row for the
    /// object. Runs unconditionally — rows may predate an enablement change,
    /// so there is no enablement guard here.
    pub fn on_object_deleted(&self, event: &ObjectDeleted) -> Result<(), LedgerError> {
        self.ledger
            .delete_for_object(event.object_id, event.object_type)?;
        self.mappings
            .delete_for_object(event.object_id, event.object_type)?;

        self.notifier.notify(LedgerEvent::ObjectPurged {
            object_type: event.object_type,
            object_id: event.object_id,
        });
        Ok(())
    }

    /// Handles a company membership change on a contact.
    ///
    /// This mechanism is not able to record multiple company changes: the old
    /// value is always recorded as the empty string.
    pub fn on_company_change(&self, event: &ContactCompanyChanged) -> Result<(), LedgerError> {
        let mut changes = ChangeSet::new();
        changes.set(
            COMPANY_FIELD,
            FieldDelta::new("", event.contact.company.clone().unwrap_or_default()),
        );

        let object = SyncObject::Contact(event.contact.clone());
        self.recorder
            .record_changes(&changes, event.contact.id, &object)
    }

    /// Processes a batch of save events, capturing each item's error instead
    /// of aborting the batch.
    pub fn process_saved_batch(&self, events: &[ObjectSaved], ctx: &RecordContext) -> BatchReport {
        let mut report = BatchReport::default();
        for (key, event) in events.iter().enumerate() {
            match self.on_object_saved(event, ctx) {
                Ok(()) => report.succeeded.push(key),
                Err(err) => {
                    log::warn!(
                        "batch item {} ({}/{}) failed: {}",
                        key,
                        event.object.object_type(),
                        event.object.id(),
                        err
                    );
                    report.errors.insert(key, err);
                }
            }
        }
        report
    }
}

fn extract_field_changes(object: &SyncObject, changes: &ObjectChanges) -> ChangeSet {
    match object {
        SyncObject::Contact(_) => contact_field_changes(changes),
        SyncObject::Company(_) => company_field_changes(changes),
    }
}

fn contact_field_changes(changes: &ObjectChanges) -> ChangeSet {
    let mut fields = changes.fields.clone();
    if let Some(owner) = &changes.owner {
        // Force record of owner change if present in the change list
        fields.set(OWNER_FIELD, owner.clone());
    }
    if let Some(points) = &changes.points {
        // Lets the target keep a points custom field up to date
        fields.set(POINTS_FIELD, points.clone());
    }
    fields
}

fn company_field_changes(changes: &ObjectChanges) -> ChangeSet {
    let mut fields = changes.fields.clone();
    if let Some(owner) = &changes.owner {
        fields.set(OWNER_FIELD, owner.clone());
    }
    // points and do-not-contact are contact concerns
    fields
}

fn expand_dnc_changes(dnc: &BTreeMap<String, DncChange>) -> ChangeSet {
    let mut fields = ChangeSet::new();
    for (channel, change) in dnc {
        let old = change.old_reason.clone().unwrap_or_default();
        fields.set(
            format!("{}{}", DNC_FIELD_PREFIX, channel),
            FieldDelta::new(old, change.reason.clone()),
        );
    }
    fields
}
