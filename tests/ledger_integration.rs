use std::sync::Arc;

use anyhow::Result;
use sync_ledger::hooks::FieldChangeRejected;
use sync_ledger::ledger::{LedgerStore, MappingStore, ObjectMapping, SqliteLedger};
use sync_ledger::notifier::LedgerEvent;
use sync_ledger::object::{
    ChangeSet, Contact, DncChange, FieldDelta, ObjectChanges, ObjectType, SyncObject,
};
use sync_ledger::registry::{IntegrationDefinition, IntegrationRegistry};
use sync_ledger::tracker::{ContactCompanyChanged, ObjectDeleted, ObjectSaved};
use sync_ledger::value::{EncodedVariable, FieldValue, decode_variable};
use sync_ledger::{ChangeRecorder, ChangeTracker, LedgerError, RecordContext};

fn registry_syncing_both(names: &[&str]) -> Result<Arc<IntegrationRegistry>> {
    let registry = IntegrationRegistry::new();
    for name in names {
        registry.register(
            name,
            IntegrationDefinition::syncing([ObjectType::Contact, ObjectType::Company]),
        )?;
        registry.enable(name)?;
    }
    Ok(Arc::new(registry))
}

fn contact(id: i64) -> SyncObject {
    SyncObject::Contact(Contact {
        id,
        ..Default::default()
    })
}

fn decoded(value_type: sync_ledger::value::VariableType, data: &[u8]) -> Result<FieldValue> {
    Ok(decode_variable(&EncodedVariable {
        value_type,
        data: data.to_vec(),
    })?)
}

#[test]
fn n_columns_times_m_integrations_rows() -> Result<()> {
    let _ = env_logger::Builder::from_default_env().is_test(true).try_init();

    let store = Arc::new(SqliteLedger::open_memory()?);
    let recorder = ChangeRecorder::new(
        registry_syncing_both(&["hubspot", "pipedrive", "dynamics"])?,
        store.clone(),
    );

    let mut changes = ChangeSet::new();
    changes.set("email", FieldDelta::new("a@x.com", "b@x.com"));
    changes.set("firstname", FieldDelta::new("Ada", "Grace"));
    recorder.record_changes(&changes, 5, &contact(5))?;

    // 2 columns x 3 integrations
    let rows = store.changes_for_object(5, ObjectType::Contact)?;
    assert_eq!(rows.len(), 6);
    for name in ["hubspot", "pipedrive", "dynamics"] {
        assert_eq!(store.pending_changes(name, ObjectType::Contact)?.len(), 2);
    }
    Ok(())
}

#[test]
fn recording_twice_is_idempotent() -> Result<()> {
    let store = Arc::new(SqliteLedger::open_memory()?);
    let recorder = ChangeRecorder::new(registry_syncing_both(&["hubspot"])?, store.clone());

    let mut changes = ChangeSet::new();
    changes.set("email", FieldDelta::new("a@x.com", "b@x.com"));
    recorder.record_changes(&changes, 5, &contact(5))?;
    recorder.record_changes(&changes, 5, &contact(5))?;

    let rows = store.changes_for_object(5, ObjectType::Contact)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(
        decoded(rows[0].column_type, &rows[0].column_value)?,
        FieldValue::Text("b@x.com".to_string())
    );
    Ok(())
}

#[test]
fn email_change_replaces_prior_row() -> Result<()> {
    let store = Arc::new(SqliteLedger::open_memory()?);
    let recorder = ChangeRecorder::new(registry_syncing_both(&["hubspot"])?, store.clone());

    let mut first = ChangeSet::new();
    first.set("email", FieldDelta::new("", "a@x.com"));
    recorder.record_changes(&first, 5, &contact(5))?;

    let mut second = ChangeSet::new();
    second.set("email", FieldDelta::new("a@x.com", "b@x.com"));
    recorder.record_changes(&second, 5, &contact(5))?;

    let rows = store.changes_for_object(5, ObjectType::Contact)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].object_type, ObjectType::Contact);
    assert_eq!(rows[0].object_id, 5);
    assert_eq!(rows[0].column_name, "email");
    assert_eq!(rows[0].integration, "hubspot");
    assert_eq!(
        decoded(rows[0].column_type, &rows[0].column_value)?,
        FieldValue::Text("b@x.com".to_string())
    );
    Ok(())
}

#[test]
fn rejected_integration_writes_nothing_others_unaffected() -> Result<()> {
    let store = Arc::new(SqliteLedger::open_memory()?);
    let recorder = ChangeRecorder::new(registry_syncing_both(&["hubspot", "pipedrive"])?, store.clone())
        .with_hook(Box::new(|integration: &str, _object: &SyncObject| {
            if integration == "hubspot" {
                Err(FieldChangeRejected::new("invalid value for target"))
            } else {
                Ok(())
            }
        }));

    let mut changes = ChangeSet::new();
    changes.set("email", FieldDelta::new("a@x.com", "b@x.com"));
    changes.set("firstname", FieldDelta::new("Ada", "Grace"));
    recorder.record_changes(&changes, 5, &contact(5))?;

    assert!(store.pending_changes("hubspot", ObjectType::Contact)?.is_empty());
    assert_eq!(store.pending_changes("pipedrive", ObjectType::Contact)?.len(), 2);
    Ok(())
}

#[test]
fn delete_cascades_even_after_enablement_turned_off() -> Result<()> {
    let registry = registry_syncing_both(&["hubspot"])?;
    let store = Arc::new(SqliteLedger::open_memory()?);
    let tracker = ChangeTracker::new(registry.clone(), store.clone(), store.clone());

    let mut changes = ObjectChanges::default();
    changes.fields.set("email", FieldDelta::new("", "a@x.com"));
    tracker.on_object_saved(
        &ObjectSaved {
            object: contact(5),
            changes,
        },
        &RecordContext::new(),
    )?;
    store.save_mapping(ObjectMapping {
        integration: "hubspot".to_string(),
        object_type: ObjectType::Contact,
        object_id: 5,
        external_object_name: "contact".to_string(),
        external_object_id: "ext-1".to_string(),
        last_sync_at: None,
        ..Default::default()
    })?;

    // Enablement toggled off after the rows were written.
    registry.disable("hubspot")?;

    tracker.on_object_deleted(&ObjectDeleted {
        object_type: ObjectType::Contact,
        object_id: 5,
    })?;

    assert!(store.changes_for_object(5, ObjectType::Contact)?.is_empty());
    assert!(store.mappings_for_object(5, ObjectType::Contact)?.is_empty());
    Ok(())
}

#[test]
fn dnc_email_channel_expands_to_synthetic_field() -> Result<()> {
    let store = Arc::new(SqliteLedger::open_memory()?);
    let tracker = ChangeTracker::new(registry_syncing_both(&["hubspot"])?, store.clone(), store.clone());

    let mut changes = ObjectChanges::default();
    changes.dnc_channel_status.insert(
        "email".to_string(),
        DncChange {
            old_reason: None,
            reason: "bounced".to_string(),
        },
    );
    tracker.on_object_saved(
        &ObjectSaved {
            object: contact(5),
            changes,
        },
        &RecordContext::new(),
    )?;

    let rows = store.changes_for_object(5, ObjectType::Contact)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].column_name, "mautic_internal_dnc_email");
    assert_eq!(
        decoded(rows[0].column_type, &rows[0].column_value)?,
        FieldValue::Text("bounced".to_string())
    );
    Ok(())
}

#[test]
fn company_change_discards_prior_company() -> Result<()> {
    // Documented information loss: the old value is always empty, even when
    // the contact had a known company before.
    let store = Arc::new(SqliteLedger::open_memory()?);
    let tracker = ChangeTracker::new(registry_syncing_both(&["hubspot"])?, store.clone(), store.clone());

    tracker.on_company_change(&ContactCompanyChanged {
        contact: Contact {
            id: 5,
            anonymous: false,
            company: Some("Acme".to_string()),
        },
    })?;
    tracker.on_company_change(&ContactCompanyChanged {
        contact: Contact {
            id: 5,
            anonymous: false,
            company: Some("Globex".to_string()),
        },
    })?;

    let rows = store.changes_for_object(5, ObjectType::Contact)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(
        decoded(rows[0].column_type, &rows[0].column_value)?,
        FieldValue::Text("Globex".to_string())
    );
    Ok(())
}

#[test]
fn batch_reports_each_item() -> Result<()> {
    let registry = IntegrationRegistry::new();
    registry.register(
        "hubspot",
        IntegrationDefinition::syncing([ObjectType::Contact]),
    )?;
    registry.enable("hubspot")?;
    registry.enable("missing-plugin")?;

    let store = Arc::new(SqliteLedger::open_memory()?);
    let tracker = ChangeTracker::new(Arc::new(registry), store.clone(), store.clone());

    let mut changes = ObjectChanges::default();
    changes.fields.set("email", FieldDelta::new("", "a@x.com"));

    let events: Vec<ObjectSaved> = (1..=3)
        .map(|id| ObjectSaved {
            object: contact(id),
            changes: changes.clone(),
        })
        .collect();

    let report = tracker.process_saved_batch(&events, &RecordContext::new());
    // Every item hits the unregistered enabled integration; each error is
    // captured individually and the loop never aborts.
    assert!(report.succeeded.is_empty());
    assert_eq!(report.errors.len(), 3);
    for key in 0..3 {
        assert!(matches!(
            report.errors.get(&key),
            Some(LedgerError::IntegrationNotFound { .. })
        ));
    }
    Ok(())
}

#[test]
fn recorded_events_reach_observers() -> Result<()> {
    let store = Arc::new(SqliteLedger::open_memory()?);
    let tracker = ChangeTracker::new(registry_syncing_both(&["hubspot"])?, store.clone(), store.clone());
    let rx = tracker.notifier().observer();

    let mut changes = ObjectChanges::default();
    changes.fields.set("email", FieldDelta::new("", "a@x.com"));
    tracker.on_object_saved(
        &ObjectSaved {
            object: contact(5),
            changes,
        },
        &RecordContext::new(),
    )?;

    match rx.recv_timeout(std::time::Duration::from_millis(100))? {
        LedgerEvent::ChangesRecorded {
            object_type,
            object_id,
            integrations,
            columns,
        } => {
            assert_eq!(object_type, ObjectType::Contact);
            assert_eq!(object_id, 5);
            assert_eq!(integrations, vec!["hubspot".to_string()]);
            assert_eq!(columns, vec!["email".to_string()]);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    Ok(())
}

#[test]
fn file_backed_ledger_survives_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ledger.sqlite");

    {
        let store = Arc::new(SqliteLedger::open(&path)?);
        let recorder = ChangeRecorder::new(registry_syncing_both(&["hubspot"])?, store.clone());
        let mut changes = ChangeSet::new();
        changes.set("email", FieldDelta::new("", "a@x.com"));
        recorder.record_changes(&changes, 5, &contact(5))?;
    }

    let reopened = SqliteLedger::open(&path)?;
    let rows = reopened.pending_changes("hubspot", ObjectType::Contact)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].column_name, "email");
    Ok(())
}
