use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::FieldValue;

/// Field name used when a contact's company membership change is recorded.
pub const COMPANY_FIELD: &str = "company";

/// Field name an owner change is remapped to before recording.
pub const OWNER_FIELD: &str = "owner_id";

/// Field name a points change is remapped to before recording (contacts only).
pub const POINTS_FIELD: &str = "points";

/// Prefix for the synthetic per-channel do-not-contact fields. The full field
/// name is this prefix plus the channel name, e.g. `mautic_internal_dnc_email`.
/// The prefix is a wire contract with downstream integrations.
pub const DNC_FIELD_PREFIX: &str = "mautic_internal_dnc_";

/// The object kinds the ledger tracks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    #[default]
    Contact,
    Company,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Contact => "contact",
            ObjectType::Company => "company",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "contact" => Some(ObjectType::Contact),
            "company" => Some(ObjectType::Company),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contact as the tracker sees it. Anonymous contacts are visitor
/// placeholders whose changes are never tracked.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub anonymous: bool,
    pub company: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
}

/// Tagged union over the trackable object kinds. Variant selection drives
/// which field-extraction path the tracker takes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncObject {
    Contact(Contact),
    Company(Company),
}

impl SyncObject {
    pub fn object_type(&self) -> ObjectType {
        match self {
            SyncObject::Contact(_) => ObjectType::Contact,
            SyncObject::Company(_) => ObjectType::Company,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            SyncObject::Contact(c) => c.id,
            SyncObject::Company(c) => c.id,
        }
    }
}

/// An (old, new) value pair for one field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDelta {
    pub old: FieldValue,
    pub new: FieldValue,
}

impl FieldDelta {
    pub fn new(old: impl Into<FieldValue>, new: impl Into<FieldValue>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
        }
    }
}

/// Mapping from field name to (old, new) delta. Keys are unique; iteration
/// order is the field name order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    fields: BTreeMap<String, FieldDelta>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the delta for a field, replacing any previous delta for it.
    pub fn set(&mut self, field: impl Into<String>, delta: FieldDelta) -> &mut Self {
        self.fields.insert(field.into(), delta);
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldDelta> {
        self.fields.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldDelta)> {
        self.fields.iter()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }
}

/// A do-not-contact status change for one channel, as reported by the
/// object's dirty tracking. `old_reason` is absent when the channel had no
/// prior status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DncChange {
    pub old_reason: Option<String>,
    pub reason: String,
}

/// The dirty-tracking output carried on a save event. Produced by the object
/// layer outside this crate; the tracker only remaps and records it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ObjectChanges {
    /// Plain per-field deltas.
    pub fields: ChangeSet,
    /// Owner reassignment, recorded as the `owner_id` field when present.
    pub owner: Option<FieldDelta>,
    /// Points adjustment, recorded as the `points` field (contacts only).
    pub points: Option<FieldDelta>,
    /// Per-channel do-not-contact status changes, keyed by channel name.
    pub dnc_channel_status: BTreeMap<String, DncChange>,
}

impl ObjectChanges {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
            && self.owner.is_none()
            && self.points.is_none()
            && self.dnc_channel_status.is_empty()
    }
}
