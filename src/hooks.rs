use std::fmt;

use crate::object::SyncObject;

/// Signal that a hook refused to let field changes be recorded for one
/// (integration, object) pair. Skips that integration only; never surfaces to
/// the record caller.
#[derive(Clone, Debug)]
pub struct FieldChangeRejected {
    pub reason: String,
}

impl FieldChangeRejected {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldChangeRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field changes rejected: {}", self.reason)
    }
}

/// Consulted before field changes are persisted for an integration. Hooks are
/// invoked in registration order; the first rejection wins and the remaining
/// hooks are not called for that integration.
pub trait FieldChangeHook: Send + Sync {
    fn before_field_changes(
        &self,
        integration: &str,
        object: &SyncObject,
    ) -> Result<(), FieldChangeRejected>;
}

/// Blanket impl so plain closures can act as hooks.
impl<F> FieldChangeHook for F
where
    F: Fn(&str, &SyncObject) -> Result<(), FieldChangeRejected> + Send + Sync,
{
    fn before_field_changes(
        &self,
        integration: &str,
        object: &SyncObject,
    ) -> Result<(), FieldChangeRejected> {
        self(integration, object)
    }
}
