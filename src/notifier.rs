use std::{
    sync::{
        Arc, RwLock,
        mpsc::{Receiver, Sender, channel},
    },
    thread,
};

use crate::object::ObjectType;

/// Emitted after the ledger changes. Observers typically wake a sync driver.
#[derive(Clone, Debug)]
pub enum LedgerEvent {
    /// Field changes were recorded for an object.
    ChangesRecorded {
        object_type: ObjectType,
        object_id: i64,
        integrations: Vec<String>,
        columns: Vec<String>,
    },
    /// All ledger and mapping rows for an object were removed.
    ObjectPurged {
        object_type: ObjectType,
        object_id: i64,
    },
}

/// Multicasts ledger events to any number of observers. Clones share the
/// same observer list. Dropped receivers are lazily pruned on notify.
#[derive(Clone)]
pub struct LedgerNotifier {
    senders: Arc<RwLock<Vec<Sender<LedgerEvent>>>>,
}

impl LedgerNotifier {
    pub fn new() -> Self {
        Self {
            senders: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn notify(&self, event: LedgerEvent) {
        let mut senders = self.senders.write().unwrap();
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn observer(&self) -> Receiver<LedgerEvent> {
        let (tx, rx) = channel();
        self.senders.write().unwrap().push(tx);
        rx
    }

    pub fn observe(&self, mut callback: impl FnMut(LedgerEvent) + Send + 'static) {
        let rx = self.observer();
        thread::spawn(move || {
            rx.iter().for_each(|e| callback(e));
        });
    }
}

impl Default for LedgerNotifier {
    fn default() -> Self {
        Self::new()
    }
}
