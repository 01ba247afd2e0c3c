use crate::detect::RuleId;
use crate::storage::SharedStore;
use tracing::warn;

/// Keeps a detected attack from being recorded twice for the same
/// `(event, rule)` pair.
///
/// The check is fail-open: when the store cannot answer, the pair is treated
/// as not yet recorded, so an unstable store may produce a duplicate incident
/// but never hides a real one. The read and the later insert are not atomic;
/// two monitors sharing a database can race (see `storage.unique_incidents`).
pub struct IncidentGuard {
    store: SharedStore,
}

impl IncidentGuard {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn exists(&self, event_id: i64, rule_id: RuleId) -> bool {
        match self.store.count_incidents(event_id, rule_id) {
            Ok(count) => count > 0,
            Err(e) => {
                warn!(event_id, rule_id = %rule_id, error = %e, "Duplicate check failed, assuming no incident exists");
                false
            }
        }
    }
}
