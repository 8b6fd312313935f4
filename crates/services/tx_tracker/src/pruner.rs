use meeray_types::services::transaction_status::TrackingId;
use std::collections::BTreeMap;
use tokio::time::Instant;

/// The transactions to remove, ordered by the time they expire.
#[derive(Default)]
pub(crate) struct ExpiryQueue {
    expirations: BTreeMap<Instant, Vec<TrackingId>>,
}

impl ExpiryQueue {
    pub fn schedule(&mut self, at: Instant, id: TrackingId) {
        self.expirations.entry(at).or_default().push(id);
    }

    /// Removes and returns all ids scheduled at or before `now`.
    pub fn take_due(&mut self, now: Instant) -> Vec<TrackingId> {
        let mut due = vec![];
        while let Some(entry) = self.expirations.first_entry() {
            if *entry.key() > now {
                break
            }
            due.extend(entry.remove());
        }
        due
    }
}
