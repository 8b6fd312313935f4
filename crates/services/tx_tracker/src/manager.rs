use crate::{
    config::{
        Config,
        TransitionTable,
    },
    error::Error,
    pruner::ExpiryQueue,
    update_sender::{
        Listener,
        Listeners,
        TxStatusChange,
    },
};
use meeray_services::panic_to_string;
use meeray_types::services::{
    events::IncomingEvent,
    transaction_status::{
        TrackingId,
        TransactionStatus,
        TxStage,
    },
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{
        Duration,
        SystemTime,
        UNIX_EPOCH,
    },
};
use tokio::{
    sync::broadcast,
    time::Instant,
};

struct Entry {
    status: TransactionStatus,
    registered_at: Instant,
    /// Set once the status becomes final.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant, pending_ttl: Option<Duration>) -> bool {
        match self.expires_at {
            Some(at) => at <= now,
            None => pending_ttl.is_some_and(|ttl| self.registered_at + ttl <= now),
        }
    }
}

#[derive(Default)]
struct Inner {
    statuses: HashMap<TrackingId, Entry>,
    listeners: Listeners,
    pruner: ExpiryQueue,
}

/// The registry of tracked transactions and their listeners.
///
/// Cloning is shallow, all clones share the same registry.
#[derive(Clone)]
pub struct TxStatusManager {
    inner: Arc<Mutex<Inner>>,
    transitions: Arc<TransitionTable>,
    terminal_retention: Duration,
    pending_ttl: Option<Duration>,
    tx_status_change: TxStatusChange,
}

impl TxStatusManager {
    pub fn new(config: &Config) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            transitions: Arc::new(config.transitions.clone()),
            terminal_retention: config.terminal_retention,
            pending_ttl: config.pending_ttl,
            tx_status_change: TxStatusChange::new(config.update_channel_capacity),
        }
    }

    /// Starts tracking a new transaction in the `Pending` stage.
    pub fn register(
        &self,
        id: impl Into<TrackingId>,
        tx_type: impl Into<String>,
    ) -> Result<TransactionStatus, Error> {
        let id = id.into();
        let now = Instant::now();
        let status = TransactionStatus::pending(id.clone(), tx_type, unix_millis());

        {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            if let Some(entry) = inner.statuses.get(&id) {
                if !entry.is_expired(now, self.pending_ttl) {
                    return Err(Error::AlreadyTracked(id))
                }
                inner.listeners.remove(&id);
            }
            inner.statuses.insert(
                id.clone(),
                Entry {
                    status: status.clone(),
                    registered_at: now,
                    expires_at: None,
                },
            );
            if let Some(ttl) = self.pending_ttl {
                inner.pruner.schedule(now + ttl, id.clone());
            }
        }

        tracing::debug!(tracking_id = %id, tx_type = %status.tx_type, "registered transaction");
        self.tx_status_change.send(status.clone());
        Ok(status)
    }

    pub fn get(&self, id: &TrackingId) -> Option<TransactionStatus> {
        let now = Instant::now();
        self.inner
            .lock()
            .statuses
            .get(id)
            .filter(|entry| !entry.is_expired(now, self.pending_ttl))
            .map(|entry| entry.status.clone())
    }

    /// A snapshot of all tracked transactions, in no particular order.
    pub fn list_all(&self) -> Vec<TransactionStatus> {
        self.collect(|_| true)
    }

    pub fn list_by_type(&self, tx_type: &str) -> Vec<TransactionStatus> {
        self.collect(|status| status.tx_type == tx_type)
    }

    fn collect<F>(&self, filter: F) -> Vec<TransactionStatus>
    where
        F: Fn(&TransactionStatus) -> bool,
    {
        let now = Instant::now();
        self.inner
            .lock()
            .statuses
            .values()
            .filter(|entry| !entry.is_expired(now, self.pending_ttl))
            .map(|entry| &entry.status)
            .filter(|status| filter(status))
            .cloned()
            .collect()
    }

    /// Sets the listener of the transaction, replacing the previous one.
    pub fn on_update<F>(&self, id: impl Into<TrackingId>, listener: F)
    where
        F: Fn(&TransactionStatus) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        self.inner.lock().listeners.set(id.into(), listener);
    }

    /// Returns `true` if the transaction had a listener.
    pub fn remove_listener(&self, id: &TrackingId) -> bool {
        self.inner.lock().listeners.remove(id).is_some()
    }

    /// Records the id assigned by the underlying ledger and moves a `Pending` transaction
    /// to `ConfirmedUpstream`.
    pub fn confirm_upstream(
        &self,
        id: &TrackingId,
        external_tx_id: impl Into<String>,
    ) -> Result<TransactionStatus, Error> {
        let now = Instant::now();
        let (status, listener) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let entry = inner
                .statuses
                .get_mut(id)
                .filter(|entry| !entry.is_expired(now, self.pending_ttl))
                .ok_or_else(|| Error::NotTracked(id.clone()))?;

            if entry.status.is_final() {
                return Err(Error::AlreadyFinal(id.clone(), entry.status.status))
            }
            entry.status.external_tx_id = Some(external_tx_id.into());
            if entry.status.status.can_advance_to(TxStage::ConfirmedUpstream) {
                entry.status.status = TxStage::ConfirmedUpstream;
            }
            (entry.status.clone(), inner.listeners.get(id))
        };

        tracing::debug!(tracking_id = %id, external_tx_id = ?status.external_tx_id, "confirmed upstream");
        self.notify(listener, status.clone());
        Ok(status)
    }

    /// Applies the event to the transaction it refers to.
    ///
    /// Returns the updated status, or `None` if the event was discarded.
    pub fn apply_event(&self, event: &IncomingEvent) -> Option<TransactionStatus> {
        let Some(id) = event.tracking_id() else {
            tracing::trace!(kind = %event.kind, "event without tracking id");
            return None
        };
        let now = Instant::now();

        let (status, listener) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let Some(entry) = inner
                .statuses
                .get_mut(&id)
                .filter(|entry| !entry.is_expired(now, self.pending_ttl))
            else {
                tracing::trace!(tracking_id = %id, kind = %event.kind, "event for untracked transaction");
                return None
            };

            let current = entry.status.status;
            if current.is_final() {
                tracing::debug!(tracking_id = %id, kind = %event.kind, stage = %current, "event for final transaction is ignored");
                return None
            }

            let next = self
                .transitions
                .stage_for(&event.kind)
                .filter(|next| current.can_advance_to(*next))
                .unwrap_or(current);

            entry.status.status = next;
            if let Some(event_id) = &event.id {
                entry.status.confirmation_tx_id = Some(event_id.clone());
            }
            entry.status.result = Some(event.data.clone());
            entry.status.error = event.error();

            if next.is_final() {
                let expires_at = now + self.terminal_retention;
                entry.expires_at = Some(expires_at);
                inner.pruner.schedule(expires_at, id.clone());
            }

            (entry.status.clone(), inner.listeners.get(&id))
        };

        tracing::debug!(tracking_id = %id, kind = %event.kind, stage = %status.status, "transaction status updated");
        self.notify(listener, status.clone());
        Some(status)
    }

    /// Removes the transactions whose time ran out together with their listeners.
    pub fn prune_expired(&self) -> Vec<TrackingId> {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let mut removed = vec![];
        for id in inner.pruner.take_due(now) {
            let expired = inner
                .statuses
                .get(&id)
                .is_some_and(|entry| entry.is_expired(now, self.pending_ttl));
            if expired {
                inner.statuses.remove(&id);
                inner.listeners.remove(&id);
                removed.push(id);
            }
        }

        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "pruned expired transactions");
        }
        removed
    }

    /// Subscribes to every status change of every transaction.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<TransactionStatus> {
        self.tx_status_change.subscribe()
    }

    /// The number of tracked transactions, including expired ones not pruned yet.
    pub fn len(&self) -> usize {
        self.inner.lock().statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self, listener: Option<Listener>, status: TransactionStatus) {
        if let Some(listener) = listener {
            let called = std::panic::catch_unwind(AssertUnwindSafe(|| listener(&status)));
            if let Err(panic) = called {
                tracing::error!(
                    tracking_id = %status.id,
                    panic = %panic_to_string(panic),
                    "The status listener panicked"
                );
            }
        }
        self.tx_status_change.send(status);
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
