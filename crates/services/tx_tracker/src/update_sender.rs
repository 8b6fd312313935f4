use meeray_types::services::transaction_status::{
    TrackingId,
    TransactionStatus,
};
use std::{
    collections::HashMap,
    sync::Arc,
};
use tokio::sync::broadcast;

/// The callback invoked with the new status of a transaction after each update.
pub type Listener = Arc<dyn Fn(&TransactionStatus) + Send + Sync>;

/// At most one listener per transaction. A new listener replaces the previous one.
#[derive(Default)]
pub(crate) struct Listeners(HashMap<TrackingId, Listener>);

impl Listeners {
    pub fn set(&mut self, id: TrackingId, listener: Listener) -> Option<Listener> {
        self.0.insert(id, listener)
    }

    pub fn get(&self, id: &TrackingId) -> Option<Listener> {
        self.0.get(id).cloned()
    }

    pub fn remove(&mut self, id: &TrackingId) -> Option<Listener> {
        self.0.remove(id)
    }
}

/// Broadcasts every status update to the subscribers of the update stream.
#[derive(Clone)]
pub(crate) struct TxStatusChange {
    sender: broadcast::Sender<TransactionStatus>,
}

impl TxStatusChange {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn send(&self, status: TransactionStatus) {
        // No subscribers is not an error.
        let _ = self.sender.send(status);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransactionStatus> {
        self.sender.subscribe()
    }
}
