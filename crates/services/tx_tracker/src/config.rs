use meeray_types::services::{
    events::EventKind,
    transaction_status::TxStage,
};
use std::{
    collections::HashMap,
    time::Duration,
};

/// Maps the type of an incoming event to the stage it moves the transaction to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionTable(HashMap<EventKind, TxStage>);

impl TransitionTable {
    /// A table without transitions. Every event is ignored.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Adds the transition and returns the table.
    pub fn with(mut self, kind: impl Into<EventKind>, stage: TxStage) -> Self {
        self.insert(kind, stage);
        self
    }

    /// Adds the transition, replacing the previous stage for the same event type.
    pub fn insert(&mut self, kind: impl Into<EventKind>, stage: TxStage) -> Option<TxStage> {
        self.0.insert(kind.into(), stage)
    }

    /// The stage the event type moves the transaction to.
    pub fn stage_for(&self, kind: &EventKind) -> Option<TxStage> {
        self.0.get(kind).copied()
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::empty()
            .with(EventKind::TransactionConfirmed, TxStage::ConfirmedUpstream)
            .with(EventKind::TransactionStarted, TxStage::ProcessingDownstream)
            .with(EventKind::TransactionCompleted, TxStage::Completed)
            .with(EventKind::TransactionFailed, TxStage::Failed)
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// The delay before the first reconnection attempt after the connection is lost.
    pub reconnect_delay: Duration,
    /// The upper bound of the reconnection delay. Every failed attempt doubles the delay
    /// until it reaches this value. Equal to `reconnect_delay` means a fixed delay.
    pub max_reconnect_delay: Duration,
    /// The number of consecutive failed attempts after which the stream stops reconnecting.
    /// `None` means the stream never gives up.
    pub max_reconnect_attempts: Option<u32>,
    /// How long a final status stays available after it was reached.
    pub terminal_retention: Duration,
    /// How long a transaction may stay in a non-final stage before it is dropped.
    /// `None` keeps non-final transactions until the service is disposed.
    pub pending_ttl: Option<Duration>,
    /// The interval of the cleanup of expired statuses.
    pub ttl_check_interval: Duration,
    /// The capacity of the channel of status updates.
    pub update_channel_capacity: usize,
    /// The capacity of the queue of outgoing control messages.
    pub control_queue_capacity: usize,
    /// The stage transitions caused by incoming events.
    pub transitions: TransitionTable,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: None,
            terminal_retention: Duration::from_secs(30),
            pending_ttl: None,
            ttl_check_interval: Duration::from_secs(1),
            update_channel_capacity: 1024,
            control_queue_capacity: 128,
            transitions: TransitionTable::default(),
        }
    }
}
