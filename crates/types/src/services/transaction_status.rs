//! The status of a submitted transaction during its lifecycle.

use crate::Payload;
use serde::{
    Deserialize,
    Serialize,
};

/// The client-generated key that links a submitted transaction to later events.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct TrackingId(String);

impl TrackingId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TrackingId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl AsRef<str> for TrackingId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The stage of the transaction.
///
/// The order of the variants is the order in which a transaction moves through the stages.
/// `Completed` and `Failed` are final, and `Failed` is reachable from every non-final stage.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStage {
    /// The transaction was registered for tracking.
    #[display(fmt = "PENDING")]
    Pending,
    /// The underlying ledger accepted the transaction.
    #[display(fmt = "CONFIRMED_UPSTREAM")]
    ConfirmedUpstream,
    /// The downstream processor started to process the transaction.
    #[display(fmt = "PROCESSING_DOWNSTREAM")]
    ProcessingDownstream,
    /// The downstream processor finished the transaction.
    #[display(fmt = "COMPLETED")]
    Completed,
    /// The transaction failed.
    #[display(fmt = "FAILED")]
    Failed,
}

impl TxStage {
    /// Returns `true` if no further transitions happen after this stage.
    pub fn is_final(&self) -> bool {
        match self {
            TxStage::Completed | TxStage::Failed => true,
            TxStage::Pending
            | TxStage::ConfirmedUpstream
            | TxStage::ProcessingDownstream => false,
        }
    }

    /// Returns `true` if the transaction may move from `self` to `next`.
    pub fn can_advance_to(&self, next: TxStage) -> bool {
        !self.is_final() && next > *self
    }
}

/// The tracked status of a single transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatus {
    /// The tracking id of the transaction.
    pub id: TrackingId,
    /// The id assigned by the underlying ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_tx_id: Option<String>,
    /// The id of the last event of the downstream processor about the transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_tx_id: Option<String>,
    /// The current stage.
    pub status: TxStage,
    /// The failure details reported by the downstream processor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The payload of the last correlated event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Payload>,
    /// Creation time in unix milliseconds.
    pub timestamp: u64,
    /// The kind of the operation, e.g. `SWAP` or `STAKE`.
    #[serde(rename = "type")]
    pub tx_type: String,
}

impl TransactionStatus {
    /// Creates a new status in the `Pending` stage.
    pub fn pending(id: TrackingId, tx_type: impl Into<String>, timestamp: u64) -> Self {
        Self {
            id,
            external_tx_id: None,
            confirmation_tx_id: None,
            status: TxStage::Pending,
            error: None,
            result: None,
            timestamp,
            tx_type: tx_type.into(),
        }
    }

    /// Returns `true` if the status is final.
    pub fn is_final(&self) -> bool {
        self.status.is_final()
    }
}
