//! Messages exchanged with the event stream of the backend.

use crate::{
    services::transaction_status::TrackingId,
    Payload,
};
use serde::{
    Deserialize,
    Serialize,
};

/// The payload field that carries the tracking id.
pub const TRACKING_ID_FIELD: &str = "_trackingId";
/// The payload field checked when [`TRACKING_ID_FIELD`] is absent.
pub const TRANSACTION_ID_FIELD: &str = "transactionId";
/// The payload field that carries the failure details.
pub const ERROR_FIELD: &str = "error";

/// The type tag of an event pushed by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// The underlying ledger accepted the transaction.
    TransactionConfirmed,
    /// The downstream processor started to process the transaction.
    TransactionStarted,
    /// The downstream processor finished the transaction.
    TransactionCompleted,
    /// The downstream processor rejected the transaction.
    TransactionFailed,
    /// Any other event type.
    Other(String),
}

impl EventKind {
    /// The wire name of the event type.
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::TransactionConfirmed => "TRANSACTION_CONFIRMED",
            EventKind::TransactionStarted => "TRANSACTION_STARTED",
            EventKind::TransactionCompleted => "TRANSACTION_COMPLETED",
            EventKind::TransactionFailed => "TRANSACTION_FAILED",
            EventKind::Other(other) => other,
        }
    }
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        match value {
            "TRANSACTION_CONFIRMED" => EventKind::TransactionConfirmed,
            "TRANSACTION_STARTED" => EventKind::TransactionStarted,
            "TRANSACTION_COMPLETED" => EventKind::TransactionCompleted,
            "TRANSACTION_FAILED" => EventKind::TransactionFailed,
            other => EventKind::Other(other.to_owned()),
        }
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        EventKind::from(value.as_str())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Other(other) => other,
            known => known.as_str().to_owned(),
        }
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event pushed by the backend over the event stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IncomingEvent {
    /// The id of the event assigned by the backend.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The type tag.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// The time of the event as sent by the backend.
    #[serde(default)]
    pub timestamp: String,
    /// The account that caused the event.
    #[serde(default)]
    pub actor: String,
    /// The opaque payload.
    #[serde(default)]
    pub data: Payload,
}

impl IncomingEvent {
    /// Creates an event with the given type and payload.
    pub fn new(kind: impl Into<EventKind>, data: Payload) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            timestamp: String::new(),
            actor: String::new(),
            data,
        }
    }

    /// Sets the id of the event.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The tracking id the event refers to, if any.
    ///
    /// [`TRACKING_ID_FIELD`] takes priority over [`TRANSACTION_ID_FIELD`]. Empty or
    /// non-string values are skipped.
    pub fn tracking_id(&self) -> Option<TrackingId> {
        [TRACKING_ID_FIELD, TRANSACTION_ID_FIELD]
            .into_iter()
            .find_map(|field| {
                self.data
                    .get(field)
                    .and_then(Payload::as_str)
                    .filter(|id| !id.is_empty())
            })
            .map(TrackingId::from)
    }

    /// The failure details carried by the payload, if any.
    ///
    /// Non-string values are rendered as JSON.
    pub fn error(&self) -> Option<String> {
        match self.data.get(ERROR_FIELD)? {
            Payload::Null => None,
            Payload::String(error) => Some(error.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Control messages sent by the client to the event stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Asks the server to push the events of the account.
    SubscribeUser {
        /// The account name.
        #[serde(rename = "userId")]
        user_id: String,
    },
    /// Asks the server to push the events of the transaction.
    SubscribeTransaction {
        /// The tracking id of the transaction.
        #[serde(rename = "txId")]
        tx_id: String,
    },
}
