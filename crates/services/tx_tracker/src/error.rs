use meeray_types::services::transaction_status::{
    TrackingId,
    TxStage,
};

#[derive(Clone, Debug, PartialEq, Eq, derive_more::Display)]
pub enum Error {
    #[display(fmt = "Transaction {_0} is already tracked")]
    AlreadyTracked(TrackingId),
    #[display(fmt = "Transaction {_0} is not tracked")]
    NotTracked(TrackingId),
    #[display(fmt = "Transaction {_0} is already in the final stage {_1}")]
    AlreadyFinal(TrackingId, TxStage),
    #[display(fmt = "The transaction service is stopped")]
    ServiceStopped,
}

impl std::error::Error for Error {}
