use crate::{
    error::Error,
    event_stream::ConnectionState,
    manager::TxStatusManager,
};
use meeray_services::stream::BoxStream;
use meeray_types::services::{
    events::ControlMessage,
    transaction_status::{
        TrackingId,
        TransactionStatus,
    },
};
use tokio::sync::{
    broadcast,
    mpsc,
    watch,
};
use tokio_stream::{
    StreamExt,
    wrappers::BroadcastStream,
};

#[derive(Clone)]
pub struct SharedState {
    pub(crate) manager: TxStatusManager,
    pub(crate) control_sender: mpsc::Sender<ControlMessage>,
    pub(crate) connection_state: watch::Receiver<ConnectionState>,
}

impl SharedState {
    pub fn register(
        &self,
        id: impl Into<TrackingId>,
        tx_type: impl Into<String>,
    ) -> Result<TransactionStatus, Error> {
        self.manager.register(id, tx_type)
    }

    pub fn get(&self, id: &TrackingId) -> Option<TransactionStatus> {
        self.manager.get(id)
    }

    pub fn list_all(&self) -> Vec<TransactionStatus> {
        self.manager.list_all()
    }

    pub fn list_by_type(&self, tx_type: &str) -> Vec<TransactionStatus> {
        self.manager.list_by_type(tx_type)
    }

    pub fn on_update<F>(&self, id: impl Into<TrackingId>, listener: F)
    where
        F: Fn(&TransactionStatus) + Send + Sync + 'static,
    {
        self.manager.on_update(id, listener)
    }

    pub fn remove_listener(&self, id: &TrackingId) -> bool {
        self.manager.remove_listener(id)
    }

    pub fn confirm_upstream(
        &self,
        id: &TrackingId,
        external_tx_id: impl Into<String>,
    ) -> Result<TransactionStatus, Error> {
        self.manager.confirm_upstream(id, external_tx_id)
    }

    /// Asks the server to push the events of the account.
    ///
    /// Returns `false` if the request was dropped because the stream is not connected.
    pub fn subscribe_to_user_events(&self, user_id: impl Into<String>) -> bool {
        self.send_control(ControlMessage::SubscribeUser {
            user_id: user_id.into(),
        })
    }

    /// Asks the server to push the events of the transaction.
    ///
    /// Returns `false` if the request was dropped because the stream is not connected.
    pub fn subscribe_to_transaction(&self, id: &TrackingId) -> bool {
        self.send_control(ControlMessage::SubscribeTransaction {
            tx_id: id.to_string(),
        })
    }

    fn send_control(&self, message: ControlMessage) -> bool {
        if !self.is_connected() {
            tracing::debug!(?message, "Not connected to the event stream, dropping the request");
            return false
        }

        match self.control_sender.try_send(message) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "Failed to queue the control message");
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection_state.borrow()
    }

    /// A receiver that observes every change of the connection state.
    pub fn connection_state_watcher(&self) -> watch::Receiver<ConnectionState> {
        self.connection_state.clone()
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<TransactionStatus> {
        self.manager.subscribe_updates()
    }

    /// A stream of every status change. Updates missed because of a slow consumer are
    /// skipped.
    pub fn status_stream(&self) -> BoxStream<TransactionStatus> {
        let stream = BroadcastStream::new(self.manager.subscribe_updates())
            .filter_map(|update| match update {
                Ok(status) => Some(status),
                Err(error) => {
                    tracing::warn!(%error, "The status stream lagged behind");
                    None
                }
            });
        Box::pin(stream)
    }

    pub fn manager(&self) -> &TxStatusManager {
        &self.manager
    }
}
