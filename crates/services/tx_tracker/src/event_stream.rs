use crate::ports::{
    EventConnection,
    EventTransport,
    SubjectProvider,
};
use meeray_types::services::events::ControlMessage;
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::watch,
    time::Instant,
};

/// The state of the connection to the event stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, derive_more::Display)]
pub enum ConnectionState {
    #[default]
    #[display(fmt = "disconnected")]
    Disconnected,
    #[display(fmt = "connecting")]
    Connecting,
    #[display(fmt = "connected")]
    Connected,
}

/// The delay between reconnection attempts.
///
/// The delay starts at `base` and doubles after every failed attempt up to `max`.
#[derive(Debug)]
pub(crate) struct Backoff {
    base: Duration,
    max: Duration,
    max_attempts: Option<u32>,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            base,
            max: max.max(base),
            max_attempts,
            failures: 0,
        }
    }

    /// The delay before the next attempt, or `None` if the attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| self.failures >= max) {
            return None
        }
        let factor = 2u32.saturating_pow(self.failures);
        let delay = self.base.saturating_mul(factor).min(self.max);
        self.failures = self.failures.saturating_add(1);
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

/// Opens the connection to the event stream and decides when to reopen it.
pub(crate) struct EventStream<T> {
    transport: T,
    subject: Arc<dyn SubjectProvider>,
    state: watch::Sender<ConnectionState>,
    backoff: Backoff,
    reconnect_at: Option<Instant>,
}

impl<T> EventStream<T>
where
    T: EventTransport,
{
    pub fn new(
        transport: T,
        subject: Arc<dyn SubjectProvider>,
        state: watch::Sender<ConnectionState>,
        backoff: Backoff,
    ) -> Self {
        Self {
            transport,
            subject,
            state,
            backoff,
            reconnect_at: None,
        }
    }

    /// The time of the scheduled connection attempt.
    pub fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Schedules the connection attempt without a delay.
    pub fn connect_now(&mut self) {
        self.reconnect_at = Some(Instant::now());
    }

    /// Opens a new connection and subscribes to the events of the current subject.
    ///
    /// A failure schedules the next attempt.
    pub async fn connect(&mut self) -> Option<T::Connection> {
        self.reconnect_at = None;
        self.set_state(ConnectionState::Connecting);

        let mut connection = match self.transport.connect().await {
            Ok(connection) => connection,
            Err(error) => {
                tracing::warn!(?error, "Failed to connect to the event stream");
                self.on_disconnect();
                return None
            }
        };

        if let Some(user_id) = self.subject.current_subject() {
            let subscribe = ControlMessage::SubscribeUser { user_id };
            if let Err(error) = connection.send(&subscribe).await {
                tracing::warn!(?error, "Failed to subscribe to the user events");
                let _ = connection.close().await;
                self.on_disconnect();
                return None
            }
        }

        self.backoff.reset();
        self.set_state(ConnectionState::Connected);
        tracing::info!("Connected to the event stream");
        Some(connection)
    }

    /// Marks the stream as disconnected and schedules exactly one reconnection attempt.
    pub fn on_disconnect(&mut self) {
        self.set_state(ConnectionState::Disconnected);
        if self.reconnect_at.is_some() {
            return
        }

        match self.backoff.next_delay() {
            Some(delay) => {
                tracing::info!(?delay, "Reconnecting to the event stream");
                self.reconnect_at = Some(Instant::now() + delay);
            }
            None => {
                tracing::warn!("Reconnection attempts are exhausted, staying disconnected");
            }
        }
    }

    /// Cancels the scheduled attempt.
    pub fn shutdown(&mut self) {
        self.reconnect_at = None;
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current != state {
                tracing::debug!(from = %current, to = %state, "connection state changed");
                *current = state;
                true
            } else {
                false
            }
        });
    }
}
