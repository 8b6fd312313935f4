use crate::{
    config::Config,
    error::Error,
    event_stream::{
        Backoff,
        ConnectionState,
        EventStream,
    },
    manager::TxStatusManager,
    ports::{
        EventConnection,
        EventTransport,
        SubjectProvider,
    },
    shared_state::SharedState,
};
use futures::future::pending;
use meeray_services::{
    RunnableService,
    RunnableTask,
    Service,
    ServiceRunner,
    State,
    StateWatcher,
    TaskNextAction,
};
use meeray_types::services::events::{
    ControlMessage,
    IncomingEvent,
};
use std::{
    ops::Deref,
    sync::Arc,
};
use tokio::{
    sync::{
        mpsc,
        watch,
    },
    time::{
        Instant,
        MissedTickBehavior,
    },
};

pub struct UninitializedTask<T> {
    transport: T,
    subject: Arc<dyn SubjectProvider>,
    config: Config,
    connection_state: watch::Sender<ConnectionState>,
    control_receiver: mpsc::Receiver<ControlMessage>,
    shared: SharedState,
}

#[async_trait::async_trait]
impl<T> RunnableService for UninitializedTask<T>
where
    T: EventTransport,
{
    const NAME: &'static str = "TxTracker";

    type SharedData = SharedState;
    type Task = Task<T>;
    type TaskParams = ();

    fn shared_data(&self) -> Self::SharedData {
        self.shared.clone()
    }

    async fn into_task(
        self,
        _: &StateWatcher,
        _: Self::TaskParams,
    ) -> anyhow::Result<Self::Task> {
        let UninitializedTask {
            transport,
            subject,
            config,
            connection_state,
            control_receiver,
            shared,
        } = self;

        let backoff = Backoff::new(
            config.reconnect_delay,
            config.max_reconnect_delay,
            config.max_reconnect_attempts,
        );
        let mut event_stream =
            EventStream::new(transport, subject, connection_state, backoff);
        event_stream.connect_now();

        let period = config.ttl_check_interval;
        let mut ttl_timer = tokio::time::interval_at(Instant::now() + period, period);
        ttl_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Task {
            manager: shared.manager,
            event_stream,
            connection: None,
            control_receiver,
            ttl_timer,
        })
    }
}

/// The task that owns the connection to the event stream.
///
/// Events are applied to the registry in the order they arrive.
pub struct Task<T>
where
    T: EventTransport,
{
    manager: TxStatusManager,
    event_stream: EventStream<T>,
    connection: Option<T::Connection>,
    control_receiver: mpsc::Receiver<ControlMessage>,
    ttl_timer: tokio::time::Interval,
}

enum Step {
    Stop,
    Message(anyhow::Result<Option<String>>),
    Control(Option<ControlMessage>),
    Reconnect,
    Prune,
}

impl<T> RunnableTask for Task<T>
where
    T: EventTransport,
{
    async fn run(&mut self, watcher: &mut StateWatcher) -> TaskNextAction {
        let reconnect_at = self.event_stream.reconnect_at();

        let step = tokio::select! {
            biased;

            _ = watcher.while_started() => Step::Stop,

            message = next_message(&mut self.connection) => Step::Message(message),

            control = self.control_receiver.recv() => Step::Control(control),

            _ = wait_until(reconnect_at) => Step::Reconnect,

            _ = self.ttl_timer.tick() => Step::Prune,
        };

        match step {
            Step::Stop => TaskNextAction::Stop,
            Step::Message(Ok(Some(text))) => {
                self.handle_message(&text);
                TaskNextAction::Continue
            }
            Step::Message(Ok(None)) => {
                tracing::info!("The event stream was closed by the server");
                self.disconnect().await;
                TaskNextAction::Continue
            }
            Step::Message(Err(error)) => {
                self.disconnect().await;
                TaskNextAction::ErrorContinue(error)
            }
            Step::Control(Some(message)) => self.send_control(message).await,
            Step::Control(None) => {
                tracing::debug!("All control senders are dropped");
                TaskNextAction::Stop
            }
            Step::Reconnect => {
                let connection = tokio::select! {
                    biased;
                    _ = watcher.while_started() => return TaskNextAction::Stop,
                    connection = self.event_stream.connect() => connection,
                };
                self.connection = connection;
                TaskNextAction::Continue
            }
            Step::Prune => {
                self.manager.prune_expired();
                TaskNextAction::Continue
            }
        }
    }

    async fn shutdown(mut self) -> anyhow::Result<()> {
        self.event_stream.shutdown();
        if let Some(mut connection) = self.connection.take() {
            connection.close().await?;
        }
        Ok(())
    }
}

impl<T> Task<T>
where
    T: EventTransport,
{
    fn handle_message(&self, text: &str) {
        match serde_json::from_str::<IncomingEvent>(text) {
            Ok(event) => {
                self.manager.apply_event(&event);
            }
            Err(error) => {
                tracing::warn!(%error, "Discarding a malformed event");
            }
        }
    }

    async fn send_control(&mut self, message: ControlMessage) -> TaskNextAction {
        let Some(connection) = self.connection.as_mut() else {
            tracing::debug!(?message, "Not connected to the event stream, dropping the request");
            return TaskNextAction::Continue
        };

        match connection.send(&message).await {
            Ok(()) => TaskNextAction::Continue,
            Err(error) => {
                self.disconnect().await;
                TaskNextAction::ErrorContinue(error)
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(error) = connection.close().await {
                tracing::debug!(?error, "Failed to close the connection");
            }
        }
        self.event_stream.on_disconnect();
    }
}

async fn next_message<C>(connection: &mut Option<C>) -> anyhow::Result<Option<String>>
where
    C: EventConnection,
{
    match connection {
        Some(connection) => connection.next_message().await,
        None => pending().await,
    }
}

async fn wait_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}

/// The entry point of the tracker. Dereferences to [`SharedState`].
pub struct TransactionService<T>
where
    T: EventTransport,
{
    runner: ServiceRunner<UninitializedTask<T>>,
}

impl<T> TransactionService<T>
where
    T: EventTransport,
{
    /// Starts the connection to the event stream.
    ///
    /// Calling it again while the service is running does nothing.
    pub fn connect(&self) -> Result<(), Error> {
        if self.runner.start().is_ok() {
            return Ok(())
        }

        let state = self.runner.state();
        if state.starting() || state.started() {
            Ok(())
        } else {
            Err(Error::ServiceStopped)
        }
    }

    /// Closes the connection and cancels the pending reconnection and cleanup.
    pub async fn dispose(&self) -> anyhow::Result<State> {
        self.runner.stop_and_await().await
    }

    pub fn state(&self) -> State {
        self.runner.state()
    }

    pub fn state_watcher(&self) -> StateWatcher {
        self.runner.state_watcher()
    }

    pub fn shared(&self) -> &SharedState {
        &self.runner.shared
    }
}

impl<T> Deref for TransactionService<T>
where
    T: EventTransport,
{
    type Target = SharedState;

    fn deref(&self) -> &Self::Target {
        &self.runner.shared
    }
}

pub fn new_service<T, S>(transport: T, subject: S, config: Config) -> TransactionService<T>
where
    T: EventTransport,
    S: SubjectProvider,
{
    let (control_sender, control_receiver) =
        mpsc::channel(config.control_queue_capacity.max(1));
    let (connection_state, connection_state_receiver) =
        watch::channel(ConnectionState::Disconnected);

    let shared = SharedState {
        manager: TxStatusManager::new(&config),
        control_sender,
        connection_state: connection_state_receiver,
    };

    let runner = ServiceRunner::new(UninitializedTask {
        transport,
        subject: Arc::new(subject),
        config,
        connection_state,
        control_receiver,
        shared,
    });

    TransactionService { runner }
}
