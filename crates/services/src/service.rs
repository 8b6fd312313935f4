use crate::state::{
    State,
    StateWatcher,
};
use anyhow::anyhow;
use futures::FutureExt;
use std::{
    any::Any,
    future::Future,
    panic::AssertUnwindSafe,
};
use tokio::sync::watch;
use tracing::Instrument;

/// Alias for `Arc<T>`
pub type Shared<T> = std::sync::Arc<T>;

/// Trait for service runners, providing a minimal interface for managing
/// the lifecycle of services such as start/stop and health status.
#[async_trait::async_trait]
pub trait Service {
    /// Send a start signal to the service without waiting for its initialization.
    /// Returns an error if the service was already started.
    fn start(&self) -> anyhow::Result<()>;

    /// Send a start signal to the service and wait for it to be started or stopped.
    async fn start_and_await(&self) -> anyhow::Result<State>;

    /// Wait for the service to be started or stopped.
    async fn await_start_or_stop(&self) -> anyhow::Result<State>;

    /// Send a stop signal to the service without waiting for it to shut down.
    /// Returns `false` if the service was already stopped.
    fn stop(&self) -> bool;

    /// Send a stop signal to the service and wait for it to shut down.
    async fn stop_and_await(&self) -> anyhow::Result<State>;

    /// Wait for the service to stop.
    async fn await_stop(&self) -> anyhow::Result<State>;

    /// The current state of the service.
    fn state(&self) -> State;

    /// A watcher on the state of the service.
    fn state_watcher(&self) -> StateWatcher;
}

/// Trait used by `ServiceRunner` to encapsulate the business logic tasks for a service.
#[async_trait::async_trait]
pub trait RunnableService: Send {
    /// The name of the runnable service, used for namespacing error messages.
    const NAME: &'static str;

    /// Service specific shared data. This is used when you have data that needs to be shared
    /// by one or more tasks. It is the implementors responsibility to ensure cloning this
    /// type is shallow and doesn't provide a full duplication of data that is meant
    /// to be shared between asynchronous processes.
    type SharedData: Clone + Send + Sync;

    /// The initialized runnable task type.
    type Task: RunnableTask;

    /// Optional parameters used to when initializing into task.
    type TaskParams: Send;

    /// A cloned instance of the shared data.
    fn shared_data(&self) -> Self::SharedData;

    /// Converts the service into a runnable task before the main run loop.
    ///
    /// The `state` is a `State` watcher of the service. Some tasks may handle state changes
    /// on their own.
    async fn into_task(
        self,
        state_watcher: &StateWatcher,
        params: Self::TaskParams,
    ) -> anyhow::Result<Self::Task>;
}

/// The result of a single iteration of the task run loop.
#[derive(Debug)]
pub enum TaskNextAction {
    /// Run the next iteration.
    Continue,
    /// Stop the task.
    Stop,
    /// Log the error and run the next iteration.
    ErrorContinue(anyhow::Error),
}

/// The trait is implemented by the service task and contains a single iteration of the infinity
/// loop.
pub trait RunnableTask: Send {
    /// This function should contain the main business logic of the service task. It will run until
    /// the service either returns `TaskNextAction::Stop`, or the `watcher` leaves the `Started`
    /// state. The task must race its work against `watcher.while_started()` so that it reacts
    /// to `stop` promptly.
    fn run(
        &mut self,
        watcher: &mut StateWatcher,
    ) -> impl Future<Output = TaskNextAction> + Send;

    /// Gracefully shutdowns the task after the end of the execution cycle.
    fn shutdown(self) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Manages the state of the service and its run loop.
pub struct ServiceRunner<S>
where
    S: RunnableService + 'static,
{
    /// The shared state of the service
    pub shared: S::SharedData,
    state: Shared<watch::Sender<State>>,
}

impl<S> Drop for ServiceRunner<S>
where
    S: RunnableService + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}

impl<S> ServiceRunner<S>
where
    S: RunnableService + 'static,
{
    /// Initializes a new `ServiceRunner` containing a `RunnableService`
    pub fn new(service: S) -> Self
    where
        S::TaskParams: Default,
    {
        Self::new_with_params(service, S::TaskParams::default())
    }

    /// Initializes a new `ServiceRunner` containing a `RunnableService` with parameters for
    /// the underlying `Task`.
    pub fn new_with_params(service: S, params: S::TaskParams) -> Self {
        let shared = service.shared_data();
        let state = initialize_loop(service, params);
        Self { shared, state }
    }

    async fn _await_start_or_stop(
        &self,
        mut start: StateWatcher,
    ) -> anyhow::Result<State> {
        loop {
            let state = start.borrow_and_update().clone();
            if !state.starting() && !state.not_started() {
                return Ok(state)
            }
            start.changed().await?;
        }
    }

    async fn _await_stop(&self, mut stop: StateWatcher) -> anyhow::Result<State> {
        loop {
            let state = stop.borrow_and_update().clone();
            if state.stopped() {
                return Ok(state)
            }
            stop.changed().await?;
        }
    }
}

#[async_trait::async_trait]
impl<S> Service for ServiceRunner<S>
where
    S: RunnableService + 'static,
{
    fn start(&self) -> anyhow::Result<()> {
        let started = self.state.send_if_modified(|state| {
            if state.not_started() {
                *state = State::Starting;
                true
            } else {
                false
            }
        });

        if started {
            Ok(())
        } else {
            Err(anyhow!(
                "The service `{}` already has been started.",
                S::NAME
            ))
        }
    }

    async fn start_and_await(&self) -> anyhow::Result<State> {
        let start = self.state.subscribe().into();
        self.start()?;
        self._await_start_or_stop(start).await
    }

    async fn await_start_or_stop(&self) -> anyhow::Result<State> {
        let start = self.state.subscribe().into();
        self._await_start_or_stop(start).await
    }

    fn stop(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.not_started() || state.starting() || state.started() {
                *state = State::Stopping;
                true
            } else {
                false
            }
        })
    }

    async fn stop_and_await(&self) -> anyhow::Result<State> {
        let stop = self.state.subscribe().into();
        self.stop();
        self._await_stop(stop).await
    }

    async fn await_stop(&self) -> anyhow::Result<State> {
        let stop = self.state.subscribe().into();
        self._await_stop(stop).await
    }

    fn state(&self) -> State {
        self.state.borrow().clone()
    }

    fn state_watcher(&self) -> StateWatcher {
        self.state.subscribe().into()
    }
}

/// Initialize the background loop as a spawned task.
#[tracing::instrument(skip_all, fields(service = S::NAME))]
fn initialize_loop<S>(service: S, params: S::TaskParams) -> Shared<watch::Sender<State>>
where
    S: RunnableService + 'static,
{
    let (sender, _) = watch::channel(State::NotStarted);
    let state = Shared::new(sender);
    let stop_sender = state.clone();
    // Spawned as a task to check if the service is already running and to capture any panics.
    tokio::task::spawn(
        async move {
            tracing::debug!("running");
            let run = std::panic::AssertUnwindSafe(run(service, stop_sender.clone(), params));
            tracing::debug!("awaiting run");
            let result = run.catch_unwind().await;

            let stopped_state = if let Err(e) = result {
                let panic_information = panic_to_string(e);
                State::StoppedWithError(panic_information)
            } else {
                State::Stopped
            };

            tracing::debug!("shutting down {:?}", stopped_state);

            let _ = stop_sender.send_if_modified(|state| {
                if !state.stopped() {
                    *state = stopped_state.clone();
                    tracing::debug!("Wasn't stopped, so sent stop.");
                    true
                } else {
                    tracing::debug!("Was already stopped.");
                    false
                }
            });

            tracing::info!("The service {} is shut down", S::NAME);
        }
        .in_current_span(),
    );
    state
}

/// Main background run loop.
async fn run<S>(service: S, sender: Shared<watch::Sender<State>>, params: S::TaskParams)
where
    S: RunnableService + 'static,
{
    let mut state: StateWatcher = sender.subscribe().into();
    if state.borrow_and_update().not_started() {
        // We can panic here, because it is inside of the task.
        state.changed().await.expect("The service is destroyed");
    }

    // If the state after update is not `Starting` then return to stop the service.
    if !state.borrow().starting() {
        return
    }

    // We can panic here, because it is inside of the task.
    let mut task = service
        .into_task(&state, params)
        .await
        .expect("The initialization of the service failed.");

    sender.send_if_modified(|s| {
        if s.starting() {
            *s = State::Started;
            true
        } else {
            false
        }
    });

    let got_panic = run_task(&mut task, state, S::NAME).await;

    let got_panic = shutdown_task(S::NAME, task, got_panic).await;

    if let Some(panic) = got_panic {
        std::panic::resume_unwind(panic)
    }
}

async fn run_task<S: RunnableTask>(
    task: &mut S,
    mut state: StateWatcher,
    name: &str,
) -> Option<Box<dyn Any + Send>> {
    let mut got_panic = None;

    while state.borrow_and_update().started() {
        let tracked_task = AssertUnwindSafe(task.run(&mut state));
        let task = tracked_task.catch_unwind().await;

        if let Err(panic) = task {
            tracing::debug!("got a panic");
            got_panic = Some(panic);
            break
        }

        let result = task.expect("Checked above");

        match result {
            TaskNextAction::Continue => {
                tracing::debug!("run loop");
            }
            TaskNextAction::Stop => {
                tracing::debug!("stopping");
                break
            }
            TaskNextAction::ErrorContinue(e) => {
                tracing::error!(error = ?e, "The task {name} returned an error during execution");
            }
        }
    }
    got_panic
}

async fn shutdown_task<S>(
    name: &str,
    task: S,
    mut got_panic: Option<Box<dyn Any + Send>>,
) -> Option<Box<dyn Any + Send>>
where
    S: RunnableTask,
{
    let result = AssertUnwindSafe(task.shutdown()).catch_unwind().await;

    match result {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            tracing::error!("Go an error during shutdown of the task {name}: {e}");
        }
        Err(e) => {
            if got_panic.is_some() {
                let panic_information = panic_to_string(e);
                tracing::error!(
                    "Go a panic during execution and shutdown of the task {name}. \
                    During shutdown: {panic_information}"
                );
            } else {
                got_panic = Some(e);
            }
        }
    }
    got_panic
}

/// Extracts the message of a caught panic.
pub fn panic_to_string(e: Box<dyn core::any::Any + Send>) -> String {
    match e.downcast::<String>() {
        Ok(v) => *v,
        Err(e) => match e.downcast::<&str>() {
            Ok(v) => v.to_string(),
            _ => "Unknown Source of Error".to_owned(),
        },
    }
}
