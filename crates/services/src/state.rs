//! The lifecycle state of a service and the watcher tasks use to follow it.

use tokio::sync::watch;

/// The lifecycle state of the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// The service was created but `start` was not called yet.
    NotStarted,
    /// `start` was called, the task is being initialized.
    Starting,
    /// The task is running.
    Started,
    /// `stop` was called, the task is winding down.
    Stopping,
    /// The task finished and released its resources.
    Stopped,
    /// The task finished because of an error or a panic.
    StoppedWithError(String),
}

impl State {
    pub fn not_started(&self) -> bool {
        self == &State::NotStarted
    }

    pub fn starting(&self) -> bool {
        self == &State::Starting
    }

    pub fn started(&self) -> bool {
        self == &State::Started
    }

    pub fn stopped(&self) -> bool {
        matches!(self, State::Stopped | State::StoppedWithError(_))
    }
}

/// A read-only view of the service state, handed to the running task.
#[derive(Clone)]
pub struct StateWatcher(watch::Receiver<State>);

impl StateWatcher {
    pub fn borrow(&self) -> watch::Ref<'_, State> {
        self.0.borrow()
    }

    pub fn borrow_and_update(&mut self) -> watch::Ref<'_, State> {
        self.0.borrow_and_update()
    }

    pub async fn changed(&mut self) -> anyhow::Result<()> {
        self.0.changed().await?;
        Ok(())
    }

    /// Resolves once the state leaves `Started`.
    ///
    /// Tasks race it against their work inside `tokio::select!` to react to `stop`.
    pub async fn while_started(&mut self) -> anyhow::Result<State> {
        loop {
            let state = self.borrow_and_update().clone();
            if !state.started() {
                return Ok(state)
            }

            self.changed().await?;
        }
    }
}

impl From<watch::Receiver<State>> for StateWatcher {
    fn from(receiver: watch::Receiver<State>) -> Self {
        Self(receiver)
    }
}

