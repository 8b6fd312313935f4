use meeray_types::services::events::ControlMessage;

/// Opens connections to the event stream of the backend.
#[async_trait::async_trait]
pub trait EventTransport: Send + Sync + 'static {
    type Connection: EventConnection;

    async fn connect(&self) -> anyhow::Result<Self::Connection>;
}

/// An open connection to the event stream.
#[async_trait::async_trait]
pub trait EventConnection: Send + 'static {
    /// Sends the control message to the server.
    async fn send(&mut self, message: &ControlMessage) -> anyhow::Result<()>;

    /// Waits for the next text message from the server.
    ///
    /// Returns `Ok(None)` when the server closed the connection.
    async fn next_message(&mut self) -> anyhow::Result<Option<String>>;

    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Provides the account whose events the stream subscribes to after connecting.
pub trait SubjectProvider: Send + Sync + 'static {
    fn current_subject(&self) -> Option<String>;
}

impl SubjectProvider for Option<String> {
    fn current_subject(&self) -> Option<String> {
        self.clone()
    }
}

impl SubjectProvider for String {
    fn current_subject(&self) -> Option<String> {
        Some(self.clone())
    }
}
