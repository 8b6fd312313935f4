use futures::{
    SinkExt,
    StreamExt,
};
use meeray_tx_tracker::{
    Config,
    ConnectionState,
    TransactionService,
    new_service,
    websocket::WebSocketTransport,
};
use meeray_types::services::{
    events::ControlMessage,
    transaction_status::{
        TrackingId,
        TransactionStatus,
        TxStage,
    },
};
use std::{
    net::SocketAddr,
    time::Duration,
};
use tokio::{
    net::{
        TcpListener,
        TcpStream,
    },
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};
use tokio_tungstenite::{
    WebSocketStream,
    accept_async,
    tungstenite::Message,
};
use url::Url;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// A WebSocket server on a random local port that hands out the accepted connections.
pub struct TestServer {
    addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<ServerConnection>,
    accept_loop: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (sender, connections) = mpsc::unbounded_channel();

        let accept_loop = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                match accept_async(stream).await {
                    Ok(ws) => {
                        if sender.send(ServerConnection { ws }).is_err() {
                            return
                        }
                    }
                    Err(error) => tracing::warn!(?error, "Handshake failed"),
                }
            }
        });

        Self {
            addr,
            connections,
            accept_loop,
        }
    }

    pub fn url(&self) -> Url {
        Url::parse(&format!("ws://{}/kafka-events", self.addr)).unwrap()
    }

    pub async fn next_connection(&mut self) -> ServerConnection {
        timeout(TIMEOUT, self.connections.recv())
            .await
            .expect("The client connected in time")
            .expect("The accept loop is alive")
    }

    /// Waits briefly and returns `true` if the client opened another connection.
    pub async fn has_new_connection(&mut self, wait: Duration) -> bool {
        timeout(wait, self.connections.recv()).await.is_ok()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

pub struct ServerConnection {
    ws: WebSocketStream<TcpStream>,
}

impl ServerConnection {
    pub async fn send_text(&mut self, text: impl Into<String>) {
        let text: String = text.into();
        self.ws.send(Message::Text(text.into())).await.unwrap();
    }

    pub async fn send_event(&mut self, event: serde_json::Value) {
        self.send_text(event.to_string()).await;
    }

    /// The next control message sent by the client, or `None` if it closed the connection.
    pub async fn next_control(&mut self) -> Option<ControlMessage> {
        loop {
            let message = timeout(TIMEOUT, self.ws.next())
                .await
                .expect("The client sent a message in time")?;
            match message {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str(&text.to_string()).unwrap())
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

pub fn service(url: Url, subject: Option<&str>) -> TransactionService<WebSocketTransport> {
    let config = Config {
        reconnect_delay: Duration::from_millis(100),
        max_reconnect_delay: Duration::from_millis(100),
        ..Default::default()
    };
    new_service(
        WebSocketTransport::new(url),
        subject.map(ToString::to_string),
        config,
    )
}

pub async fn wait_for_state(
    service: &TransactionService<WebSocketTransport>,
    expected: ConnectionState,
) {
    let mut watcher = service.connection_state_watcher();
    timeout(TIMEOUT, watcher.wait_for(|state| *state == expected))
        .await
        .expect("The connection state changed in time")
        .expect("The service is alive");
}

pub async fn wait_for_stage(
    service: &TransactionService<WebSocketTransport>,
    id: &TrackingId,
    stage: TxStage,
) -> TransactionStatus {
    let mut updates = service.subscribe_updates();
    if let Some(status) = service.get(id).filter(|status| status.status == stage) {
        return status
    }

    timeout(TIMEOUT, async {
        loop {
            let status = updates.recv().await.expect("The updates are alive");
            if &status.id == id && status.status == stage {
                return status
            }
        }
    })
    .await
    .expect("The transaction reached the stage in time")
}
