use crate::helpers::{
    TestServer,
    service,
    wait_for_state,
};
use meeray_services::State;
use meeray_tx_tracker::ConnectionState;
use meeray_types::services::events::ControlMessage;
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::net::TcpListener;

#[tokio::test]
async fn connect__subscribes_to_the_user_events() {
    // Given
    let mut server = TestServer::start().await;
    let service = service(server.url(), Some("alice"));

    // When
    service.connect().unwrap();
    let mut connection = server.next_connection().await;

    // Then
    assert_eq!(
        connection.next_control().await,
        Some(ControlMessage::SubscribeUser {
            user_id: "alice".to_string()
        })
    );
    wait_for_state(&service, ConnectionState::Connected).await;
    service.dispose().await.unwrap();
}

#[tokio::test]
async fn connect__twice_opens_one_connection() {
    // Given
    let mut server = TestServer::start().await;
    let service = service(server.url(), None);

    // When
    service.connect().unwrap();
    service.connect().unwrap();
    let _connection = server.next_connection().await;

    // Then
    assert!(!server.has_new_connection(Duration::from_millis(300)).await);
    service.dispose().await.unwrap();
}

#[tokio::test]
async fn server_close__triggers_a_reconnect() {
    // Given
    let mut server = TestServer::start().await;
    let service = service(server.url(), Some("alice"));
    service.connect().unwrap();
    let mut first = server.next_connection().await;
    first.next_control().await;

    // When
    first.close().await;

    // Then
    let mut second = server.next_connection().await;
    assert_eq!(
        second.next_control().await,
        Some(ControlMessage::SubscribeUser {
            user_id: "alice".to_string()
        })
    );
    wait_for_state(&service, ConnectionState::Connected).await;
    assert!(!server.has_new_connection(Duration::from_millis(300)).await);
    service.dispose().await.unwrap();
}

#[tokio::test]
async fn subscribe_to_transaction__reaches_the_server() {
    // Given
    let mut server = TestServer::start().await;
    let service = service(server.url(), None);
    service.connect().unwrap();
    let mut connection = server.next_connection().await;
    wait_for_state(&service, ConnectionState::Connected).await;

    // When
    assert!(service.subscribe_to_transaction(&"tx1".into()));

    // Then
    assert_eq!(
        connection.next_control().await,
        Some(ControlMessage::SubscribeTransaction {
            tx_id: "tx1".to_string()
        })
    );
    service.dispose().await.unwrap();
}

#[tokio::test]
async fn dispose__closes_the_connection() {
    // Given
    let mut server = TestServer::start().await;
    let service = service(server.url(), None);
    service.connect().unwrap();
    let mut connection = server.next_connection().await;
    wait_for_state(&service, ConnectionState::Connected).await;

    // When
    let state = service.dispose().await.unwrap();

    // Then
    assert_eq!(state, State::Stopped);
    assert_eq!(connection.next_control().await, None);
    assert_eq!(service.connection_state(), ConnectionState::Disconnected);
    assert!(!server.has_new_connection(Duration::from_millis(300)).await);
}

#[tokio::test]
async fn unreachable_server__keeps_retrying_without_failing() {
    // Given
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let url = format!("ws://{addr}/kafka-events").parse().unwrap();
    let service = service(url, None);

    // When
    service.connect().unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Then
    assert!(service.state().started());
    assert!(!service.is_connected());
    assert!(!service.subscribe_to_transaction(&"tx1".into()));
    assert_eq!(service.dispose().await.unwrap(), State::Stopped);
}
