use crate::{
    error::Error,
    event_stream::ConnectionState,
    tests::universe::{
        TestUniverse,
        settle,
        wait_connected,
    },
};
use meeray_types::services::{
    events::ControlMessage,
    transaction_status::TrackingId,
};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn connect__twice_opens_a_single_connection() {
    // Given
    let mut universe = TestUniverse::default();
    let transport = universe.transport();
    let service = universe.build_service();

    // When
    service.connect().unwrap();
    service.connect().unwrap();
    wait_connected(&service).await;
    service.connect().unwrap();
    settle().await;

    // Then
    assert_eq!(transport.connects(), 1);
    assert!(service.is_connected());
    service.dispose().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn connect__after_dispose_fails() {
    let mut universe = TestUniverse::default();
    let service = universe.build_service();
    service.connect().unwrap();
    wait_connected(&service).await;
    let mut watcher = service.state_watcher();

    service.dispose().await.unwrap();

    assert!(watcher.borrow_and_update().stopped());
    assert_eq!(service.connect(), Err(Error::ServiceStopped));
    assert_eq!(service.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn connect__subscribes_to_the_user_events() {
    // Given
    let mut universe = TestUniverse::default().with_subject("alice");
    let transport = universe.transport();
    let service = universe.build_service();

    // When
    service.connect().unwrap();
    wait_connected(&service).await;

    // Then
    assert_eq!(
        transport.last_peer().sent(),
        vec![ControlMessage::SubscribeUser {
            user_id: "alice".to_string()
        }]
    );
    service.dispose().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn connect__without_subject_sends_nothing() {
    let mut universe = TestUniverse::default();
    let transport = universe.transport();
    let service = universe.build_service();

    service.connect().unwrap();
    wait_connected(&service).await;

    assert!(transport.last_peer().sent().is_empty());
    service.dispose().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn closed_connection__reconnects_exactly_once_after_the_delay() {
    // Given
    let mut universe = TestUniverse::default().with_subject("alice");
    let transport = universe.transport();
    let service = universe.build_service();
    service.connect().unwrap();
    wait_connected(&service).await;

    // When
    transport.peer(0).close();
    sleep(Duration::from_millis(4900)).await;

    // Then
    assert_eq!(transport.connects(), 1);
    assert_eq!(service.connection_state(), ConnectionState::Disconnected);
    assert!(transport.peer(0).is_closed());

    // When
    sleep(Duration::from_millis(200)).await;

    // Then
    assert_eq!(transport.connects(), 2);
    assert!(service.is_connected());
    assert_eq!(transport.peer(1).sent().len(), 1, "subscribed again");

    sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.connects(), 2);
    service.dispose().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn transport_error__reconnects_exactly_once() {
    // Given
    let mut universe = TestUniverse::default();
    let transport = universe.transport();
    let service = universe.build_service();
    service.connect().unwrap();
    wait_connected(&service).await;

    // When
    let peer = transport.peer(0);
    peer.fail("connection reset");
    peer.close();
    sleep(Duration::from_secs(6)).await;

    // Then
    assert_eq!(transport.connects(), 2);
    assert_eq!(transport.peers(), 2);
    assert!(service.state().started());
    service.dispose().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn dispose__cancels_the_pending_reconnect() {
    // Given
    let mut universe = TestUniverse::default();
    let transport = universe.transport();
    let service = universe.build_service();
    service.connect().unwrap();
    wait_connected(&service).await;
    transport.peer(0).close();
    settle().await;

    // When
    let state = service.dispose().await.unwrap();
    sleep(Duration::from_secs(60)).await;

    // Then
    assert!(state.stopped());
    assert_eq!(transport.connects(), 1);
    assert_eq!(service.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn dispose__closes_the_open_connection() {
    let mut universe = TestUniverse::default();
    let transport = universe.transport();
    let service = universe.build_service();
    service.connect().unwrap();
    wait_connected(&service).await;

    service.dispose().await.unwrap();

    assert!(transport.peer(0).is_closed());
    assert!(!service.is_connected());
}

#[tokio::test(start_paused = true)]
async fn subscribe_to_transaction__is_sent_while_connected() {
    // Given
    let mut universe = TestUniverse::default();
    let transport = universe.transport();
    let service = universe.build_service();
    service.connect().unwrap();
    wait_connected(&service).await;

    // When
    let queued = service.subscribe_to_transaction(&TrackingId::from("tx1"));
    let user = service.subscribe_to_user_events("bob");
    settle().await;

    // Then
    assert!(queued);
    assert!(user);
    assert_eq!(
        transport.peer(0).sent(),
        vec![
            ControlMessage::SubscribeTransaction {
                tx_id: "tx1".to_string()
            },
            ControlMessage::SubscribeUser {
                user_id: "bob".to_string()
            },
        ]
    );
    service.dispose().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn subscribe_to_transaction__is_dropped_while_disconnected() {
    // Given
    let mut universe = TestUniverse::default();
    let transport = universe.transport();
    let service = universe.build_service();
    assert!(!service.subscribe_to_transaction(&TrackingId::from("early")));
    service.connect().unwrap();
    wait_connected(&service).await;
    transport.peer(0).close();
    settle().await;

    // When
    let queued = service.subscribe_to_transaction(&TrackingId::from("tx1"));
    sleep(Duration::from_secs(6)).await;

    // Then
    assert!(!queued);
    assert!(service.is_connected());
    assert!(transport.peer(0).sent().is_empty());
    assert!(transport.peer(1).sent().is_empty(), "nothing is buffered");
    service.dispose().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_connects__back_off_exponentially() {
    // Given
    let mut universe = TestUniverse::default();
    universe.config().reconnect_delay = Duration::from_secs(1);
    universe.config().max_reconnect_delay = Duration::from_secs(4);
    let transport = universe.transport();
    transport.fail_next(2);
    let service = universe.build_service();

    // When
    service.connect().unwrap();
    sleep(Duration::from_millis(500)).await;

    // Then
    assert_eq!(transport.connects(), 1);
    assert_eq!(service.connection_state(), ConnectionState::Disconnected);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.connects(), 2, "first retry after 1s");

    sleep(Duration::from_millis(1400)).await;
    assert_eq!(transport.connects(), 2, "second retry waits 2s");

    sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.connects(), 3);
    assert!(service.is_connected());
    service.dispose().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_connects__stop_after_max_attempts() {
    // Given
    let mut universe = TestUniverse::default();
    universe.config().reconnect_delay = Duration::from_secs(1);
    universe.config().max_reconnect_attempts = Some(2);
    let transport = universe.transport();
    transport.fail_next(100);
    let service = universe.build_service();

    // When
    service.connect().unwrap();
    sleep(Duration::from_secs(600)).await;

    // Then
    assert_eq!(transport.connects(), 3, "initial attempt and two retries");
    assert_eq!(service.connection_state(), ConnectionState::Disconnected);
    assert!(service.state().started());
    service.dispose().await.unwrap();
}
