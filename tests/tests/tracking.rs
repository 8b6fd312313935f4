use crate::helpers::{
    TestServer,
    service,
    wait_for_stage,
    wait_for_state,
};
use meeray_tx_tracker::ConnectionState;
use meeray_types::services::transaction_status::{
    TrackingId,
    TxStage,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::{
    Arc,
    atomic::{
        AtomicUsize,
        Ordering,
    },
};

#[tokio::test]
async fn swap__moves_through_the_stages() {
    // Given
    let mut server = TestServer::start().await;
    let service = service(server.url(), Some("alice"));
    let tx1 = TrackingId::from("tx1");
    service.register(tx1.clone(), "SWAP").unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    service.on_update(tx1.clone(), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    service.connect().unwrap();
    let mut connection = server.next_connection().await;
    connection.next_control().await;

    // When
    connection
        .send_event(json!({
            "_id": "e1",
            "type": "TRANSACTION_STARTED",
            "timestamp": "2024-05-01T10:00:00Z",
            "actor": "alice",
            "data": {"_trackingId": "tx1"}
        }))
        .await;

    // Then
    let status = wait_for_stage(&service, &tx1, TxStage::ProcessingDownstream).await;
    assert_eq!(status.confirmation_tx_id.as_deref(), Some("e1"));

    // When
    connection
        .send_event(json!({
            "_id": "e2",
            "type": "TRANSACTION_COMPLETED",
            "timestamp": "2024-05-01T10:00:05Z",
            "actor": "alice",
            "data": {"_trackingId": "tx1", "result": {"ok": true}}
        }))
        .await;

    // Then
    let status = wait_for_stage(&service, &tx1, TxStage::Completed).await;
    assert_eq!(status.result.unwrap()["result"]["ok"], json!(true));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(service.list_by_type("SWAP").len(), 1);
    service.dispose().await.unwrap();
}

#[tokio::test]
async fn failed_event__carries_the_error() {
    // Given
    let mut server = TestServer::start().await;
    let service = service(server.url(), None);
    let tx = TrackingId::from("stake-1");
    service.register(tx.clone(), "STAKE").unwrap();
    service.connect().unwrap();
    let mut connection = server.next_connection().await;
    wait_for_state(&service, ConnectionState::Connected).await;

    // When
    connection
        .send_event(json!({
            "_id": "e9",
            "type": "TRANSACTION_FAILED",
            "data": {"transactionId": "stake-1", "error": "insufficient balance"}
        }))
        .await;

    // Then
    let status = wait_for_stage(&service, &tx, TxStage::Failed).await;
    assert_eq!(status.error.as_deref(), Some("insufficient balance"));
    service.dispose().await.unwrap();
}

#[tokio::test]
async fn malformed_messages__do_not_break_the_stream() {
    // Given
    let mut server = TestServer::start().await;
    let service = service(server.url(), None);
    let tx1 = TrackingId::from("tx1");
    service.register(tx1.clone(), "SWAP").unwrap();
    service.connect().unwrap();
    let mut connection = server.next_connection().await;
    wait_for_state(&service, ConnectionState::Connected).await;

    // When
    connection.send_text("{not json").await;
    connection
        .send_event(json!({"type": "POOL_CREATED", "data": {"pool": "MRY/USDT"}}))
        .await;
    connection
        .send_event(json!({
            "_id": "e1",
            "type": "TRANSACTION_COMPLETED",
            "data": {"_trackingId": "tx1"}
        }))
        .await;

    // Then
    let status = wait_for_stage(&service, &tx1, TxStage::Completed).await;
    assert_eq!(status.confirmation_tx_id.as_deref(), Some("e1"));
    assert!(service.is_connected());
    service.dispose().await.unwrap();
}
