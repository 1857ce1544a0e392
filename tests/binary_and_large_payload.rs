use std::time::Duration;

use pubsub_client::{Client, ClientOptions};
use pubsub_test_support::MockServer;

#[tokio::test]
async fn binary_payload_with_delimiter_bytes_round_trips_exactly() {
    let server = MockServer::start().await;
    let client = Client::connect(&server.url(), ClientOptions::new())
        .await
        .expect("connect");

    let mut sub = client.subscribe("binary.subject").await.expect("subscribe");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let payload: Vec<u8> = vec![
        0x01, 0x0A, 0x03, 0x0D, 0x0A, 0x0D, 0x82, 0x01, 0x0A, 0x03, 0x0D, 0x0A, 0x0D, 0x82,
    ];
    client
        .publish("binary.subject", payload.clone())
        .await
        .expect("publish");

    let msg = tokio::time::timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("message arrives")
        .expect("subscription open");
    assert_eq!(msg.payload.as_ref(), payload.as_slice());

    client.close().await;
}

#[tokio::test]
async fn large_payload_round_trips_exactly() {
    let server = MockServer::start().await;
    let client = Client::connect(&server.url(), ClientOptions::new())
        .await
        .expect("connect");

    let mut sub = client.subscribe("large.subject").await.expect("subscribe");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let payload: Vec<u8> = (0..5120u32).map(|i| (i % 256) as u8).collect();
    client
        .publish("large.subject", payload.clone())
        .await
        .expect("publish");

    let msg = tokio::time::timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("message arrives")
        .expect("subscription open");
    assert_eq!(msg.payload.len(), payload.len());
    assert_eq!(msg.payload.as_ref(), payload.as_slice());

    client.close().await;
}
