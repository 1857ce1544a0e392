use std::time::Duration;

use pubsub_client::{Client, ClientOptions, ConnectionStatus};
use pubsub_test_support::MockServer;

#[tokio::test]
async fn connect_then_close_reaches_connected_then_closed() {
    let server = MockServer::start().await;
    let client = Client::connect(
        &server.url(),
        ClientOptions::new().retry_count(3),
    )
    .await
    .expect("connect");

    assert_eq!(client.status(), ConnectionStatus::Connected);

    let mut stream = client.status_stream();
    client.close().await;
    stream.wait_until(ConnectionStatus::Closed).await;
    assert_eq!(client.status(), ConnectionStatus::Closed);
}

#[tokio::test]
async fn transport_loss_triggers_reconnect_back_to_connected() {
    let server = MockServer::start().await;
    let client = Client::connect(
        &server.url(),
        ClientOptions::new()
            .retry_count(-1)
            .retry_interval(Duration::from_millis(20))
            .connect_timeout(Duration::from_secs(1)),
    )
    .await
    .expect("connect");

    let mut stream = client.status_stream();
    assert_eq!(stream.current(), ConnectionStatus::Connected);

    server.disconnect_all().await;

    // The actor should observe the transport loss, cycle through
    // Disconnected/Reconnecting, and land back on Connected once the
    // still-listening mock server accepts the new socket.
    let mut saw_disconnected = false;
    loop {
        let status = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("status transition within timeout");
        if matches!(status, ConnectionStatus::Disconnected | ConnectionStatus::Reconnecting) {
            saw_disconnected = true;
        }
        if status == ConnectionStatus::Connected && saw_disconnected {
            break;
        }
    }

    client.close().await;
}

#[tokio::test]
async fn unreachable_server_exhausts_retries_and_closes() {
    // Nothing listens on this port.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = Client::connect(
        &format!("nats://{addr}"),
        ClientOptions::new()
            .retry_count(2)
            .retry_interval(Duration::from_millis(10))
            .connect_timeout(Duration::from_millis(200)),
    )
    .await;

    assert!(result.is_err());
}
