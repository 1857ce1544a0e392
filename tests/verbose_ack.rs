use std::time::Duration;

use pubsub_client::{Client, ClientOptions};
use pubsub_test_support::MockServer;

#[tokio::test]
async fn verbose_connect_completes_without_hanging() {
    let server = MockServer::start().await;
    let client = tokio::time::timeout(
        Duration::from_secs(2),
        Client::connect(&server.url(), ClientOptions::new().verbose(true)),
    )
    .await
    .expect("connect must not hang on the verbose CONNECT handshake")
    .expect("connect");

    client.close().await;
}

#[tokio::test]
async fn verbose_publish_ack_resolves_without_blocking_other_commands() {
    let server = MockServer::start().await;
    let client = Client::connect(&server.url(), ClientOptions::new().verbose(true))
        .await
        .expect("connect");

    let ack = tokio::time::timeout(Duration::from_secs(2), client.publish("subject1", "hello"))
        .await
        .expect("publish ack must not hang the actor")
        .expect("publish");
    assert!(ack);

    // The actor must still be servicing other commands after a verbose
    // publish round trip rather than being stuck awaiting the ack inline.
    let sub = tokio::time::timeout(Duration::from_secs(2), client.subscribe("subject2"))
        .await
        .expect("subsequent command must not hang")
        .expect("subscribe");
    drop(sub);

    client.close().await;
}
