use std::time::Duration;

use pubsub_client::{Client, ClientOptions};
use pubsub_test_support::MockServer;

#[tokio::test]
async fn request_is_answered_via_inline_respond() {
    let server = MockServer::start().await;
    let responder = Client::connect(&server.url(), ClientOptions::new())
        .await
        .expect("connect responder");
    let requester = Client::connect(&server.url(), ClientOptions::new())
        .await
        .expect("connect requester");

    let mut service = responder
        .subscribe("svc.echo")
        .await
        .expect("subscribe service");

    let responder_task = tokio::spawn(async move {
        let msg = service.next().await.expect("request arrives");
        let mut reply = Vec::from(msg.payload.as_ref());
        reply.extend_from_slice(b"-reply");
        msg.respond(reply).expect("respond");
    });

    // give the responder's SUB time to land on the server before the
    // request's reply-to subscription races it.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let reply = requester
        .request("svc.echo", "ping", Duration::from_secs(2))
        .await
        .expect("request succeeds");
    assert_eq!(reply.payload.as_ref(), b"ping-reply");

    responder_task.await.expect("responder task");
    requester.close().await;
    responder.close().await;
}

#[tokio::test]
async fn request_times_out_when_nobody_answers() {
    let server = MockServer::start().await;
    let requester = Client::connect(&server.url(), ClientOptions::new())
        .await
        .expect("connect");

    let result = requester
        .request("svc.nobody-home", "ping", Duration::from_millis(200))
        .await;
    assert!(result.is_err());

    requester.close().await;
}
