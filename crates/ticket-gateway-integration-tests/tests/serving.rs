//! Integration tests against a real listener

mod common;

use common::{helpdesk_payload, secret_for, stack, HELPDESK_HEADER};
use ticket_gateway_api::serve;
use ticket_gateway_core::signature::sign_payload;
use tokio::sync::oneshot;

#[tokio::test]
async fn test_server_answers_until_shutdown_signal() {
    let s = stack("http://127.0.0.1:1");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve(listener, s.state.clone(), async move {
        let _ = stop_rx.await;
    }));

    let client = reqwest::Client::new();

    let health = client
        .get(format!("http://{}/health", address))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), 200);
    assert!(health.headers().contains_key("x-correlation-id"));

    let body = serde_json::to_vec(&helpdesk_payload("tenant-abc", 7)).unwrap();
    let signature = sign_payload(secret_for("tenant-abc").as_bytes(), &body).unwrap();
    let accepted = client
        .post(format!("http://{}/webhooks/helpdesk", address))
        .header(HELPDESK_HEADER, signature)
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), 202);

    drop(client);
    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
