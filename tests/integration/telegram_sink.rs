use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tally::notify::telegram::TelegramSink;
use tally::notify::NotificationSink;
use tally::types::NotifyError;

fn sink(server: &MockServer) -> TelegramSink {
    TelegramSink::new("123:abc".into(), Some(server.uri())).unwrap()
}

#[tokio::test]
async fn test_send_message_posts_chat_and_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_json(json!({ "chat_id": "-10042", "text": "hello" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
        .expect(1)
        .mount(&server)
        .await;

    sink(&server).deliver("-10042", "hello").await.unwrap();
}

#[tokio::test]
async fn test_ok_false_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "description": "Bad Request: chat not found"
        })))
        .mount(&server)
        .await;

    let err = sink(&server).deliver("1", "x").await.unwrap_err();
    match err {
        NotifyError::Rejected(desc) => assert_eq!(desc, "Bad Request: chat not found"),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_http_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let err = sink(&server).deliver("1", "x").await.unwrap_err();
    assert!(matches!(err, NotifyError::Status { status: 401, .. }));
}
