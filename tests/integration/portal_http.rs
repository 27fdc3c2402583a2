use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tally::portal::http::PortalClient;
use tally::portal::OrderSource;
use tally::types::{AccountCredential, FetchError, FetchTarget};

const ORDERS_PAGE: &str = r#"
<html><body>
  <h1>Orders</h1>
  <table id="orders">
    <tr><th>Order</th><th>Status</th><th>Amount</th></tr>
    <tr><td>A-1001</td><td>Delivered</td><td>$ 120.00</td></tr>
    <tr><td>A-1002</td><td>Delivered</td><td>$ 85.50</td></tr>
  </table>
  <table><tr><td>footer</td></tr></table>
</body></html>
"#;

fn client() -> PortalClient {
    PortalClient::new(Duration::from_secs(5), Duration::from_secs(5))
}

fn target(server: &MockServer, account: &str, secret: &str) -> FetchTarget {
    FetchTarget::new(AccountCredential::new(account, secret), server.uri())
}

async fn mount_landing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<form></form>"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_and_scrape_first_table() {
    let server = MockServer::start().await;
    mount_landing(&server).await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string_contains("email=a%40example.com"))
        .and(body_string_contains("password=s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ORDERS_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let orders = client()
        .fetch_orders(&target(&server, "a@example.com", "s3cret"))
        .await
        .unwrap();

    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].cells(), ["A-1001", "Delivered", "$ 120.00"]);
    assert_eq!(orders[1].account(), "a@example.com");
    assert_eq!(orders[1].amount(2).unwrap().to_string(), "85.50");
}

#[tokio::test]
async fn test_separate_login_and_orders_pages() {
    let server = MockServer::start().await;
    mount_landing(&server).await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>Welcome</p>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ORDERS_PAGE))
        .mount(&server)
        .await;

    let orders = client()
        .with_login_url(format!("{}/session", server.uri()))
        .with_orders_url(format!("{}/orders", server.uri()))
        .fetch_orders(&target(&server, "b@example.com", "pw"))
        .await
        .unwrap();

    assert_eq!(orders.len(), 2);
}

#[tokio::test]
async fn test_rejected_login_is_auth_error() {
    let server = MockServer::start().await;
    mount_landing(&server).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client()
        .fetch_orders(&target(&server, "a@example.com", "wrong"))
        .await
        .unwrap_err();

    match err {
        FetchError::Auth { account, status } => {
            assert_eq!(account, "a@example.com");
            assert_eq!(status, 401);
        }
        other => panic!("expected auth error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_page_without_table() {
    let server = MockServer::start().await;
    mount_landing(&server).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>Maintenance</p>"))
        .mount(&server)
        .await;

    let err = client()
        .fetch_orders(&target(&server, "a@example.com", "pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::TableNotFound));
}

#[tokio::test]
async fn test_server_error_carries_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down for maintenance"))
        .mount(&server)
        .await;

    let err = client()
        .fetch_orders(&target(&server, "a@example.com", "pw"))
        .await
        .unwrap_err();
    match err {
        FetchError::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "down for maintenance");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_page_hits_wait_timeout() {
    let server = MockServer::start().await;
    mount_landing(&server).await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(ORDERS_PAGE)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let wait = Duration::from_millis(200);
    let err = PortalClient::new(wait, Duration::from_secs(10))
        .fetch_orders(&target(&server, "a@example.com", "pw"))
        .await
        .unwrap_err();
    match err {
        FetchError::Timeout(d) => assert_eq!(d, wait),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_pipeline_from_config_against_portal() {
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tally::config::AppConfig;
    use tally::engine::pipeline::Pipeline;

    use crate::common::RecordingSink;

    let server = MockServer::start().await;
    mount_landing(&server).await;
    Mock::given(method("POST"))
        .and(body_string_contains("email=good%40example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ORDERS_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("email=bad%40example.com"))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&server)
        .await;

    let toml = format!(
        r#"
        [[accounts]]
        identifier = "good@example.com"
        secret = "pw"

        [[accounts]]
        identifier = "bad@example.com"
        secret = "pw"

        [portal]
        url = "{}"
        wait_timeout_secs = 5

        [retry]
        max_attempts = 2
        delay_ms = 10

        [revenue]
        mode = "amount_column"
        amount_column = 2
        "#,
        server.uri()
    );
    let cfg = AppConfig::from_toml(&toml).unwrap();

    let sink = RecordingSink::new();
    let pipeline = Pipeline::from_config(
        &cfg,
        Arc::new(PortalClient::from_config(&cfg.portal)),
        Arc::new(sink.clone()),
        "chat",
    )
    .unwrap();

    let report = pipeline.run().await.report().cloned().unwrap();
    assert_eq!(report.order_count, 2);
    assert_eq!(report.computed_total, dec!(205.50));
    assert_eq!(report.failed_accounts.len(), 1);
    assert_eq!(report.failed_accounts[0].account, "bad@example.com");
    assert_eq!(sink.messages().len(), 1);
}
