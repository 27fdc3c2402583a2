//! HTTP portal client.
//!
//! Logs in to the partner portal with a form post and scrapes the order
//! table from the resulting page.
//!
//! Flow per account:
//! 1. `GET {url}` to open a session (cookies are kept per session).
//! 2. `POST {login_url}` with the username/password form fields.
//! 3. Optionally `GET {orders_url}`; otherwise the login response is used.
//! 4. Extract the first `<table>`, skip its header row, tag rows with
//!    the account identifier.
//!
//! The whole sequence runs under `wait_timeout`, which is independent of
//! the retry policy wrapped around it by the aggregator.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

use super::table;
use super::OrderSource;
use crate::config::PortalConfig;
use crate::types::{FetchError, FetchTarget, OrderRecord};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const SOURCE_NAME: &str = "portal";
const USER_AGENT: &str = "TALLY/0.1.0 (order-reconciler)";

/// Longest response body echoed into an error message.
const MAX_ERROR_BODY: usize = 200;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One logged-in browsing session. Owns the HTTP client and its cookie
/// jar; dropping it releases both, whichever way the fetch ended.
struct PortalSession {
    http: Client,
    account: String,
}

impl PortalSession {
    fn open(account: &str, request_timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        debug!(account, "Portal session opened");
        Ok(Self {
            http,
            account: account.to_string(),
        })
    }
}

impl Drop for PortalSession {
    fn drop(&mut self) {
        debug!(account = %self.account, "Portal session closed");
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Scrapes orders from the partner portal over HTTP.
#[derive(Debug, Clone)]
pub struct PortalClient {
    login_url: Option<String>,
    orders_url: Option<String>,
    username_field: String,
    password_field: String,
    wait_timeout: Duration,
    request_timeout: Duration,
}

impl PortalClient {
    pub fn new(wait_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            login_url: None,
            orders_url: None,
            username_field: "email".to_string(),
            password_field: "password".to_string(),
            wait_timeout,
            request_timeout,
        }
    }

    pub fn from_config(cfg: &PortalConfig) -> Self {
        Self {
            login_url: cfg.login_url.clone(),
            orders_url: cfg.orders_url.clone(),
            username_field: cfg.username_field.clone(),
            password_field: cfg.password_field.clone(),
            wait_timeout: cfg.wait_timeout(),
            request_timeout: cfg.request_timeout(),
        }
    }

    pub fn with_login_url(mut self, url: impl Into<String>) -> Self {
        self.login_url = Some(url.into());
        self
    }

    pub fn with_orders_url(mut self, url: impl Into<String>) -> Self {
        self.orders_url = Some(url.into());
        self
    }

    /// Login, render and scrape, without the outer timeout.
    async fn scrape(
        &self,
        session: &PortalSession,
        target: &FetchTarget,
    ) -> Result<Vec<OrderRecord>, FetchError> {
        let account = target.account();

        let landing = session.http.get(&target.endpoint).send().await?;
        ensure_success(landing).await?;

        let login_url = self.login_url.as_deref().unwrap_or(&target.endpoint);
        let form = [
            (self.username_field.as_str(), account),
            (self.password_field.as_str(), target.credential.secret()),
        ];
        let login = session.http.post(login_url).form(&form).send().await?;

        let status = login.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Auth {
                account: account.to_string(),
                status: status.as_u16(),
            });
        }
        let login = ensure_success(login).await?;

        let page = match &self.orders_url {
            Some(url) => {
                let resp = session.http.get(url).send().await?;
                ensure_success(resp).await?.text().await?
            }
            None => login.text().await?,
        };

        let rows = table::extract_rows(&page).ok_or(FetchError::TableNotFound)?;
        let orders: Vec<OrderRecord> = rows
            .into_iter()
            .map(|cells| OrderRecord::new(cells, account))
            .collect();

        Ok(orders)
    }
}

/// Pass through a 2xx response, turn anything else into `FetchError::Status`.
async fn ensure_success(resp: Response) -> Result<Response, FetchError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let mut body = resp.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(FetchError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl OrderSource for PortalClient {
    async fn fetch_orders(&self, target: &FetchTarget) -> Result<Vec<OrderRecord>, FetchError> {
        let account = target.account();
        debug!(account, endpoint = %target.endpoint, "Fetching orders");

        let session = PortalSession::open(account, self.request_timeout)?;
        let orders = tokio::time::timeout(self.wait_timeout, self.scrape(&session, target))
            .await
            .map_err(|_| FetchError::Timeout(self.wait_timeout))??;
        drop(session);

        info!(account, count = orders.len(), "Fetched orders");
        Ok(orders)
    }

    fn name(&self) -> &'static str {
        SOURCE_NAME
    }
}
