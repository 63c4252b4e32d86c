//! # Outbound HTTP Transport
//!
//! The production [`Transport`]: a shared `reqwest` client posting JSON-RPC
//! envelopes with the per-call deadline the caller hands over. Connection
//! failures and missed deadlines both surface as `Unreachable` — from the
//! model's point of view a node that cannot answer in time is not there.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};

use chainwatch::transport::{OutboundRequest, OutboundResponse, Transport};
use chainwatch::{Error, Result};

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds the shared client. No client-level timeout — the deadline
    /// comes with each request.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| Error::Store(format!("cannot build http client: {err}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &OutboundRequest) -> Result<OutboundResponse> {
        let response = self
            .client
            .post(&request.url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, &request.user_agent)
            .timeout(request.timeout)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|err| Error::Unreachable {
                address: request.url.clone(),
                reason: reason_of(&err),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| Error::Unreachable {
            address: request.url.clone(),
            reason: format!("reading body: {err}"),
        })?;

        Ok(OutboundResponse {
            status: status.as_u16(),
            status_line: status.to_string(),
            body,
        })
    }
}

fn reason_of(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "timeout".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        err.to_string()
    }
}
