//! # Replay Transport
//!
//! A [`Transport`] that answers from canned bodies instead of the network,
//! keyed by `{host}_{method}` — the host taken from the URL, the method
//! read back out of the outbound envelope. Fixtures come from a directory
//! of `{host}_{method}.json` files (offline/mock mode) or are injected
//! programmatically by tests.
//!
//! A key with no fixture answers HTTP 404, which the call path classifies
//! as a transport failure — convenient for simulating dead nodes.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::transport::{OutboundRequest, OutboundResponse, Transport};

/// One recorded exchange, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub host: String,
    pub method: String,
    pub url: String,
    pub body: String,
}

/// The replay transport.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<BTreeMap<String, VecDeque<String>>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `*.json` file in `dir`; the file stem is the
    /// `{host}_{method}` key. Unreadable files are skipped with a warning.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let transport = Self::new();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| Error::Store(format!("cannot read mock dir {}: {e}", dir.display())))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match std::fs::read_to_string(&path) {
                Ok(body) => {
                    tracing::debug!(key, "loaded mock response");
                    transport
                        .responses
                        .lock()
                        .insert(key.to_string(), VecDeque::from([body]));
                }
                Err(err) => {
                    tracing::warn!(file = %path.display(), "skipping unreadable mock: {err}");
                }
            }
        }
        Ok(transport)
    }

    /// Sets the (only) response for a host/method pair, replacing any queue.
    pub fn insert(&self, host: &str, method: &str, body: &str) {
        self.responses
            .lock()
            .insert(key(host, method), VecDeque::from([body.to_string()]));
    }

    /// Appends a response to the queue for a host/method pair. Queued
    /// responses are consumed in order; the last one repeats forever.
    pub fn enqueue(&self, host: &str, method: &str, body: &str) {
        self.responses
            .lock()
            .entry(key(host, method))
            .or_default()
            .push_back(body.to_string());
    }

    /// Drops all fixtures for a host/method pair, so further calls 404.
    pub fn remove(&self, host: &str, method: &str) {
        self.responses.lock().remove(&key(host, method));
    }

    /// Every exchange attempted so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Number of exchanges attempted for one host/method pair.
    pub fn call_count(&self, host: &str, method: &str) -> usize {
        let wanted = key(host, method);
        self.calls
            .lock()
            .iter()
            .filter(|c| key(&c.host, &c.method) == wanted)
            .count()
    }
}

fn key(host: &str, method: &str) -> String {
    format!("{host}_{method}")
}

/// Host part of a `http://host:port/` URL.
fn host_of(url: &str) -> String {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .unwrap_or(url);
    let authority = rest.split('/').next().unwrap_or(rest);
    match authority.rfind(':') {
        Some(i) => authority[..i].to_string(),
        None => authority.to_string(),
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: &OutboundRequest) -> Result<OutboundResponse> {
        let host = host_of(&request.url);
        let method = serde_json::from_str::<serde_json::Value>(&request.body)
            .ok()
            .and_then(|v| v["method"].as_str().map(str::to_string))
            .unwrap_or_default();
        let lookup = key(&host, &method);

        self.calls.lock().push(MockCall {
            host,
            method,
            url: request.url.clone(),
            body: request.body.clone(),
        });

        let mut responses = self.responses.lock();
        match responses.get_mut(&lookup) {
            Some(queue) => {
                let body = if queue.len() > 1 {
                    queue.pop_front().unwrap_or_default()
                } else {
                    queue.front().cloned().unwrap_or_default()
                };
                Ok(OutboundResponse {
                    status: 200,
                    status_line: "200 Mockup successful".to_string(),
                    body,
                })
            }
            None => Ok(OutboundResponse {
                status: 404,
                status_line: format!("404 No mockup for {lookup}"),
                body: String::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(url: &str, method: &str) -> OutboundRequest {
        OutboundRequest {
            url: url.to_string(),
            body: format!(r#"{{"jsonrpc":"2.0","method":"{method}","params":[],"id":0}}"#),
            user_agent: "chainwatch/test".to_string(),
            timeout: Duration::from_secs(3),
        }
    }

    #[tokio::test]
    async fn answers_by_host_and_method() {
        let mock = MockTransport::new();
        mock.insert("10.0.0.1", "net_version", r#"{"result":"5"}"#);

        let reply = mock
            .execute(&request("http://10.0.0.1:8545/", "net_version"))
            .await
            .unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, r#"{"result":"5"}"#);

        let miss = mock
            .execute(&request("http://10.0.0.2:8545/", "net_version"))
            .await
            .unwrap();
        assert_eq!(miss.status, 404);
    }

    #[tokio::test]
    async fn queued_responses_play_in_order_and_last_repeats() {
        let mock = MockTransport::new();
        mock.enqueue("10.0.0.1", "eth_blockNumber", "first");
        mock.enqueue("10.0.0.1", "eth_blockNumber", "second");

        let req = request("http://10.0.0.1:8545/", "eth_blockNumber");
        assert_eq!(mock.execute(&req).await.unwrap().body, "first");
        assert_eq!(mock.execute(&req).await.unwrap().body, "second");
        assert_eq!(mock.execute(&req).await.unwrap().body, "second");
    }

    #[tokio::test]
    async fn records_calls() {
        let mock = MockTransport::new();
        mock.insert("10.0.0.1", "net_version", "{}");
        let _ = mock
            .execute(&request("http://10.0.0.1:8545/", "net_version"))
            .await;

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].host, "10.0.0.1");
        assert_eq!(calls[0].method, "net_version");
        assert_eq!(mock.call_count("10.0.0.1", "net_version"), 1);
    }

    #[test]
    fn loads_fixtures_from_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("10.0.0.1_admin_nodeInfo.json"),
            r#"{"result":{"id":"aa"}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mock = MockTransport::from_dir(dir.path()).unwrap();
        assert!(mock
            .responses
            .lock()
            .contains_key("10.0.0.1_admin_nodeInfo"));
        assert_eq!(mock.responses.lock().len(), 1);
    }
}
