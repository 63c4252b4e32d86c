//! # RPC Call Path
//!
//! Every outbound JSON-RPC call in the system funnels through
//! [`RpcCaller::call`]: blocked-address refusal, default-port injection,
//! envelope encoding, the transport exchange with its per-call timeout,
//! the UI echo fields, the optional on-disk dump, and finally the codec.
//!
//! The caller itself does no locking beyond short peeks at the shared
//! state (blocked set, default port, unreachable bookkeeping); serializing
//! whole operations is the monitor's job through its operation gate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::DEFAULT_CALL_TIMEOUT;
use crate::error::{Error, Result};
use crate::model::node::NetworkAddress;
use crate::monitor::SharedState;
use crate::rpc::codec::{self, ParsedResult, RpcCommand, RpcEnvelope, RpcErrorObject};
use crate::transport::{Clock, ConfigStore, OutboundRequest, Transport};

// ---------------------------------------------------------------------------
// Call data
// ---------------------------------------------------------------------------

/// Everything one call carries in and out: the method, parameters and
/// target on the way out; raw request/response text for the UI echo and
/// the typed result on the way back.
#[derive(Debug)]
pub struct CallData {
    /// Canonical method name.
    pub method: String,
    /// Positional parameters.
    pub params: Vec<Value>,
    /// Target address, port optional.
    pub target: NetworkAddress,
    /// Request path that triggered this call, for the UI echo.
    pub request_path: String,
    /// Skip typed decoding; the envelope is wanted verbatim.
    pub raw_mode: bool,
    /// Outbound envelope, indented, for the UI echo.
    pub json_request: String,
    /// Response body, indented, for the UI echo.
    pub json_response: String,
    /// Decoded envelope, once the exchange completed.
    pub response: Option<RpcEnvelope>,
    /// Whether `result` was dispatched into a typed shape.
    pub parsed: bool,
    /// The typed shape, when `parsed`.
    pub result: Option<ParsedResult>,
}

impl CallData {
    pub fn new(method: impl Into<String>, target: NetworkAddress) -> Self {
        Self {
            method: method.into(),
            params: Vec::new(),
            target,
            request_path: String::new(),
            raw_mode: false,
            json_request: String::new(),
            json_response: String::new(),
            response: None,
            parsed: false,
            result: None,
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    /// The protocol-level error, if the node answered with one.
    pub fn rpc_error(&self) -> Option<&RpcErrorObject> {
        self.response.as_ref().and_then(|r| r.error.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Caller
// ---------------------------------------------------------------------------

/// The single call path. One per monitor; shared by discovery, sampling,
/// the watchdog and the command surface.
pub struct RpcCaller {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    state: SharedState,
    user_agent: String,
    timeout: Duration,
    seq: AtomicU64,
    dump_store: Option<Arc<dyn ConfigStore>>,
}

impl RpcCaller {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        state: SharedState,
        user_agent: String,
        dump_store: Option<Arc<dyn ConfigStore>>,
    ) -> Self {
        Self {
            transport,
            clock,
            state,
            user_agent,
            timeout: DEFAULT_CALL_TIMEOUT,
            seq: AtomicU64::new(0),
            dump_store,
        }
    }

    /// Issues one call, filling the out-fields of `data`.
    ///
    /// Transport-class failures (dial, timeout, non-200) record the target
    /// in the unreachable-address set before propagating. A response whose
    /// envelope carries an `error` object returns `Ok` with
    /// `data.parsed == false` — the node answered; it just said no.
    pub async fn call(&self, data: &mut CallData) -> Result<()> {
        let target = {
            let state = self.state.lock();
            if state.model.blocked_addresses.contains(&data.target) {
                tracing::debug!(target = %data.target, "refusing call to blocked address");
                return Err(Error::BlockedAddress(data.target.to_string()));
            }
            data.target.with_default_port(state.model.default_rpc_port)
        };

        let command = RpcCommand::new(
            data.method.clone(),
            data.params.clone(),
            self.seq.fetch_add(1, Ordering::SeqCst),
        );
        let body = serde_json::to_string(&command).map_err(|e| Error::Decode {
            method: data.method.clone(),
            detail: e.to_string(),
        })?;
        data.json_request =
            serde_json::to_string_pretty(&command).unwrap_or_else(|_| body.clone());

        let request = OutboundRequest {
            url: format!("http://{target}/"),
            body,
            user_agent: self.user_agent.clone(),
            timeout: self.timeout,
        };

        tracing::debug!(method = %data.method, url = %request.url, "rpc call");
        let reply = match self.transport.execute(&request).await {
            Ok(reply) => reply,
            Err(err) => {
                self.record_failure(&data.target);
                return Err(err);
            }
        };

        if !reply.is_ok() {
            self.record_failure(&data.target);
            return Err(Error::HttpStatus {
                address: target.to_string(),
                status: reply.status_line,
            });
        }

        data.json_response = match serde_json::from_str::<Value>(&reply.body) {
            Ok(v) => serde_json::to_string_pretty(&v).unwrap_or_else(|_| reply.body.clone()),
            Err(_) => reply.body.clone(),
        };

        if let Some(store) = &self.dump_store {
            let name = format!("{}_{}.json", target.host(), data.method);
            if let Err(err) = store.save(&name, reply.body.as_bytes()) {
                tracing::warn!(dump = %name, "failed to dump rpc response: {err}");
            }
        }

        let decoded = codec::decode(&reply.body, &data.method, data.raw_mode, self.clock.as_ref())?;
        data.response = Some(decoded.envelope);
        data.parsed = decoded.parsed;
        data.result = decoded.result;
        Ok(())
    }

    fn record_failure(&self, address: &NetworkAddress) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.model.mark_address_unreachable(address, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::monitor::ModelState;
    use crate::transport::{MemoryStore, SystemClock};

    fn shared_state() -> SharedState {
        Arc::new(parking_lot::Mutex::new(ModelState::new(
            NetworkAddress::new("10.0.0.1:8545"),
            8545,
        )))
    }

    fn caller_with(
        transport: Arc<MockTransport>,
        state: SharedState,
        dump: Option<Arc<dyn ConfigStore>>,
    ) -> RpcCaller {
        RpcCaller::new(
            transport,
            Arc::new(SystemClock),
            state,
            "chainwatch/test".into(),
            dump,
        )
    }

    #[tokio::test]
    async fn default_port_is_injected_into_the_url() {
        let transport = Arc::new(MockTransport::new());
        transport.insert("10.0.0.1", "net_version", r#"{"id":0,"jsonrpc":"2.0","result":"5"}"#);
        let caller = caller_with(Arc::clone(&transport), shared_state(), None);

        let mut bare = CallData::new("net_version", NetworkAddress::new("10.0.0.1"));
        caller.call(&mut bare).await.unwrap();
        let mut with_port = CallData::new("net_version", NetworkAddress::new("10.0.0.1:8545"));
        caller.call(&mut with_port).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls[0].url, "http://10.0.0.1:8545/");
        assert_eq!(calls[0].url, calls[1].url);
    }

    #[tokio::test]
    async fn blocked_address_fails_without_a_connection() {
        let transport = Arc::new(MockTransport::new());
        let state = shared_state();
        state
            .lock()
            .model
            .blocked_addresses
            .insert(NetworkAddress::new("10.0.0.9"));
        let caller = caller_with(Arc::clone(&transport), state, None);

        let mut data = CallData::new("eth_blockNumber", NetworkAddress::new("10.0.0.9"));
        let err = caller.call(&mut data).await.unwrap_err();
        assert!(matches!(err, Error::BlockedAddress(_)));
        assert!(transport.calls().is_empty(), "no connection may be opened");
    }

    #[tokio::test]
    async fn missing_mock_counts_as_transport_failure() {
        let transport = Arc::new(MockTransport::new());
        let state = shared_state();
        let caller = caller_with(Arc::clone(&transport), Arc::clone(&state), None);

        let mut data = CallData::new("eth_blockNumber", NetworkAddress::new("10.0.0.5"));
        let err = caller.call(&mut data).await.unwrap_err();
        assert!(err.is_transport());

        let st = state.lock();
        assert!(st
            .model
            .unreachable_addresses
            .contains_key(&NetworkAddress::new("10.0.0.5")));
    }

    #[tokio::test]
    async fn response_bodies_are_dumped_per_host_and_method() {
        let transport = Arc::new(MockTransport::new());
        transport.insert("10.0.0.1", "net_version", r#"{"id":0,"jsonrpc":"2.0","result":"5"}"#);
        let dump = Arc::new(MemoryStore::new());
        let caller = caller_with(
            Arc::clone(&transport),
            shared_state(),
            Some(Arc::clone(&dump) as Arc<dyn ConfigStore>),
        );

        let mut data = CallData::new("net_version", NetworkAddress::new("10.0.0.1"));
        caller.call(&mut data).await.unwrap();

        assert_eq!(dump.names(), vec!["10.0.0.1_net_version.json".to_string()]);
    }

    #[tokio::test]
    async fn protocol_error_returns_ok_unparsed() {
        let transport = Arc::new(MockTransport::new());
        transport.insert(
            "10.0.0.1",
            "admin_peers",
            r#"{"id":0,"jsonrpc":"2.0","error":{"code":-32601,"message":"not supported"}}"#,
        );
        let state = shared_state();
        let caller = caller_with(Arc::clone(&transport), Arc::clone(&state), None);

        let mut data = CallData::new("admin_peers", NetworkAddress::new("10.0.0.1"));
        caller.call(&mut data).await.unwrap();
        assert!(!data.parsed);
        assert_eq!(data.rpc_error().unwrap().code, -32601);

        // A node that answers with an error is not unreachable.
        assert!(state.lock().model.unreachable_addresses.is_empty());
    }

    #[tokio::test]
    async fn ids_increase_monotonically() {
        let transport = Arc::new(MockTransport::new());
        transport.insert("10.0.0.1", "net_version", r#"{"id":0,"jsonrpc":"2.0","result":"5"}"#);
        let caller = caller_with(Arc::clone(&transport), shared_state(), None);

        for expected in 0..3u64 {
            let mut data = CallData::new("net_version", NetworkAddress::new("10.0.0.1"));
            caller.call(&mut data).await.unwrap();
            let sent: Value = serde_json::from_str(&data.json_request).unwrap();
            assert_eq!(sent["id"].as_u64(), Some(expected));
        }
    }
}
