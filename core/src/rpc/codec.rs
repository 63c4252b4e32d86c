//! # Wire Codec
//!
//! Outbound calls are `{jsonrpc:"2.0", method, params, id}` envelopes with
//! an id drawn from the caller's monotonic counter. Inbound responses are
//! decoded in two steps: the envelope first, with `result` kept opaque,
//! then a dispatch on the method name into a typed [`ParsedResult`].
//!
//! Shapes that represent an observation (block number, txpool status) are
//! stamped with the clock exactly once, at decode time — the instant the
//! answer was in hand, not the instant someone got around to storing it.
//!
//! An `error` object in the envelope is not a transport failure. The
//! decode returns normally with nothing parsed; whoever needed a typed
//! result decides how much to care.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::node::{BlockSample, NetworkAddress, TxpoolSample};
use crate::transport::Clock;

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// An outbound JSON-RPC 2.0 call.
#[derive(Debug, Clone, Serialize)]
pub struct RpcCommand {
    /// Always "2.0".
    pub jsonrpc: &'static str,
    /// Canonical method name.
    pub method: String,
    /// Positional parameters.
    pub params: Vec<Value>,
    /// Sequence number minted by the caller.
    pub id: u64,
}

impl RpcCommand {
    pub fn new(method: impl Into<String>, params: Vec<Value>, id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
            id,
        }
    }
}

/// An inbound JSON-RPC 2.0 response, `result` left opaque.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcEnvelope {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

/// The `error` member of a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

// ---------------------------------------------------------------------------
// Typed result shapes
// ---------------------------------------------------------------------------

/// `admin_nodeInfo` result, as the Geth admin API ships it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeInfoResult {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub enode: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub ports: NodePorts,
    #[serde(default, rename = "listenAddr")]
    pub listen_addr: String,
    #[serde(default)]
    pub protocols: Value,
}

/// Listener ports from `admin_nodeInfo`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NodePorts {
    #[serde(default)]
    pub discovery: u32,
    #[serde(default)]
    pub listener: u32,
}

/// One entry of an `admin_peers` / `parity_netPeers` peer list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerInfoResult {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub caps: Vec<String>,
    #[serde(default)]
    pub network: PeerNetworkInfo,
    #[serde(default)]
    pub protocols: Value,
}

impl PeerInfoResult {
    /// The peer's remote endpoint with the P2P port stripped — the host we
    /// would dial RPC on.
    pub fn remote_host(&self) -> NetworkAddress {
        NetworkAddress::new(self.network.remote_address.as_str()).stripped()
    }
}

/// The `network` member of a peer record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerNetworkInfo {
    #[serde(default, rename = "localAddress")]
    pub local_address: String,
    #[serde(default, rename = "remoteAddress")]
    pub remote_address: String,
}

/// `parity_netPeers` result: counters plus the peer list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParityNetPeersResult {
    #[serde(default)]
    pub active: u64,
    #[serde(default)]
    pub connected: u64,
    #[serde(default)]
    pub max: u64,
    #[serde(default)]
    pub peers: Vec<PeerInfoResult>,
}

/// A `result` field dispatched to its typed shape.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ParsedResult {
    /// All the single-string results fall here.
    Text(String),
    NodeInfo(NodeInfoResult),
    Peers(Vec<PeerInfoResult>),
    ParityPeers(ParityNetPeersResult),
    BlockNumber(BlockSample),
    Txpool(TxpoolSample),
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Outcome of decoding one response body.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub envelope: RpcEnvelope,
    /// Whether `result` was dispatched into a typed shape.
    pub parsed: bool,
    pub result: Option<ParsedResult>,
}

/// Decodes a response body for the given (canonical) method.
///
/// `raw` skips the typed dispatch — the UI echo path wants the envelope
/// untouched. Methods absent from the dispatch table decode the envelope
/// only; that is not an error.
pub fn decode(body: &str, method: &str, raw: bool, clock: &dyn Clock) -> Result<Decoded> {
    let envelope: RpcEnvelope = serde_json::from_str(body).map_err(|e| Error::Decode {
        method: method.to_string(),
        detail: e.to_string(),
    })?;

    if raw || envelope.error.is_some() {
        return Ok(Decoded {
            envelope,
            parsed: false,
            result: None,
        });
    }

    let raw_result = match envelope.result.clone() {
        Some(v) => v,
        None => {
            return Ok(Decoded {
                envelope,
                parsed: false,
                result: None,
            })
        }
    };

    let result = match method {
        "net_version" | "admin_datadir" | "web3_clientVersion" | "parity_nodeName"
        | "parity_enode" => Some(ParsedResult::Text(shape(method, raw_result)?)),
        "admin_nodeInfo" => Some(ParsedResult::NodeInfo(shape(method, raw_result)?)),
        "admin_peers" => Some(ParsedResult::Peers(shape(method, raw_result)?)),
        "parity_netPeers" => Some(ParsedResult::ParityPeers(shape(method, raw_result)?)),
        "eth_blockNumber" => {
            let number = parse_quantity(&raw_result).ok_or_else(|| Error::Decode {
                method: method.to_string(),
                detail: format!("not a block quantity: {raw_result}"),
            })?;
            Some(ParsedResult::BlockNumber(BlockSample {
                number,
                sampled_at: clock.now(),
            }))
        }
        "txpool_status" => {
            let raw: TxpoolStatusRaw = shape(method, raw_result)?;
            Some(ParsedResult::Txpool(TxpoolSample {
                pending: parse_quantity(&raw.pending).ok_or_else(|| Error::Decode {
                    method: method.to_string(),
                    detail: "unparseable pending count".into(),
                })?,
                queued: parse_quantity(&raw.queued).unwrap_or(0),
                sampled_at: clock.now(),
            }))
        }
        "parity_pendingTransactions" => {
            let list = raw_result.as_array().ok_or_else(|| Error::Decode {
                method: method.to_string(),
                detail: "expected an array of pending transactions".into(),
            })?;
            Some(ParsedResult::Txpool(TxpoolSample {
                pending: list.len() as u64,
                queued: 0,
                sampled_at: clock.now(),
            }))
        }
        _ => None,
    };

    Ok(Decoded {
        parsed: result.is_some(),
        result,
        envelope,
    })
}

/// `txpool_status` fields arrive as hex strings from Geth and as numbers
/// from friendlier nodes; keep them opaque until [`parse_quantity`].
#[derive(Debug, Deserialize)]
struct TxpoolStatusRaw {
    #[serde(default)]
    pending: Value,
    #[serde(default)]
    queued: Value,
}

fn shape<T: DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Decode {
        method: method.to_string(),
        detail: e.to_string(),
    })
}

/// An Ethereum quantity: `"0x11"`, `"17"`, or a plain JSON number.
pub fn parse_quantity(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            }
        }
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}
