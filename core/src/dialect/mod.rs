//! # Dialect Adapters
//!
//! Geth and Parity expose the same information through different admin
//! methods. Each dialect implements [`Dialect`] — a small capability set
//! (promote a stub, list peers, sample the txpool, sample the block
//! number) — and discovery picks the adapter by prefix-matching the
//! client-version string. A new dialect plugs in by implementing the trait
//! and claiming its prefix in [`select`].

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::node::{BlockSample, NetworkAddress, NodeIdentity, TxpoolSample};
use crate::rpc::caller::{CallData, RpcCaller};
use crate::rpc::codec::ParsedResult;

pub mod geth;
pub mod parity;

pub use geth::GethDialect;
pub use parity::ParityDialect;

// ---------------------------------------------------------------------------
// Capability types
// ---------------------------------------------------------------------------

/// What promoting a stub yields: the node's self-reported identity plus
/// naming material.
#[derive(Debug, Clone)]
pub struct NodeFacts {
    pub identity: NodeIdentity,
    /// Version-shaped name for Geth, operator-assigned nickname for Parity.
    pub name: String,
    /// The advertised enode URL, when the dialect exposes one.
    pub enode: Option<String>,
}

/// One entry of a peer list, reduced to what the model needs.
#[derive(Debug, Clone)]
pub struct PeerObservation {
    pub identity: NodeIdentity,
    /// Remote endpoint with the P2P port stripped; absent when the node
    /// did not report one.
    pub remote_host: Option<NetworkAddress>,
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// The trait
// ---------------------------------------------------------------------------

/// The capability set both dialects provide.
#[async_trait]
pub trait Dialect: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Fills in identity, name and enode for the node at `address`.
    async fn node_facts(&self, caller: &RpcCaller, address: &NetworkAddress) -> Result<NodeFacts>;

    /// The node's current peer list.
    async fn peers(
        &self,
        caller: &RpcCaller,
        address: &NetworkAddress,
    ) -> Result<Vec<PeerObservation>>;

    /// A txpool snapshot.
    async fn txpool(&self, caller: &RpcCaller, address: &NetworkAddress) -> Result<TxpoolSample>;

    /// A block-number sample. `eth_blockNumber` is the one method both
    /// dialects agree on.
    async fn block_number(
        &self,
        caller: &RpcCaller,
        address: &NetworkAddress,
    ) -> Result<BlockSample> {
        match invoke(caller, address, "eth_blockNumber", vec![]).await?.result {
            Some(ParsedResult::BlockNumber(sample)) => Ok(sample),
            _ => Err(shape_error("eth_blockNumber")),
        }
    }
}

/// Picks the adapter for a client-version string.
///
/// Unrecognized prefixes (`pantheon`, exotic forks) are reported as
/// [`Error::UnsupportedDialect`]; the crawl keeps the node at
/// client-version-known and moves on.
pub fn select(client_version: &str) -> Result<&'static dyn Dialect> {
    static GETH: GethDialect = GethDialect;
    static PARITY: ParityDialect = ParityDialect;

    let prefix = client_version.split('/').next().unwrap_or(client_version);
    if prefix.starts_with("Geth") {
        Ok(&GETH)
    } else if prefix.starts_with("Parity") {
        Ok(&PARITY)
    } else {
        Err(Error::UnsupportedDialect(prefix.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Shared plumbing
// ---------------------------------------------------------------------------

/// One typed call: dial, then insist on a parsed result. An RPC error
/// object or an unexpected shape is an error here — the capability methods
/// have nothing useful to return without the typed value.
pub(crate) async fn invoke(
    caller: &RpcCaller,
    address: &NetworkAddress,
    method: &str,
    params: Vec<Value>,
) -> Result<CallData> {
    let mut data = CallData::new(method, address.clone()).with_params(params);
    caller.call(&mut data).await?;
    if !data.parsed {
        if let Some(err) = data.rpc_error() {
            return Err(Error::Rpc {
                code: err.code,
                message: err.message.clone(),
            });
        }
        return Err(shape_error(method));
    }
    Ok(data)
}

pub(crate) fn shape_error(method: &str) -> Error {
    Error::Decode {
        method: method.to_string(),
        detail: "unexpected result shape".to_string(),
    }
}

/// Maps a decoded peer list into observations, dropping entries without an
/// identity (nothing to key them on) and empty remote endpoints.
pub(crate) fn observations(peers: Vec<crate::rpc::codec::PeerInfoResult>) -> Vec<PeerObservation> {
    peers
        .into_iter()
        .filter(|p| !p.id.is_empty())
        .map(|p| {
            let remote_host = if p.network.remote_address.is_empty() {
                None
            } else {
                Some(p.remote_host())
            };
            PeerObservation {
                identity: NodeIdentity::new(p.id),
                remote_host,
                name: if p.name.is_empty() { None } else { Some(p.name) },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_by_version_prefix() {
        assert_eq!(select("Geth/miner3/v1.8.2").unwrap().name(), "geth");
        assert_eq!(select("Parity-Ethereum/v2.5.13").unwrap().name(), "parity");
        assert_eq!(select("Parity/v1.11").unwrap().name(), "parity");
    }

    #[test]
    fn unknown_prefix_is_unsupported() {
        let err = select("pantheon/1.0.0").unwrap_err();
        match err {
            Error::UnsupportedDialect(prefix) => assert_eq!(prefix, "pantheon"),
            other => panic!("expected UnsupportedDialect, got {other:?}"),
        }
    }
}
