//! # Geth Adapter
//!
//! Geth's admin surface does all the heavy lifting in two calls:
//! `admin_nodeInfo` for identity/name/enode and `admin_peers` for the
//! peer list. Txpool counters come from `txpool_status`.

use async_trait::async_trait;

use crate::dialect::{invoke, observations, shape_error, Dialect, NodeFacts, PeerObservation};
use crate::error::Result;
use crate::model::node::{NetworkAddress, NodeIdentity, TxpoolSample};
use crate::rpc::caller::RpcCaller;
use crate::rpc::codec::ParsedResult;

#[derive(Debug, Default, Clone, Copy)]
pub struct GethDialect;

#[async_trait]
impl Dialect for GethDialect {
    fn name(&self) -> &'static str {
        "geth"
    }

    async fn node_facts(&self, caller: &RpcCaller, address: &NetworkAddress) -> Result<NodeFacts> {
        match invoke(caller, address, "admin_nodeInfo", vec![]).await?.result {
            Some(ParsedResult::NodeInfo(info)) => Ok(NodeFacts {
                identity: NodeIdentity::new(info.id),
                name: info.name,
                enode: if info.enode.is_empty() {
                    None
                } else {
                    Some(info.enode)
                },
            }),
            _ => Err(shape_error("admin_nodeInfo")),
        }
    }

    async fn peers(
        &self,
        caller: &RpcCaller,
        address: &NetworkAddress,
    ) -> Result<Vec<PeerObservation>> {
        match invoke(caller, address, "admin_peers", vec![]).await?.result {
            Some(ParsedResult::Peers(peers)) => Ok(observations(peers)),
            _ => Err(shape_error("admin_peers")),
        }
    }

    async fn txpool(&self, caller: &RpcCaller, address: &NetworkAddress) -> Result<TxpoolSample> {
        match invoke(caller, address, "txpool_status", vec![]).await?.result {
            Some(ParsedResult::Txpool(sample)) => Ok(sample),
            _ => Err(shape_error("txpool_status")),
        }
    }
}
