//! # Parity Adapter
//!
//! Parity has no `admin_nodeInfo`; promoting a stub takes two calls —
//! `parity_nodeName` for the nickname and `parity_enode` for the enode
//! URL, with the identity cut out of the URL between `//` and `@`. Peer
//! lists come wrapped in `parity_netPeers` counters, and the txpool is
//! approximated by the length of `parity_pendingTransactions` (Parity
//! keeps no queued/pending split the way Geth does).

use async_trait::async_trait;

use crate::dialect::{invoke, observations, shape_error, Dialect, NodeFacts, PeerObservation};
use crate::error::{Error, Result};
use crate::model::node::{NetworkAddress, NodeIdentity, TxpoolSample};
use crate::rpc::caller::RpcCaller;
use crate::rpc::codec::ParsedResult;

#[derive(Debug, Default, Clone, Copy)]
pub struct ParityDialect;

/// The identity is the authority section of the enode URL:
/// `enode://<identity>@<host>:<port>`.
pub(crate) fn identity_from_enode(enode: &str) -> Result<NodeIdentity> {
    let after_scheme = enode
        .split_once("//")
        .map(|(_, rest)| rest)
        .ok_or_else(|| malformed(enode))?;
    let (identity, _) = after_scheme.split_once('@').ok_or_else(|| malformed(enode))?;
    if identity.is_empty() {
        return Err(malformed(enode));
    }
    Ok(NodeIdentity::new(identity))
}

fn malformed(enode: &str) -> Error {
    Error::Decode {
        method: "parity_enode".to_string(),
        detail: format!("malformed enode url: {enode}"),
    }
}

#[async_trait]
impl Dialect for ParityDialect {
    fn name(&self) -> &'static str {
        "parity"
    }

    async fn node_facts(&self, caller: &RpcCaller, address: &NetworkAddress) -> Result<NodeFacts> {
        let name = match invoke(caller, address, "parity_nodeName", vec![]).await?.result {
            Some(ParsedResult::Text(name)) => name,
            _ => return Err(shape_error("parity_nodeName")),
        };
        let enode = match invoke(caller, address, "parity_enode", vec![]).await?.result {
            Some(ParsedResult::Text(enode)) => enode,
            _ => return Err(shape_error("parity_enode")),
        };
        Ok(NodeFacts {
            identity: identity_from_enode(&enode)?,
            name,
            enode: Some(enode),
        })
    }

    async fn peers(
        &self,
        caller: &RpcCaller,
        address: &NetworkAddress,
    ) -> Result<Vec<PeerObservation>> {
        match invoke(caller, address, "parity_netPeers", vec![]).await?.result {
            Some(ParsedResult::ParityPeers(net)) => Ok(observations(net.peers)),
            _ => Err(shape_error("parity_netPeers")),
        }
    }

    async fn txpool(&self, caller: &RpcCaller, address: &NetworkAddress) -> Result<TxpoolSample> {
        match invoke(caller, address, "parity_pendingTransactions", vec![])
            .await?
            .result
        {
            Some(ParsedResult::Txpool(sample)) => Ok(sample),
            _ => Err(shape_error("parity_pendingTransactions")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::monitor::ModelState;
    use crate::transport::SystemClock;
    use std::sync::Arc;

    fn caller(transport: Arc<MockTransport>) -> RpcCaller {
        let state = Arc::new(parking_lot::Mutex::new(ModelState::new(
            NetworkAddress::new("10.0.0.1:8545"),
            8545,
        )));
        RpcCaller::new(
            transport,
            Arc::new(SystemClock),
            state,
            "chainwatch/test".into(),
            None,
        )
    }

    #[test]
    fn identity_is_cut_from_the_enode_url() {
        let id = identity_from_enode("enode://cc33@10.0.0.3:30303").unwrap();
        assert_eq!(id.as_str(), "cc33");

        assert!(identity_from_enode("cc33@10.0.0.3").is_err());
        assert!(identity_from_enode("enode://10.0.0.3:30303").is_err());
        assert!(identity_from_enode("enode://@host").is_err());
    }

    #[tokio::test]
    async fn promotes_a_stub_from_name_and_enode() {
        let transport = Arc::new(MockTransport::new());
        transport.insert(
            "10.0.0.3",
            "parity_nodeName",
            r#"{"id":1,"jsonrpc":"2.0","result":"validator-east"}"#,
        );
        transport.insert(
            "10.0.0.3",
            "parity_enode",
            r#"{"id":2,"jsonrpc":"2.0","result":"enode://cc33@10.0.0.3:30303"}"#,
        );
        let caller = caller(Arc::clone(&transport));

        let facts = ParityDialect
            .node_facts(&caller, &NetworkAddress::new("10.0.0.3"))
            .await
            .unwrap();
        assert_eq!(facts.identity.as_str(), "cc33");
        assert_eq!(facts.name, "validator-east");
        assert_eq!(facts.enode.as_deref(), Some("enode://cc33@10.0.0.3:30303"));
    }

    #[tokio::test]
    async fn peer_list_comes_from_net_peers() {
        let transport = Arc::new(MockTransport::new());
        transport.insert(
            "10.0.0.3",
            "parity_netPeers",
            r#"{"id":1,"jsonrpc":"2.0","result":{
                "active":1,"connected":1,"max":25,
                "peers":[{"id":"dd44","name":"Parity-Ethereum/v2.5.13",
                          "network":{"remoteAddress":"10.0.0.4:39201"}}]}}"#,
        );
        let caller = caller(Arc::clone(&transport));

        let peers = ParityDialect
            .peers(&caller, &NetworkAddress::new("10.0.0.3"))
            .await
            .unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].identity.as_str(), "dd44");
        assert_eq!(
            peers[0].remote_host.as_ref().map(NetworkAddress::as_str),
            Some("10.0.0.4")
        );
    }

    #[tokio::test]
    async fn txpool_is_the_pending_list_length() {
        let transport = Arc::new(MockTransport::new());
        transport.insert(
            "10.0.0.3",
            "parity_pendingTransactions",
            r#"{"id":1,"jsonrpc":"2.0","result":[{"hash":"0x1"},{"hash":"0x2"}]}"#,
        );
        let caller = caller(Arc::clone(&transport));

        let sample = ParityDialect
            .txpool(&caller, &NetworkAddress::new("10.0.0.3"))
            .await
            .unwrap();
        assert_eq!((sample.pending, sample.queued), (2, 0));
    }
}
