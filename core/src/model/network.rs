//! # Network Container
//!
//! The identity-keyed node graph plus the bookkeeping sets that travel with
//! it: addresses that recently failed to answer, and addresses an operator
//! blocked outright. Also home of the `{nodes, edges}` topology export the
//! web surface feeds to its graph widget.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::node::{NetworkAddress, Node, NodeIdentity, NodeOrigin};

/// The whole picture of one monitored network.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkModel {
    /// `net_version` of the network, learned from the entry node.
    pub network_id: Option<String>,
    /// Identity of the configured entry point, once discovered.
    pub access_node: Option<NodeIdentity>,
    /// The address discovery starts from.
    pub default_access_address: NetworkAddress,
    /// Port injected into targets that carry none.
    pub default_rpc_port: u16,
    /// Every known node, keyed by identity.
    pub nodes: BTreeMap<NodeIdentity, Node>,
    /// Addresses that failed to answer, with the failure time. Cleared by
    /// full rediscovery; individual entries cleared by an insistent rescan.
    pub unreachable_addresses: BTreeMap<NetworkAddress, DateTime<Utc>>,
    /// Addresses that must never be dialed (fault-injection control).
    pub blocked_addresses: BTreeSet<NetworkAddress>,
}

impl NetworkModel {
    pub fn new(default_access_address: NetworkAddress, default_rpc_port: u16) -> Self {
        Self {
            network_id: None,
            access_node: None,
            default_access_address,
            default_rpc_port,
            nodes: BTreeMap::new(),
            unreachable_addresses: BTreeMap::new(),
            blocked_addresses: BTreeSet::new(),
        }
    }

    /// Wipes everything a full rediscovery rebuilds: the node graph, the
    /// unreachable set, the learned network id. Blocked addresses survive —
    /// they are operator intent, not observation.
    pub fn begin_discovery(&mut self) {
        self.nodes.clear();
        self.unreachable_addresses.clear();
        self.network_id = None;
        self.access_node = None;
    }

    /// Inserts a node under its own identity. Enforces the key==identity
    /// invariant at the only place nodes enter the map.
    pub fn insert_node(&mut self, node: Node) -> Result<()> {
        let identity = node
            .identity
            .clone()
            .ok_or_else(|| Error::InvalidArgument("node without identity".into()))?;
        self.nodes.insert(identity, node);
        Ok(())
    }

    pub fn node(&self, identity: &NodeIdentity) -> Option<&Node> {
        self.nodes.get(identity)
    }

    pub fn node_mut(&mut self, identity: &NodeIdentity) -> Option<&mut Node> {
        self.nodes.get_mut(identity)
    }

    /// Linear scan for the node that owns an address. Tries an exact match
    /// first, then host-only equality (peer endpoints are stored with the
    /// port stripped, operators type whatever they have in their clipboard).
    pub fn find_by_address(&self, address: &NetworkAddress) -> Option<&NodeIdentity> {
        for (identity, node) in &self.nodes {
            if node.known_addresses.contains(address) {
                return Some(identity);
            }
        }
        let host = address.host();
        self.nodes
            .iter()
            .find(|(_, node)| node.known_addresses.iter().any(|a| a.host() == host))
            .map(|(identity, _)| identity)
    }

    /// Records a failed dial against an address.
    pub fn mark_address_unreachable(&mut self, address: &NetworkAddress, at: DateTime<Utc>) {
        self.unreachable_addresses.insert(address.clone(), at);
    }

    // -----------------------------------------------------------------------
    // Topology export
    // -----------------------------------------------------------------------

    /// The `{nodes, edges}` shape the topology widget consumes.
    pub fn topology(&self) -> TopologyExport {
        let nodes = self
            .nodes
            .iter()
            .map(|(identity, node)| {
                let mut label = node.short_name();
                for address in &node.known_addresses {
                    label.push('\n');
                    label.push_str(address.as_str());
                }
                VisNode {
                    id: identity.clone(),
                    label,
                    image: if node.reachable {
                        "/static/node-full.png".to_string()
                    } else {
                        "/static/node.png".to_string()
                    },
                    shape: "image".to_string(),
                }
            })
            .collect();

        let mut edges = Vec::new();
        for (identity, node) in &self.nodes {
            for peer_id in &node.peers {
                if !self.emits_edge(identity, node, peer_id) {
                    continue;
                }
                edges.push(VisEdge {
                    from: identity.clone(),
                    to: peer_id.clone(),
                    label: self
                        .nodes
                        .get(peer_id)
                        .map(|p| p.short_name())
                        .unwrap_or_default(),
                });
            }
        }

        TopologyExport { nodes, edges }
    }

    /// Each undirected link is exported once. The entry node points
    /// outward; between equals the lexicographically smaller identity wins.
    fn emits_edge(&self, identity: &NodeIdentity, node: &Node, peer_id: &NodeIdentity) -> bool {
        let peer = match self.nodes.get(peer_id) {
            Some(p) => p,
            None => return true, // dangling edge: nothing on the other side to emit it
        };
        let back_edge = peer.peers.contains(identity);
        if !back_edge {
            return true;
        }
        match (node.origin, peer.origin) {
            (NodeOrigin::Entry, NodeOrigin::Peer) => true,
            (NodeOrigin::Peer, NodeOrigin::Entry) => false,
            _ => identity < peer_id,
        }
    }
}

/// One vertex of the exported topology.
#[derive(Debug, Clone, Serialize)]
pub struct VisNode {
    pub id: NodeIdentity,
    pub label: String,
    pub image: String,
    pub shape: String,
}

/// One edge of the exported topology.
#[derive(Debug, Clone, Serialize)]
pub struct VisEdge {
    pub from: NodeIdentity,
    pub to: NodeIdentity,
    pub label: String,
}

/// The full export document.
#[derive(Debug, Clone, Serialize)]
pub struct TopologyExport {
    pub nodes: Vec<VisNode>,
    pub edges: Vec<VisEdge>,
}
