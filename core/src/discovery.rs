//! # Discovery and Refresh
//!
//! Builds the node graph from one entry address and keeps it current.
//! Discovery probes the entry node, then walks peer lists depth-first in
//! observation order, creating identity-keyed stubs as it goes. A rescan
//! revisits every node already in the model, trying its known addresses in
//! their stable (lexicographic) order; the `insist` flag additionally
//! retries addresses that recently failed.
//!
//! A single failing node never aborts a crawl — it is logged, marked, and
//! the walk continues with its siblings.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dialect::{self, PeerObservation};
use crate::error::{Error, Result};
use crate::model::node::{
    BlockSample, NetworkAddress, Node, NodeIdentity, NodeOrigin, TxpoolSample,
};
use crate::monitor::{NetworkMonitor, ProbeSummary};
use crate::rpc::codec::ParsedResult;

/// Outcome of a full discovery.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub network_id: String,
    pub nodes: usize,
}

/// Outcome of a rescan pass.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RescanReport {
    pub nodes: usize,
    pub failures: usize,
}

/// Everything one round of calls against a single address yielded.
/// Gathered unlocked, installed under the model lock in one go.
struct Collected {
    identity: NodeIdentity,
    client_version: String,
    name: Option<String>,
    enode: Option<String>,
    /// `None` when the dialect is unsupported or the peer call failed.
    peers: Option<Vec<PeerObservation>>,
    txpool: Option<TxpoolSample>,
    block: Option<BlockSample>,
    address: NetworkAddress,
}

/// A stub that still needs its first visit.
struct PendingVisit {
    identity: NodeIdentity,
    address: NetworkAddress,
}

impl NetworkMonitor {
    // -----------------------------------------------------------------------
    // Discovery
    // -----------------------------------------------------------------------

    /// Rebuilds the whole model from the configured entry address.
    pub async fn discover_network(&self) -> Result<DiscoveryReport> {
        let _gate = self.ops.lock().await;
        self.discover_network_locked().await
    }

    pub(crate) async fn discover_network_locked(&self) -> Result<DiscoveryReport> {
        let entry_address = self.default_access_address.clone();
        info!(entry = %entry_address, "discovering network");
        self.state.lock().model.begin_discovery();

        let network_id = self.text_call(&entry_address, "net_version").await?;
        self.state.lock().model.network_id = Some(network_id.clone());

        let collected = self.fetch_node_state(&entry_address, None).await?;
        let entry_identity = collected.identity.clone();
        let mut stack = self.install_collected(collected, NodeOrigin::Entry);
        self.state.lock().model.access_node = Some(entry_identity.clone());

        // Depth-first over peers, in the order each peer list reported them.
        // The stack pops from the back, so fresh batches go in reversed.
        let mut visited: BTreeSet<NodeIdentity> = BTreeSet::new();
        visited.insert(entry_identity);
        stack.reverse();
        while let Some(visit) = stack.pop() {
            if !visited.insert(visit.identity.clone()) {
                continue;
            }
            match self.fetch_node_state(&visit.address, Some(&visit.identity)).await {
                Ok(collected) => {
                    let mut fresh = self.install_collected(collected, NodeOrigin::Peer);
                    fresh.retain(|p| !visited.contains(&p.identity));
                    fresh.reverse();
                    stack.append(&mut fresh);
                }
                Err(err) => {
                    warn!(
                        node = %visit.identity.head(8),
                        address = %visit.address,
                        "peer visit failed: {err}"
                    );
                    let now = self.clock.now();
                    let mut state = self.state.lock();
                    if let Some(node) = state.model.nodes.get_mut(&visit.identity) {
                        node.set_unreachable(now);
                    }
                }
            }
        }

        let nodes = self.state.lock().model.nodes.len();
        info!(nodes, network = %network_id, "discovery complete");
        Ok(DiscoveryReport { network_id, nodes })
    }

    // -----------------------------------------------------------------------
    // Rescan
    // -----------------------------------------------------------------------

    /// Refreshes every node already in the model, identities and graph
    /// shape preserved. With `insist`, previously unreachable addresses
    /// are dropped from the skip set and dialed again.
    pub async fn rescan(&self, insist: bool) -> Result<RescanReport> {
        let _gate = self.ops.lock().await;
        self.rescan_locked(insist).await
    }

    pub(crate) async fn rescan_locked(&self, insist: bool) -> Result<RescanReport> {
        let identities: Vec<NodeIdentity> =
            self.state.lock().model.nodes.keys().cloned().collect();
        let mut failures = 0;
        for identity in &identities {
            if let Err(err) = self.refresh_node(identity, insist).await {
                warn!(node = %identity.head(8), "rescan failed: {err}");
                failures += 1;
            }
        }
        Ok(RescanReport {
            nodes: identities.len(),
            failures,
        })
    }

    /// One probe pass: rescan, then reduce the model to the watchdog's
    /// input triple.
    pub async fn heartbeat(&self) -> Result<ProbeSummary> {
        let _gate = self.ops.lock().await;
        self.heartbeat_locked().await
    }

    pub(crate) async fn heartbeat_locked(&self) -> Result<ProbeSummary> {
        self.rescan_locked(false).await?;
        Ok(self.summarize())
    }

    /// Refreshes a single node, walking its known addresses in stable
    /// order until one answers.
    pub(crate) async fn refresh_node(&self, identity: &NodeIdentity, insist: bool) -> Result<()> {
        let (addresses, unreachable): (Vec<NetworkAddress>, BTreeSet<NetworkAddress>) = {
            let state = self.state.lock();
            let node = state
                .model
                .node(identity)
                .ok_or_else(|| Error::NoSuchNode(identity.to_string()))?;
            (
                node.known_addresses.iter().cloned().collect(),
                state.model.unreachable_addresses.keys().cloned().collect(),
            )
        };

        let mut last_err: Option<Error> = None;
        for address in addresses {
            if unreachable.contains(&address) {
                if insist {
                    debug!(%address, "insisting on previously unreachable address");
                    self.state.lock().model.unreachable_addresses.remove(&address);
                } else {
                    debug!(%address, "skipping previously unreachable address");
                    continue;
                }
            }
            match self.fetch_node_state(&address, Some(identity)).await {
                Ok(collected) => {
                    self.install_collected(collected, NodeOrigin::Peer);
                    return Ok(());
                }
                Err(err) => {
                    debug!(%address, "address did not answer: {err}");
                    last_err = Some(err);
                }
            }
        }

        // No contact on any address.
        let now = self.clock.now();
        {
            let mut state = self.state.lock();
            if let Some(node) = state.model.nodes.get_mut(identity) {
                node.set_unreachable(now);
            }
        }
        Err(last_err.unwrap_or_else(|| Error::NoAddress(identity.to_string())))
    }

    // -----------------------------------------------------------------------
    // Shared plumbing
    // -----------------------------------------------------------------------

    /// A call whose result must be a single string.
    pub(crate) async fn text_call(&self, address: &NetworkAddress, method: &str) -> Result<String> {
        match dialect::invoke(&self.caller, address, method, vec![]).await?.result {
            Some(ParsedResult::Text(text)) => Ok(text),
            _ => Err(Error::Decode {
                method: method.to_string(),
                detail: "expected a string result".to_string(),
            }),
        }
    }

    /// Gathers one node's state from one address. No locks held; the
    /// client-version probe doubles as the reachability check.
    ///
    /// When a stub was created from a peer record, that record's identity
    /// is authoritative — a disagreeing `admin_nodeInfo` is logged and
    /// overruled.
    async fn fetch_node_state(
        &self,
        address: &NetworkAddress,
        expected: Option<&NodeIdentity>,
    ) -> Result<Collected> {
        let client_version = self.text_call(address, "web3_clientVersion").await?;

        let adapter = match dialect::select(&client_version) {
            Ok(adapter) => adapter,
            Err(err) => {
                warn!(%address, version = %client_version, "unsupported dialect");
                // The node answered; keep what we know when we can key it.
                let Some(identity) = expected else {
                    return Err(err);
                };
                return Ok(Collected {
                    identity: identity.clone(),
                    client_version,
                    name: None,
                    enode: None,
                    peers: None,
                    txpool: None,
                    block: None,
                    address: address.clone(),
                });
            }
        };

        let facts = adapter.node_facts(&self.caller, address).await?;
        let identity = match expected {
            Some(expected) if *expected != facts.identity => {
                warn!(
                    expected = %expected.head(8),
                    reported = %facts.identity.head(8),
                    %address,
                    "node info disagrees with the peer record; keeping the peer record"
                );
                expected.clone()
            }
            Some(expected) => expected.clone(),
            None => facts.identity.clone(),
        };

        let peers = match adapter.peers(&self.caller, address).await {
            Ok(peers) => Some(peers),
            Err(err) => {
                warn!(%address, "peer list unavailable: {err}");
                None
            }
        };
        let txpool = match adapter.txpool(&self.caller, address).await {
            Ok(sample) => Some(sample),
            Err(err) => {
                debug!(%address, "txpool unavailable: {err}");
                None
            }
        };
        let block = match adapter.block_number(&self.caller, address).await {
            Ok(sample) => Some(sample),
            Err(err) => {
                debug!(%address, "block number unavailable: {err}");
                None
            }
        };

        Ok(Collected {
            identity,
            client_version,
            name: Some(facts.name),
            enode: facts.enode,
            peers,
            txpool,
            block,
            address: address.clone(),
        })
    }

    /// Installs one gathered round under the lock: the node's own fields,
    /// its peer edges, and stubs for peers not yet in the model. Returns
    /// the stubs that still need a first visit.
    fn install_collected(&self, collected: Collected, origin: NodeOrigin) -> Vec<PendingVisit> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let threshold = state.progress_threshold;
        let model = &mut state.model;

        {
            let node = model
                .nodes
                .entry(collected.identity.clone())
                .or_insert_with(|| {
                    let mut stub = Node::stub(origin);
                    stub.identity = Some(collected.identity.clone());
                    stub
                });
            node.client_version = Some(collected.client_version);
            if let Some(name) = collected.name {
                node.name = Some(name);
            }
            if let Some(enode) = collected.enode {
                node.enode = Some(enode);
            }
            node.known_addresses.insert(collected.address.clone());
            node.preferred_address = Some(collected.address.clone());
            node.set_reachable(now);
            if let Some(sample) = collected.txpool {
                node.txpool = Some(sample);
            }
            if let Some(sample) = collected.block {
                node.record_block_sample(sample, threshold);
            }
            if let Some(peers) = &collected.peers {
                node.peers = peers.iter().map(|p| p.identity.clone()).collect();
                // Self-links show up on misconfigured nodes; they only
                // confuse the export.
                node.peers.remove(&collected.identity);
            }
        }

        let mut pending = Vec::new();
        if let Some(peers) = collected.peers {
            for observation in peers {
                if observation.identity == collected.identity {
                    continue;
                }
                match model.nodes.get_mut(&observation.identity) {
                    Some(existing) => {
                        if let Some(host) = &observation.remote_host {
                            existing.known_addresses.insert(host.clone());
                        }
                    }
                    None => {
                        let mut stub = Node::stub(NodeOrigin::Peer);
                        stub.identity = Some(observation.identity.clone());
                        if let Some(name) = observation.name {
                            stub.name = Some(name);
                        }
                        if let Some(host) = &observation.remote_host {
                            stub.known_addresses.insert(host.clone());
                            pending.push(PendingVisit {
                                identity: observation.identity.clone(),
                                address: host.clone(),
                            });
                        }
                        model.nodes.insert(observation.identity.clone(), stub);
                    }
                }
            }
        }
        pending
    }
}
