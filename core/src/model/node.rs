//! # Node Record
//!
//! One entry per blockchain node, keyed in the model by [`NodeIdentity`].
//! A node is born as a stub — an address with no identity, or an identity
//! lifted from someone else's peer list — and is promoted once the
//! client-version probe succeeds and a dialect adapter fills in the rest.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity and address newtypes
// ---------------------------------------------------------------------------

/// The identifier a node assigns to itself — the enode public-key hash.
/// Globally unique within a network and immutable once known. Never a
/// network address; the two must not be conflated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeIdentity(String);

impl NodeIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `n` characters, for compact logging.
    pub fn head(&self, n: usize) -> &str {
        &self.0[..self.0.len().min(n)]
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A dialable `host` or `host:port`. When the port is absent the caller
/// fills in the configured default RPC port at dial time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkAddress(String);

impl NetworkAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The host part, port dropped if present.
    pub fn host(&self) -> &str {
        match self.0.rfind(':') {
            Some(i) => &self.0[..i],
            None => &self.0,
        }
    }

    /// The port part, if one is present and numeric.
    pub fn port(&self) -> Option<u16> {
        self.0.rfind(':').and_then(|i| self.0[i + 1..].parse().ok())
    }

    /// A copy with the port dropped. Peer remote endpoints arrive with the
    /// P2P data port, which is useless for dialing RPC.
    pub fn stripped(&self) -> NetworkAddress {
        NetworkAddress(self.host().to_string())
    }

    /// A copy guaranteed to carry a port, defaulting when absent.
    pub fn with_default_port(&self, default_port: u16) -> NetworkAddress {
        if self.port().is_some() {
            self.clone()
        } else {
            NetworkAddress(format!("{}:{}", self.0, default_port))
        }
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// One `eth_blockNumber` observation, stamped at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSample {
    pub number: u64,
    pub sampled_at: DateTime<Utc>,
}

/// One txpool observation, stamped at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxpoolSample {
    pub pending: u64,
    pub queued: u64,
    pub sampled_at: DateTime<Utc>,
}

/// How a node first entered the model. Only used to pick a canonical edge
/// direction in the topology export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeOrigin {
    /// Dialed directly as the configured entry point.
    Entry,
    /// First seen in another node's peer list.
    Peer,
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// The canonical record for one blockchain node.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    /// Identity as reported by the node itself. `None` while the record is
    /// still a stub created from a bare address.
    pub identity: Option<NodeIdentity>,
    /// Full enode URL advertised by the node, used for mesh-forming calls.
    pub enode: Option<String>,
    /// Raw client-version string (`"Geth/miner3/v1.8.2/linux-amd64/go1.10"`).
    /// The first `/`-segment selects the dialect adapter.
    pub client_version: Option<String>,
    /// Human-assigned node name where the dialect provides one separately
    /// from the version string (Parity's `parity_nodeName`).
    pub name: Option<String>,
    /// Every address this node was ever observed at. A `BTreeSet` so that
    /// working-address scans walk candidates in a stable order.
    pub known_addresses: BTreeSet<NetworkAddress>,
    /// The most recently successful address; sticky until a failure.
    pub preferred_address: Option<NetworkAddress>,
    /// Peer edges, by identity. Each direction is discovered independently,
    /// so the two sides of a link may disagree transiently.
    pub peers: BTreeSet<NodeIdentity>,
    /// Latest accepted block sample. Only replaced by a strictly greater
    /// block number.
    pub last_block_sample: Option<BlockSample>,
    /// The sample `last_block_sample` displaced.
    pub previous_block_sample: Option<BlockSample>,
    /// Latest txpool observation.
    pub txpool: Option<TxpoolSample>,
    /// Whether the last contact attempt succeeded.
    pub reachable: bool,
    pub last_reach_at: Option<DateTime<Utc>>,
    pub last_fail_at: Option<DateTime<Utc>>,
    /// The sampler's verdict: is this node minting/accepting new blocks.
    pub progressing: bool,
    pub origin: NodeOrigin,
}

impl Node {
    /// A stub known only by address.
    pub fn stub(origin: NodeOrigin) -> Self {
        Self {
            identity: None,
            enode: None,
            client_version: None,
            name: None,
            known_addresses: BTreeSet::new(),
            preferred_address: None,
            peers: BTreeSet::new(),
            last_block_sample: None,
            previous_block_sample: None,
            txpool: None,
            reachable: false,
            last_reach_at: None,
            last_fail_at: None,
            progressing: false,
            origin,
        }
    }

    /// A stub created from a peer record: identity already known, one
    /// observed address.
    pub fn peer_stub(identity: NodeIdentity, address: NetworkAddress) -> Self {
        let mut node = Self::stub(NodeOrigin::Peer);
        node.identity = Some(identity);
        node.known_addresses.insert(address);
        node
    }

    /// Short display name: the second `/`-segment of the name or version
    /// string, the whole string when it has no slash, or a head of the
    /// identity as a last resort.
    pub fn short_name(&self) -> String {
        let source = self
            .name
            .as_deref()
            .or(self.client_version.as_deref())
            .unwrap_or("");
        if source.is_empty() {
            return match &self.identity {
                Some(id) => id.head(8).to_string(),
                None => "?".to_string(),
            };
        }
        let mut parts = source.split('/');
        let first = parts.next().unwrap_or(source);
        match parts.next() {
            Some(second) if !second.is_empty() => second.to_string(),
            _ => first.to_string(),
        }
    }

    /// First `/`-segment of the client-version string; selects the dialect.
    pub fn dialect_prefix(&self) -> Option<&str> {
        self.client_version
            .as_deref()
            .map(|v| v.split('/').next().unwrap_or(v))
    }

    /// Marks a successful contact.
    pub fn set_reachable(&mut self, at: DateTime<Utc>) {
        self.reachable = true;
        self.last_reach_at = Some(at);
    }

    /// Marks a failed contact (every candidate address failed).
    pub fn set_unreachable(&mut self, at: DateTime<Utc>) {
        self.reachable = false;
        self.last_fail_at = Some(at);
    }

    /// Applies a fresh block sample and decides progress.
    ///
    /// The sample is installed only when its number strictly advances; a
    /// stalled number flips `progressing` off once the latest accepted
    /// sample is older than `threshold`. Within the grace window the flag
    /// is left alone.
    pub fn record_block_sample(&mut self, sample: BlockSample, threshold: Duration) {
        match self.last_block_sample {
            None => {
                self.last_block_sample = Some(sample);
            }
            Some(last) if sample.number > last.number => {
                self.previous_block_sample = Some(last);
                self.last_block_sample = Some(sample);
                self.progressing = true;
            }
            Some(last) => {
                let stalled_for = (sample.sampled_at - last.sampled_at)
                    .to_std()
                    .unwrap_or_default();
                if stalled_for > threshold {
                    self.progressing = false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn sample(number: u64, secs: i64) -> BlockSample {
        BlockSample { number, sampled_at: at(secs) }
    }

    const THRESHOLD: Duration = Duration::from_secs(15);

    #[test]
    fn address_parts() {
        let with_port = NetworkAddress::new("10.0.0.2:30303");
        assert_eq!(with_port.host(), "10.0.0.2");
        assert_eq!(with_port.port(), Some(30303));
        assert_eq!(with_port.stripped().as_str(), "10.0.0.2");

        let bare = NetworkAddress::new("10.0.0.2");
        assert_eq!(bare.port(), None);
        assert_eq!(bare.with_default_port(8545).as_str(), "10.0.0.2:8545");
        assert_eq!(with_port.with_default_port(8545).as_str(), "10.0.0.2:30303");
    }

    #[test]
    fn short_name_from_version_string() {
        let mut node = Node::stub(NodeOrigin::Entry);
        node.client_version = Some("Geth/miner3/v1.7.2-stable/linux-amd64/go1.9.2".into());
        assert_eq!(node.short_name(), "miner3");
    }

    #[test]
    fn short_name_without_slash_falls_back_to_whole_string() {
        let mut node = Node::stub(NodeOrigin::Peer);
        node.name = Some("validator-west".into());
        assert_eq!(node.short_name(), "validator-west");
    }

    #[test]
    fn short_name_falls_back_to_identity_head() {
        let mut node = Node::stub(NodeOrigin::Peer);
        node.identity = Some(NodeIdentity::new("abcdef0123456789"));
        assert_eq!(node.short_name(), "abcdef01");
    }

    #[test]
    fn dialect_prefix_is_first_segment() {
        let mut node = Node::stub(NodeOrigin::Entry);
        node.client_version = Some("Parity-Ethereum/v2.5.13/x86_64-linux".into());
        assert_eq!(node.dialect_prefix(), Some("Parity-Ethereum"));
    }

    #[test]
    fn first_sample_installs_without_progress_verdict() {
        let mut node = Node::stub(NodeOrigin::Entry);
        node.record_block_sample(sample(16, 0), THRESHOLD);
        assert_eq!(node.last_block_sample.unwrap().number, 16);
        assert!(node.previous_block_sample.is_none());
        assert!(!node.progressing);
    }

    #[test]
    fn advancing_sample_shifts_and_marks_progress() {
        let mut node = Node::stub(NodeOrigin::Entry);
        node.record_block_sample(sample(16, 0), THRESHOLD);
        node.record_block_sample(sample(17, 5), THRESHOLD);

        assert!(node.progressing);
        assert_eq!(node.last_block_sample.unwrap().number, 17);
        assert_eq!(node.previous_block_sample.unwrap().number, 16);
    }

    #[test]
    fn sample_number_never_decreases() {
        let mut node = Node::stub(NodeOrigin::Entry);
        node.record_block_sample(sample(17, 0), THRESHOLD);
        node.record_block_sample(sample(16, 5), THRESHOLD);
        assert_eq!(node.last_block_sample.unwrap().number, 17);
    }

    #[test]
    fn stall_within_grace_window_keeps_flag() {
        let mut node = Node::stub(NodeOrigin::Entry);
        node.record_block_sample(sample(16, 0), THRESHOLD);
        node.record_block_sample(sample(17, 2), THRESHOLD);
        assert!(node.progressing);

        // Same number, 6 s later: still inside the 15 s window.
        node.record_block_sample(sample(17, 8), THRESHOLD);
        assert!(node.progressing);
    }

    #[test]
    fn stall_past_threshold_clears_flag() {
        let mut node = Node::stub(NodeOrigin::Entry);
        node.record_block_sample(sample(16, 0), THRESHOLD);
        node.record_block_sample(sample(17, 2), THRESHOLD);

        // 6 s steps; the third repeat lands 18 s after the accepted sample.
        node.record_block_sample(sample(17, 8), THRESHOLD);
        node.record_block_sample(sample(17, 14), THRESHOLD);
        assert!(node.progressing);
        node.record_block_sample(sample(17, 20), THRESHOLD);
        assert!(!node.progressing);
    }

    #[test]
    fn reachability_timestamps() {
        let mut node = Node::stub(NodeOrigin::Entry);
        node.set_reachable(at(0));
        assert!(node.reachable);

        node.set_unreachable(at(10));
        assert!(!node.reachable);
        assert!(node.last_fail_at.unwrap() >= node.last_reach_at.unwrap());
    }
}
