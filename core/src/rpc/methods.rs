//! # Known Method Table
//!
//! The RPC methods the command surface accepts by name. Operators type
//! these into URLs in whatever capitalization they remember, so lookup is
//! case-insensitive and returns the canonical spelling the wire expects.

/// Every method name the tool recognizes. Unknown methods can still be
/// dialed through the two-segment `/address/method` path — this table only
/// gates the one-segment shorthand and fixes capitalization.
pub const KNOWN_METHODS: &[&str] = &[
    "admin_addPeer",
    "admin_datadir",
    "admin_nodeInfo",
    "admin_peers",
    "admin_startRPC",
    "admin_stopRPC",
    "debug_gcStats",
    "debug_memStats",
    "eth_blockNumber",
    "miner_start",
    "miner_stop",
    "net_version",
    "parity_enode",
    "parity_netPeers",
    "parity_nodeName",
    "parity_pendingTransactions",
    "personal_listAccounts",
    "txpool_content",
    "txpool_inspect",
    "txpool_status",
    "web3_clientVersion",
];

/// Case-insensitive lookup returning the canonical spelling.
pub fn canonicalize(method: &str) -> Option<&'static str> {
    KNOWN_METHODS
        .iter()
        .find(|known| known.eq_ignore_ascii_case(method))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_fixes_case() {
        assert_eq!(canonicalize("admin_nodeinfo"), Some("admin_nodeInfo"));
        assert_eq!(canonicalize("ADMIN_PEERS"), Some("admin_peers"));
        assert_eq!(canonicalize("eth_blocknumber"), Some("eth_blockNumber"));
        assert_eq!(canonicalize("web3_clientversion"), Some("web3_clientVersion"));
    }

    #[test]
    fn unknown_methods_stay_unknown() {
        assert_eq!(canonicalize("eth_call"), None);
        assert_eq!(canonicalize(""), None);
    }
}
