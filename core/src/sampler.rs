//! # Block Sampler
//!
//! Per-node `eth_blockNumber` sampling with the progress decision, and
//! `bloop`, the fan-out that samples everything and maps short names to
//! their latest sample (or a loud marker for nodes that did not answer).
//!
//! The decision itself lives on [`crate::model::Node::record_block_sample`];
//! this module is the I/O choreography around it: snapshot the preferred
//! address, call unlocked, install under the lock.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::config::UNREACHABLE_MARKER;
use crate::error::{Error, Result};
use crate::model::node::{BlockSample, NodeIdentity};
use crate::monitor::NetworkMonitor;
use crate::rpc::caller::CallData;
use crate::rpc::codec::ParsedResult;

/// One `bloop` row: the sample, or the marker for a node that failed.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BloopEntry {
    Sample(BlockSample),
    Marker(String),
}

/// Short name → latest sample, over the whole model.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct BloopReport {
    pub entries: BTreeMap<String, BloopEntry>,
}

impl NetworkMonitor {
    /// Samples one node's block number and updates its progress verdict.
    pub async fn sample_block(&self, identity: &NodeIdentity) -> Result<BlockSample> {
        let _gate = self.ops.lock().await;
        self.sample_block_inner(identity).await
    }

    pub(crate) async fn sample_block_inner(&self, identity: &NodeIdentity) -> Result<BlockSample> {
        let address = {
            let state = self.state.lock();
            state
                .model
                .node(identity)
                .ok_or_else(|| Error::NoSuchNode(identity.to_string()))?
                .preferred_address
                .clone()
        }
        .ok_or_else(|| Error::NoAddress(identity.to_string()))?;

        let mut data = CallData::new("eth_blockNumber", address);
        self.caller.call(&mut data).await?;
        let sample = match data.result {
            Some(ParsedResult::BlockNumber(sample)) => sample,
            _ => {
                if let Some(err) = data.rpc_error() {
                    return Err(Error::Rpc {
                        code: err.code,
                        message: err.message.clone(),
                    });
                }
                return Err(Error::Decode {
                    method: "eth_blockNumber".to_string(),
                    detail: "expected a block quantity".to_string(),
                });
            }
        };

        let mut state = self.state.lock();
        let threshold = state.progress_threshold;
        let node = state
            .model
            .nodes
            .get_mut(identity)
            .ok_or_else(|| Error::NoSuchNode(identity.to_string()))?;
        node.record_block_sample(sample, threshold);
        Ok(sample)
    }

    /// Samples every node in the model.
    pub async fn bloop(&self) -> BloopReport {
        let _gate = self.ops.lock().await;

        let targets: Vec<(NodeIdentity, String)> = {
            let state = self.state.lock();
            state
                .model
                .nodes
                .iter()
                .map(|(identity, node)| (identity.clone(), node.short_name()))
                .collect()
        };

        let mut entries = BTreeMap::new();
        for (identity, short_name) in targets {
            match self.sample_block_inner(&identity).await {
                Ok(sample) => {
                    entries.insert(short_name, BloopEntry::Sample(sample));
                }
                Err(err) => {
                    warn!(node = %short_name, "bloop sample failed: {err}");
                    entries.insert(short_name, BloopEntry::Marker(UNREACHABLE_MARKER.to_string()));
                }
            }
        }
        BloopReport { entries }
    }
}
