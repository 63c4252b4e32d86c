//! # Network Monitor
//!
//! The hub everything else hangs off: the shared model state behind its
//! single mutex, the operation gate that serializes multi-call flows, and
//! the RPC caller. Discovery and rescan live in [`crate::discovery`], the
//! block sampler in [`crate::sampler`] — both are `impl` blocks on
//! [`NetworkMonitor`].
//!
//! Locking discipline: the state mutex is only ever held for short,
//! synchronous critical sections — snapshot what an operation needs,
//! do the I/O unlocked, install the results. The async operation gate
//! (`ops`) is what keeps a foreground HTTP command and the background
//! watchdog probe from interleaving their call sequences.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;

use crate::config::{DEFAULT_PROGRESS_THRESHOLD, DEFAULT_USER_AGENT, MESH_P2P_PORT};
use crate::error::Result;
use crate::model::node::{NetworkAddress, NodeIdentity};
use crate::model::NetworkModel;
use crate::rpc::caller::{CallData, RpcCaller};
use crate::transport::{Clock, ConfigStore, Transport};
use crate::watchdog::{WatchdogConfig, WatchdogState};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything the single mutex guards: the network model with its
/// unreachable/blocked sets, the watchdog state and config, the tunable
/// progress threshold, and the UI toggles.
#[derive(Debug)]
pub struct ModelState {
    pub model: NetworkModel,
    pub watchdog: WatchdogState,
    pub watchdog_config: WatchdogConfig,
    /// Grace window for the sampler's stuck decision.
    pub progress_threshold: Duration,
    /// Echo raw envelopes instead of typed renders.
    pub raw_mode: bool,
    /// Verbose request echo on the command surface.
    pub debug_mode: bool,
}

impl ModelState {
    pub fn new(default_access_address: NetworkAddress, default_rpc_port: u16) -> Self {
        Self {
            model: NetworkModel::new(default_access_address, default_rpc_port),
            watchdog: WatchdogState::default(),
            watchdog_config: WatchdogConfig::default(),
            progress_threshold: DEFAULT_PROGRESS_THRESHOLD,
            raw_mode: false,
            debug_mode: false,
        }
    }
}

/// The one lock. Never held across an `.await`.
pub type SharedState = Arc<Mutex<ModelState>>;

// ---------------------------------------------------------------------------
// Probe summary
// ---------------------------------------------------------------------------

/// What one pass over the model tells the watchdog: whether anything is
/// progressing, how many nodes did not answer, and how many answer but
/// do not advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeSummary {
    /// OR across the `progressing` flags of reachable nodes.
    pub progressing: bool,
    /// Nodes with `reachable == false`.
    pub unreachable: usize,
    /// Reachable nodes with `progressing == false`.
    pub stuck: usize,
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Construction-time knobs for the monitor.
pub struct MonitorOptions {
    pub default_access_address: NetworkAddress,
    pub default_rpc_port: u16,
    pub user_agent: String,
    /// When set, every response body is dumped under `{host}_{method}.json`.
    pub dump_store: Option<Arc<dyn ConfigStore>>,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            default_access_address: NetworkAddress::new(crate::config::DEFAULT_ACCESS_ADDRESS),
            default_rpc_port: crate::config::DEFAULT_RPC_PORT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            dump_store: None,
        }
    }
}

/// The monitoring hub. One per process; shared by the HTTP surface and
/// the watchdog through an `Arc`.
pub struct NetworkMonitor {
    pub(crate) caller: RpcCaller,
    pub(crate) state: SharedState,
    /// Serializes whole operations (discovery, rescan, probe, bloop, ad-hoc
    /// RPC). The watchdog `try_lock`s this to implement skip-if-busy ticks.
    pub(crate) ops: tokio::sync::Mutex<()>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) default_access_address: NetworkAddress,
}

impl NetworkMonitor {
    /// Builds the monitor. An entry address that carries a port overrides
    /// `default_rpc_port` — operators who type `node:8745` mean it.
    pub fn new(
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        options: MonitorOptions,
    ) -> Arc<Self> {
        let default_rpc_port = options
            .default_access_address
            .port()
            .unwrap_or(options.default_rpc_port);
        let state: SharedState = Arc::new(Mutex::new(ModelState::new(
            options.default_access_address.clone(),
            default_rpc_port,
        )));
        let caller = RpcCaller::new(
            transport,
            Arc::clone(&clock),
            Arc::clone(&state),
            options.user_agent,
            options.dump_store,
        );
        Arc::new(Self {
            caller,
            state,
            ops: tokio::sync::Mutex::new(()),
            clock,
            default_access_address: options.default_access_address,
        })
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn default_access_address(&self) -> &NetworkAddress {
        &self.default_access_address
    }

    /// One ad-hoc RPC call through the operation gate. This is the
    /// command-surface path; internal flows hold the gate for their whole
    /// call sequence instead.
    pub async fn rpc_call(&self, data: &mut CallData) -> Result<()> {
        let _gate = self.ops.lock().await;
        self.caller.call(data).await
    }

    /// Which node, if any, owns this address.
    pub fn resolve_address(&self, address: &NetworkAddress) -> Option<NodeIdentity> {
        self.state.lock().model.find_by_address(address).cloned()
    }

    /// Adds an address to the never-dial set.
    pub fn block_address(&self, address: NetworkAddress) {
        tracing::info!(%address, "blocking address");
        self.state.lock().model.blocked_addresses.insert(address);
    }

    /// Removes an address from the never-dial set. Returns whether it was
    /// present.
    pub fn unblock_address(&self, address: &NetworkAddress) -> bool {
        tracing::info!(%address, "unblocking address");
        self.state.lock().model.blocked_addresses.remove(address)
    }

    /// Flips the raw-echo toggle, returning the new value.
    pub fn toggle_raw_mode(&self) -> bool {
        let mut state = self.state.lock();
        state.raw_mode = !state.raw_mode;
        state.raw_mode
    }

    /// Sets the request-echo debug flag.
    pub fn set_debug(&self, on: bool) {
        self.state.lock().debug_mode = on;
    }

    /// Derives the watchdog's probe input from the current model.
    pub fn summarize(&self) -> ProbeSummary {
        let state = self.state.lock();
        let mut summary = ProbeSummary {
            progressing: false,
            unreachable: 0,
            stuck: 0,
        };
        for node in state.model.nodes.values() {
            if !node.reachable {
                summary.unreachable += 1;
                continue;
            }
            summary.progressing = summary.progressing || node.progressing;
            if !node.progressing {
                summary.stuck += 1;
            }
        }
        summary
    }

    /// Short names of unreachable and stuck nodes, for alert rendering.
    pub fn trouble_names(&self) -> (Vec<String>, Vec<String>) {
        let state = self.state.lock();
        let mut unreachable = Vec::new();
        let mut stuck = Vec::new();
        for node in state.model.nodes.values() {
            if !node.reachable {
                unreachable.push(node.short_name());
            } else if !node.progressing {
                stuck.push(node.short_name());
            }
        }
        (unreachable, stuck)
    }

    // -----------------------------------------------------------------------
    // Full mesh
    // -----------------------------------------------------------------------

    /// Asks every node to peer with every other node it is not already
    /// linked to, by handing `admin_addPeer` a constructed enode URL. Per
    /// ordered pair the known addresses of the target are tried in order
    /// until one call goes through.
    pub async fn full_mesh(&self) -> Result<FullMeshReport> {
        let _gate = self.ops.lock().await;

        struct MeshView {
            identity: NodeIdentity,
            dial: Option<NetworkAddress>,
            peers: Vec<NodeIdentity>,
            addresses: Vec<NetworkAddress>,
        }

        let views: Vec<MeshView> = {
            let state = self.state.lock();
            state
                .model
                .nodes
                .iter()
                .map(|(identity, node)| MeshView {
                    identity: identity.clone(),
                    dial: node
                        .preferred_address
                        .clone()
                        .or_else(|| node.known_addresses.iter().next().cloned()),
                    peers: node.peers.iter().cloned().collect(),
                    addresses: node.known_addresses.iter().cloned().collect(),
                })
                .collect()
        };

        let mut report = FullMeshReport::default();
        for a in &views {
            let Some(dial) = &a.dial else {
                tracing::warn!(node = %a.identity.head(8), "full mesh: no dialable address");
                continue;
            };
            for b in &views {
                if a.identity == b.identity || a.peers.contains(&b.identity) {
                    continue;
                }
                report.pairs += 1;
                let mut linked = false;
                for address in &b.addresses {
                    let enode =
                        format!("enode://{}@{}:{}", b.identity, address.host(), MESH_P2P_PORT);
                    let mut data = CallData::new("admin_addPeer", dial.clone())
                        .with_params(vec![json!(enode)]);
                    report.calls += 1;
                    match self.caller.call(&mut data).await {
                        Ok(()) if data.rpc_error().is_none() => {
                            linked = true;
                            break;
                        }
                        Ok(()) => {
                            tracing::warn!(
                                from = %a.identity.head(8),
                                to = %b.identity.head(8),
                                "addPeer refused: {:?}",
                                data.rpc_error()
                            );
                        }
                        Err(err) => {
                            tracing::warn!(
                                from = %a.identity.head(8),
                                to = %b.identity.head(8),
                                "addPeer failed: {err}"
                            );
                        }
                    }
                }
                if linked {
                    report.linked += 1;
                }
            }
        }
        Ok(report)
    }
}

/// Outcome of a full-mesh pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FullMeshReport {
    /// Ordered pairs that were missing a link.
    pub pairs: usize,
    /// `admin_addPeer` calls issued.
    pub calls: usize,
    /// Pairs where some call went through.
    pub linked: usize,
}
