//! # Operator Command Surface
//!
//! The HTTP host hands every request here as a path plus form pairs.
//! Dispatch is driven by the path split on `/`: no segments render the
//! home view, one segment is either a known RPC method (case-insensitive,
//! canonicalized) forwarded to the default node or a control word, two
//! segments are `/address/method` against that address.
//!
//! RPC pass-through parameters come from form keys matching `par\d$`,
//! sorted lexicographically, first values only — the key names are
//! discarded on the way to `params[]`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{json, Value};

use crate::config::TEMPLATE_DIR;
use crate::error::{Error, Result};
use crate::model::node::NetworkAddress;
use crate::monitor::NetworkMonitor;
use crate::rpc::caller::CallData;
use crate::rpc::methods;
use crate::watchdog::Watchdog;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Everything the surface can be asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Render the home/topology view.
    Home,
    /// Forward an RPC call; `target == None` means the default node.
    Rpc {
        target: Option<NetworkAddress>,
        method: String,
        params: Vec<String>,
        show_raw: bool,
        /// The request path that triggered the call, echoed back in
        /// debug mode.
        request_path: String,
    },
    ToggleRawMode,
    DiscoverNetwork,
    Rescan { insist: bool },
    Bloop,
    Heartbeat,
    Peers,
    DebugOn,
    DebugOff,
    LoadTemplates,
    MagicOne,
    RawNodes,
    FullMesh,
    JsonNodes,
    MockBlock { address: NetworkAddress },
    MockUnblock { address: NetworkAddress },
    AddRecipient { address: String },
    BlockRecipient { address: String },
    RemoveRecipient { address: String },
    SetWatchdogInterval { seconds: u64 },
    SetThreshold { seconds: u64 },
    SetWatchdogStatusOk,
    WatchdogStatus,
    /// Handled by the HTTP layer, which owns the credential map.
    SetPassword { password: String },
}

/// What a command produced. The HTTP layer renders `Json` and `Text`
/// directly; `SetPassword` it intercepts and performs itself.
#[derive(Debug)]
pub enum CommandOutput {
    Json(Value),
    Text(String),
    SetPassword { password: String },
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parses one request into a [`Command`].
pub fn parse_request(path: &str, form: &[(String, String)]) -> Result<Command> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [] => Ok(Command::Home),
        [word] => parse_word(word, path, form),
        [address, method] => Ok(Command::Rpc {
            target: Some(NetworkAddress::new(*address)),
            // Fix the spelling when we know the method; forward verbatim
            // when we don't — nodes grow new methods faster than we do.
            method: methods::canonicalize(method)
                .map(str::to_string)
                .unwrap_or_else(|| (*method).to_string()),
            params: collect_params(form),
            show_raw: show_raw(form),
            request_path: path.to_string(),
        }),
        _ => Ok(Command::Home),
    }
}

fn parse_word(word: &str, path: &str, form: &[(String, String)]) -> Result<Command> {
    if let Some(method) = methods::canonicalize(word) {
        return Ok(Command::Rpc {
            target: None,
            method: method.to_string(),
            params: collect_params(form),
            show_raw: show_raw(form),
            request_path: path.to_string(),
        });
    }

    match word.to_ascii_lowercase().as_str() {
        "togglerawmode" => Ok(Command::ToggleRawMode),
        "discovernetwork" => Ok(Command::DiscoverNetwork),
        "rescan" => Ok(Command::Rescan {
            insist: flag(form, "insist"),
        }),
        "bloop" => Ok(Command::Bloop),
        "heartbeat" => Ok(Command::Heartbeat),
        "peers" => Ok(Command::Peers),
        "debugon" => Ok(Command::DebugOn),
        "debugoff" => Ok(Command::DebugOff),
        "loadtemplates" => Ok(Command::LoadTemplates),
        "magicone" => Ok(Command::MagicOne),
        "rawnodes" => Ok(Command::RawNodes),
        "fullmesh" => Ok(Command::FullMesh),
        "jsonnodes" => Ok(Command::JsonNodes),
        "mockblock" => Ok(Command::MockBlock {
            address: NetworkAddress::new(required(form, "addr")?),
        }),
        "mockunblock" => Ok(Command::MockUnblock {
            address: NetworkAddress::new(required(form, "addr")?),
        }),
        "addrecipient" => Ok(Command::AddRecipient {
            address: required(form, "addr")?,
        }),
        "blockrecipient" => Ok(Command::BlockRecipient {
            address: required(form, "addr")?,
        }),
        "removerecipient" => Ok(Command::RemoveRecipient {
            address: required(form, "addr")?,
        }),
        "setwatchdoginterval" => Ok(Command::SetWatchdogInterval {
            seconds: required_u64(form, "interval")?,
        }),
        "setthreshold" => Ok(Command::SetThreshold {
            seconds: required_u64(form, "threshold")?,
        }),
        "setwatchdogstatusok" => Ok(Command::SetWatchdogStatusOk),
        "watchdogstatus" => Ok(Command::WatchdogStatus),
        "setpassword" => Ok(Command::SetPassword {
            password: required(form, "pass")?,
        }),
        other => Err(Error::UnknownCommand(other.to_string())),
    }
}

/// Form keys matching `par\d$`, sorted lexicographically, first values.
pub fn collect_params(form: &[(String, String)]) -> Vec<String> {
    static PARAM_RE: OnceLock<Regex> = OnceLock::new();
    let re = PARAM_RE.get_or_init(|| Regex::new(r"par\d$").expect("param regex compiles"));

    let mut params: BTreeMap<&str, &str> = BTreeMap::new();
    for (key, value) in form {
        if re.is_match(key) && !params.contains_key(key.as_str()) {
            params.insert(key, value);
        }
    }
    params.into_values().map(str::to_string).collect()
}

fn first_value<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
    form.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn required(form: &[(String, String)], key: &str) -> Result<String> {
    first_value(form, key)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidArgument(format!("missing form field: {key}")))
}

fn required_u64(form: &[(String, String)], key: &str) -> Result<u64> {
    required(form, key)?
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("{key} must be a number of seconds")))
}

fn flag(form: &[(String, String)], key: &str) -> bool {
    matches!(first_value(form, key), Some("true") | Some("yes") | Some("1"))
}

fn show_raw(form: &[(String, String)]) -> bool {
    first_value(form, "showRaw") == Some("true")
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Executes parsed commands against the monitor and the watchdog.
pub struct CommandEngine {
    monitor: Arc<NetworkMonitor>,
    watchdog: Arc<Watchdog>,
}

impl CommandEngine {
    pub fn new(monitor: Arc<NetworkMonitor>, watchdog: Arc<Watchdog>) -> Self {
        Self { monitor, watchdog }
    }

    pub async fn execute(&self, command: Command) -> Result<CommandOutput> {
        match command {
            Command::Home => Ok(CommandOutput::Json(self.home_view())),

            Command::Rpc {
                target,
                method,
                params,
                show_raw,
                request_path,
            } => {
                self.rpc_pass_through(target, method, params, show_raw, request_path)
                    .await
            }

            Command::ToggleRawMode => {
                let on = self.monitor.toggle_raw_mode();
                Ok(CommandOutput::Text(format!(
                    "raw mode {}",
                    if on { "on" } else { "off" }
                )))
            }

            Command::DiscoverNetwork => {
                let report = self.monitor.discover_network().await?;
                let topology = self.monitor.state().lock().model.topology();
                Ok(CommandOutput::Json(json!({
                    "report": report,
                    "topology": topology,
                })))
            }

            Command::Rescan { insist } => {
                let report = self.monitor.rescan(insist).await?;
                Ok(CommandOutput::Json(serde_json::to_value(report).unwrap_or(Value::Null)))
            }

            Command::Bloop => {
                let report = self.monitor.bloop().await;
                Ok(CommandOutput::Json(serde_json::to_value(report).unwrap_or(Value::Null)))
            }

            Command::Heartbeat => {
                let summary = self.monitor.heartbeat().await?;
                let nodes = self.monitor.state().lock().model.nodes.len();
                Ok(CommandOutput::Text(format!(
                    "Network heartbeat: progressing={} unreachable={} stuck={} over {} nodes",
                    summary.progressing, summary.unreachable, summary.stuck, nodes
                )))
            }

            Command::Peers => Ok(CommandOutput::Json(self.peers_view())),

            Command::DebugOn => {
                self.monitor.set_debug(true);
                Ok(CommandOutput::Text("debug echo on".into()))
            }
            Command::DebugOff => {
                self.monitor.set_debug(false);
                Ok(CommandOutput::Text("debug echo off".into()))
            }

            Command::LoadTemplates => {
                self.watchdog.reload_templates(Path::new(TEMPLATE_DIR));
                Ok(CommandOutput::Text("mail templates reloaded".into()))
            }

            Command::MagicOne => {
                let model = self.monitor.state().lock().model.clone();
                Ok(CommandOutput::Json(json!({
                    "watchdog": self.watchdog.status(),
                    "model": model,
                })))
            }

            Command::RawNodes => {
                let model = self.monitor.state().lock().model.clone();
                Ok(CommandOutput::Json(
                    serde_json::to_value(model).unwrap_or(Value::Null),
                ))
            }

            Command::FullMesh => {
                let report = self.monitor.full_mesh().await?;
                Ok(CommandOutput::Json(serde_json::to_value(report).unwrap_or(Value::Null)))
            }

            Command::JsonNodes => {
                let topology = self.monitor.state().lock().model.topology();
                Ok(CommandOutput::Json(
                    serde_json::to_value(topology).unwrap_or(Value::Null),
                ))
            }

            Command::MockBlock { address } => {
                self.monitor.block_address(address.clone());
                Ok(CommandOutput::Text(format!("blocked {address}")))
            }
            Command::MockUnblock { address } => {
                let removed = self.monitor.unblock_address(&address);
                Ok(CommandOutput::Text(if removed {
                    format!("unblocked {address}")
                } else {
                    format!("{address} was not blocked")
                }))
            }

            Command::AddRecipient { address } => {
                let accepted = self.watchdog.add_recipient(&address);
                Ok(CommandOutput::Text(if accepted {
                    format!("recipient added: {address}")
                } else {
                    format!("rejected invalid recipient: {address}")
                }))
            }
            Command::BlockRecipient { address } => {
                let found = self.watchdog.block_recipient(&address);
                Ok(CommandOutput::Text(if found {
                    format!("recipient muted: {address}")
                } else {
                    format!("no such recipient: {address}")
                }))
            }
            Command::RemoveRecipient { address } => {
                let found = self.watchdog.remove_recipient(&address);
                Ok(CommandOutput::Text(if found {
                    format!("recipient removed: {address}")
                } else {
                    format!("no such recipient: {address}")
                }))
            }

            Command::SetWatchdogInterval { seconds } => {
                self.watchdog.set_interval(seconds);
                Ok(CommandOutput::Text(format!("probe interval set to {seconds}s")))
            }
            Command::SetThreshold { seconds } => {
                self.watchdog.set_threshold(seconds);
                Ok(CommandOutput::Text(format!("progress threshold set to {seconds}s")))
            }
            Command::SetWatchdogStatusOk => {
                self.watchdog.set_status_ok();
                Ok(CommandOutput::Text("watchdog status reset to OK".into()))
            }
            Command::WatchdogStatus => Ok(CommandOutput::Json(
                serde_json::to_value(self.watchdog.status()).unwrap_or(Value::Null),
            )),

            Command::SetPassword { password } => {
                Ok(CommandOutput::SetPassword { password })
            }
        }
    }

    /// One ad-hoc RPC, echoed back for the operator.
    async fn rpc_pass_through(
        &self,
        target: Option<NetworkAddress>,
        method: String,
        params: Vec<String>,
        show_raw: bool,
        request_path: String,
    ) -> Result<CommandOutput> {
        let target = target.unwrap_or_else(|| self.monitor.default_access_address().clone());
        let (global_raw, debug_mode) = {
            let state = self.monitor.state().lock();
            (state.raw_mode, state.debug_mode)
        };

        let mut data = CallData::new(method, target)
            .with_params(params.into_iter().map(Value::String).collect());
        data.raw_mode = show_raw || global_raw;
        data.request_path = request_path;
        self.monitor.rpc_call(&mut data).await?;

        let mut echo = serde_json::Map::new();
        echo.insert("method".into(), json!(data.method));
        echo.insert("target".into(), json!(data.target.as_str()));
        // When the address belongs to a known node, say which one.
        if let Some(identity) = self.monitor.resolve_address(&data.target) {
            let state = self.monitor.state().lock();
            if let Some(node) = state.model.node(&identity) {
                echo.insert("node".into(), json!(node.short_name()));
            }
        }
        if data.parsed {
            echo.insert(
                "result".into(),
                serde_json::to_value(&data.result).unwrap_or(Value::Null),
            );
        } else {
            echo.insert("response".into(), json!(data.json_response));
        }
        if let Some(err) = data.rpc_error() {
            echo.insert(
                "error".into(),
                json!({ "code": err.code, "message": err.message }),
            );
        }
        if debug_mode || data.raw_mode {
            echo.insert("request".into(), json!(data.json_request));
            echo.insert("path".into(), json!(data.request_path));
        }
        Ok(CommandOutput::Json(Value::Object(echo)))
    }

    fn home_view(&self) -> Value {
        let state = self.monitor.state().lock();
        let model = &state.model;
        let nodes: Vec<Value> = model
            .nodes
            .values()
            .map(|node| {
                json!({
                    "name": node.short_name(),
                    "identity": node.identity,
                    "dialect": node.dialect_prefix(),
                    "addresses": node.known_addresses,
                    "reachable": node.reachable,
                    "progressing": node.progressing,
                    "last_block": node.last_block_sample.map(|s| s.number),
                })
            })
            .collect();
        json!({
            "network_id": model.network_id,
            "access_node": model.access_node,
            "node_count": model.nodes.len(),
            "unreachable_addresses": model.unreachable_addresses.len(),
            "nodes": nodes,
        })
    }

    fn peers_view(&self) -> Value {
        let state = self.monitor.state().lock();
        let model = &state.model;
        let mut map = serde_json::Map::new();
        for node in model.nodes.values() {
            let peers: Vec<String> = node
                .peers
                .iter()
                .map(|id| {
                    model
                        .nodes
                        .get(id)
                        .map(|n| n.short_name())
                        .unwrap_or_else(|| id.head(8).to_string())
                })
                .collect();
            map.insert(node.short_name(), json!(peers));
        }
        Value::Object(map)
    }
}
