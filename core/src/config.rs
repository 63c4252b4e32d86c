//! # Core Constants
//!
//! Defaults and magic values for the monitoring core. Everything tunable at
//! runtime (probe interval, progress threshold) starts from the defaults
//! here; everything else is a fixed property of the wire protocol or the
//! on-disk layout.

use std::time::Duration;

// ---------------------------------------------------------------------------
// RPC
// ---------------------------------------------------------------------------

/// Port appended to a target address that carries none.
pub const DEFAULT_RPC_PORT: u16 = 8545;

/// Default access point when no entry address is configured.
pub const DEFAULT_ACCESS_ADDRESS: &str = "localhost:8545";

/// Per-call timeout, measured from dispatch. Not tunable per target.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(3);

/// User-Agent header on outbound JSON-RPC requests.
pub const DEFAULT_USER_AGENT: &str = concat!("chainwatch/", env!("CARGO_PKG_VERSION"));

/// Port baked into the enode URLs the full-mesh command hands to
/// `admin_addPeer`. The networks this tool grew up on ran their P2P
/// listeners one port above the conventional 30303.
pub const MESH_P2P_PORT: u16 = 30304;

// ---------------------------------------------------------------------------
// Watchdog
// ---------------------------------------------------------------------------

/// Time between watchdog probes until an operator tunes it.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Grace window for a non-advancing block number. A node whose latest
/// sample is older than this without progress is considered stuck.
pub const DEFAULT_PROGRESS_THRESHOLD: Duration = Duration::from_secs(15);

/// File name of the persisted watchdog configuration.
pub const WATCHDOG_CONFIG_FILE: &str = "watchdog.config.json";

// ---------------------------------------------------------------------------
// Server-side file layout
// ---------------------------------------------------------------------------

/// File name of the basic-auth credential map.
pub const PASSWD_FILE: &str = "http.passwd.json";

/// Directory the mock transport reads canned responses from.
pub const MOCK_DIR: &str = "mockjson";

/// Directory holding the override mail templates, if any.
pub const TEMPLATE_DIR: &str = "templates";

/// Marker value reported by `bloop` for a node that could not be sampled.
pub const UNREACHABLE_MARKER: &str = "UNREACHABLE!!!";
