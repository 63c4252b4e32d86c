//! # CLI Interface
//!
//! Flags for the `chainwatch-server` binary. One command, no subcommands —
//! the server is pointed at a network and left running.

use clap::Parser;
use std::path::PathBuf;

/// chainwatch operator server.
///
/// Monitors a permissioned Ethereum-style network from a single JSON-RPC
/// entry point: discovers the topology, samples block progress, and runs
/// the escalation watchdog. Exposes the operator command surface over HTTP.
#[derive(Parser, Debug)]
#[command(name = "chainwatch-server", about = "chainwatch operator server", version)]
pub struct ServerCli {
    /// Default JSON-RPC access point into the monitored network.
    #[arg(
        long = "eth-rpc-address",
        env = "CHAINWATCH_ETH_RPC",
        default_value = "localhost:8545"
    )]
    pub eth_rpc_address: String,

    /// Port for the operator HTTP surface.
    #[arg(long, env = "CHAINWATCH_HTTP_PORT", default_value_t = 8090)]
    pub http_port: u16,

    /// Port for the TLS surface; 0 disables it.
    #[arg(long, env = "CHAINWATCH_HTTPS_PORT", default_value_t = 0)]
    pub https_port: u16,

    /// TLS certificate chain (PEM). Only read when --https-port is set.
    #[arg(long, default_value = "cert.pem")]
    pub tls_cert: PathBuf,

    /// TLS private key (PEM). Only read when --https-port is set.
    #[arg(long, default_value = "key.pem")]
    pub tls_key: PathBuf,

    /// Answer RPC calls from canned responses instead of dialing out.
    #[arg(long, default_value_t = false)]
    pub mock_mode: bool,

    /// Directory of `{host}_{method}.json` fixtures for mock mode.
    #[arg(long, default_value = "mockjson")]
    pub mock_dir: PathBuf,

    /// Dump every RPC response body to `{host}_{method}.json` in the
    /// working directory.
    #[arg(long, default_value_t = false)]
    pub dump_rpc: bool,

    /// Start the background watchdog loop.
    #[arg(long, default_value_t = false)]
    pub start_watchdog: bool,

    /// Require HTTP basic auth on the command surface.
    #[arg(long, default_value_t = false)]
    pub with_auth: bool,

    /// Directory served under /static/* (also holds the favicon).
    #[arg(long, default_value = "static")]
    pub static_dir: PathBuf,

    /// Default log level when RUST_LOG is not set.
    #[arg(long, env = "CHAINWATCH_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "CHAINWATCH_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        ServerCli::command().debug_assert();
    }

    #[test]
    fn defaults_match_the_documented_interface() {
        let cli = ServerCli::parse_from(["chainwatch-server"]);
        assert_eq!(cli.eth_rpc_address, "localhost:8545");
        assert_eq!(cli.http_port, 8090);
        assert_eq!(cli.https_port, 0);
        assert!(!cli.mock_mode);
        assert!(!cli.dump_rpc);
        assert!(!cli.start_watchdog);
        assert!(!cli.with_auth);
    }
}
