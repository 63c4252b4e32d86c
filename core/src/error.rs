//! # Error Types
//!
//! Every failure mode of the core, as explicit variants. The split that
//! matters operationally is transport vs everything else: transport-class
//! failures (dial, timeout, bad HTTP status) get an address recorded in the
//! unreachable set, while protocol-level RPC errors and decode mismatches
//! do not — a node that answers with an error object is still alive.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All error kinds produced by the monitoring core.
#[derive(Debug, Error)]
pub enum Error {
    /// The target address is on the blocked list; no connection was opened.
    #[error("address is blocked: {0}")]
    BlockedAddress(String),

    /// Dial failure or per-call timeout. The address is recorded as
    /// unreachable by the caller.
    #[error("unreachable at {address}: {reason}")]
    Unreachable { address: String, reason: String },

    /// The HTTP exchange completed but with a non-200 status.
    #[error("http {status} from {address}")]
    HttpStatus { address: String, status: String },

    /// The response body did not match the shape the dispatch table
    /// expects for the method.
    #[error("cannot decode {method} result: {detail}")]
    Decode { method: String, detail: String },

    /// The RPC response carried an `error` object. Not a transport failure;
    /// the node is reachable and talking, it just refused the call.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The client-version prefix matched no known dialect. The node stays
    /// in the model with its version string only.
    #[error("unsupported client dialect: {0}")]
    UnsupportedDialect(String),

    /// An operation was requested against a node with no usable address.
    #[error("no known address for node {0}")]
    NoAddress(String),

    /// No node in the model matches the given identity or address.
    #[error("no such node: {0}")]
    NoSuchNode(String),

    /// The command surface received a word it does not recognize.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A command argument was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The config store could not read or write a blob.
    #[error("store error: {0}")]
    Store(String),
}

impl Error {
    /// Whether this failure should mark the dialed address unreachable.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Unreachable { .. } | Error::HttpStatus { .. }
        )
    }
}
