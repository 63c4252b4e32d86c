//! # JSON-RPC Layer
//!
//! [`methods`] is the table of admin/eth methods the tool knows by name,
//! with case-insensitive canonicalization for the command surface.
//! [`codec`] encodes outbound envelopes and dispatches decoded `result`
//! fields to typed shapes. [`caller`] is the single serialized call path:
//! blocked-address refusal, default-port injection, timeout enforcement
//! and optional response dumping, with the codec at the end.

pub mod caller;
pub mod codec;
pub mod methods;

pub use caller::{CallData, RpcCaller};
pub use codec::{ParsedResult, RpcCommand, RpcEnvelope, RpcErrorObject};
