// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # chainwatch — Core Library
//!
//! The monitoring core for small permissioned Ethereum-style networks.
//! Point it at a single JSON-RPC endpoint and it maps the whole mesh:
//! it crawls peer lists across the Geth and Parity admin dialects, keeps a
//! unified node model keyed by stable node identity, samples block-height
//! progress, and runs a watchdog that escalates (and de-escalates) incidents
//! by e-mail exactly on state transitions — no flapping, no alert spam.
//!
//! ## Architecture
//!
//! The modules follow the data path from the wire inward:
//!
//! - **rpc** — JSON-RPC envelopes, the method→shape dispatch table, and the
//!   single serialized call path with timeouts and blocked-address refusal.
//! - **model** — the in-memory network graph: nodes keyed by identity,
//!   addresses, peer edges, block/txpool samples, reachability.
//! - **dialect** — the Geth/Parity capability adapters. New dialects plug in
//!   by implementing one small trait.
//! - **monitor** — shared state, the operation gate, discovery and rescan,
//!   the block sampler, and the full-mesh helper.
//! - **watchdog** — the incident state machine and the periodic probe loop.
//! - **mailer** — the notification seam and the alert/resolution templates.
//! - **commands** — the operator command surface: URL-path shapes parsed
//!   into typed commands and dispatched against the monitor.
//! - **transport** — the seams to the outside world: HTTP transport, clock,
//!   and the small-blob config store. Swap them out and the whole core runs
//!   against canned fixtures (see [`mock`]).
//!
//! ## Design Philosophy
//!
//! 1. One mutex, held briefly: every read or write of the model goes through
//!    a single lock that is never held across I/O.
//! 2. Identities are not addresses. Conflating the two is how monitoring
//!    tools lie to their operators.
//! 3. Notifications fire on transitions, never on states.

pub mod commands;
pub mod config;
pub mod dialect;
pub mod discovery;
pub mod error;
pub mod mailer;
pub mod mock;
pub mod model;
pub mod monitor;
pub mod rpc;
pub mod sampler;
pub mod transport;
pub mod watchdog;

pub use error::{Error, Result};
