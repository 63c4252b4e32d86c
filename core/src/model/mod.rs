//! # Network Model
//!
//! The in-memory picture of the monitored network. [`node`] defines the
//! per-node record and the identity/address newtypes; [`network`] holds the
//! identity-keyed graph container and the topology export.
//!
//! Peers are stored as identities, not references — every traversal goes
//! back through the container, so a mutation made via one path is visible
//! through every other path, and the cyclic peer graph needs no shared
//! ownership tricks.

pub mod network;
pub mod node;

pub use network::{NetworkModel, TopologyExport, VisEdge, VisNode};
pub use node::{
    BlockSample, NetworkAddress, Node, NodeIdentity, NodeOrigin, TxpoolSample,
};
