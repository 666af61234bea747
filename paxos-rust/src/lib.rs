//! Single-decree Paxos over bounded in-process channels.
//!
//! Acceptors and proposer rounds run as independent tokio tasks and only
//! share the messages they exchange.

pub mod cluster;
pub mod config;
pub mod error;
pub mod logging;
pub mod network;
pub mod paxos;

pub use cluster::Cluster;
pub use config::{IdlePolicy, PaxosConfig, ProposerSpec, ScenarioConfig};
pub use error::{PaxosError, Result};
