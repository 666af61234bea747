use std::time::Duration;

use thiserror::Error;

use crate::paxos::messages::ProposalNumber;

/// Which phase a request belongs to, used when reporting transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Accept,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Prepare => f.write_str("prepare"),
            Phase::Accept => f.write_str("accept"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PaxosError {
    /// The request number is not high enough for this acceptor. Never sent back to the proposer.
    #[error("stale {phase} request {number} (acceptor has seen {max_number})")]
    StaleRequest {
        phase: Phase,
        number: ProposalNumber,
        max_number: ProposalNumber,
    },

    #[error("timed out after {timeout:?} sending {phase} request to acceptor {acceptor}")]
    SendTimeout {
        acceptor: String,
        phase: Phase,
        timeout: Duration,
    },

    #[error("acceptor {acceptor} is no longer receiving requests")]
    AcceptorStopped { acceptor: String },

    #[error("round {number} failed, no value chosen: {received} of {needed} prepare responses")]
    QuorumTimeout {
        number: ProposalNumber,
        received: usize,
        needed: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ConfigParse(#[from] yaml_rust::ScanError),
}

pub type Result<T> = std::result::Result<T, PaxosError>;
