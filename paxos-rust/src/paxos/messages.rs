use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Payload that can be proposed. Opaque to the protocol.
pub trait Value: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> Value for T where T: Clone + fmt::Debug + Send + Sync + 'static {}

/// A totally ordered proposal number.
///
/// Numbers compare by `round` first and by `node` second, so two proposers
/// that pick the same round with distinct node ids never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProposalNumber {
    pub round: i64,
    pub node: u64,
}

impl ProposalNumber {
    /// Lower than every number a proposer can issue.
    pub const SENTINEL: ProposalNumber = ProposalNumber { round: -1, node: 0 };

    pub fn new(round: i64) -> Self {
        ProposalNumber { round, node: 0 }
    }

    pub fn with_node(round: i64, node: u64) -> Self {
        ProposalNumber { round, node }
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

impl From<i64> for ProposalNumber {
    fn from(round: i64) -> Self {
        ProposalNumber::new(round)
    }
}

impl fmt::Display for ProposalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.node == 0 {
            write!(f, "{}", self.round)
        } else {
            write!(f, "{}.{}", self.round, self.node)
        }
    }
}

/// A value bound to the number it was proposed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal<V> {
    pub number: ProposalNumber,
    pub value: V,
}

impl<V> Proposal<V> {
    pub fn new(number: ProposalNumber, value: V) -> Self {
        Proposal { number, value }
    }
}

/// Phase 1a. Carries the round's private reply channel.
#[derive(Debug, Clone)]
pub struct PrepareRequest<V> {
    pub number: ProposalNumber,
    pub reply: mpsc::Sender<PrepareResponse<V>>,
}

/// Phase 1b. `accepted` is `None` when the acceptor never accepted anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareResponse<V> {
    pub number: ProposalNumber,
    pub accepted: Option<Proposal<V>>,
}

/// Phase 2a.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptRequest<V> {
    pub number: ProposalNumber,
    pub value: V,
}

/// Everything an acceptor can be asked. Both phases share one conduit so
/// requests are served in arrival order.
#[derive(Debug, Clone)]
pub enum Request<V> {
    Prepare(PrepareRequest<V>),
    Accept(AcceptRequest<V>),
}

impl<V> Request<V> {
    pub fn number(&self) -> ProposalNumber {
        match self {
            Request::Prepare(req) => req.number,
            Request::Accept(req) => req.number,
        }
    }
}

/// Sent by an acceptor to the learner after it accepted a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accepted<V> {
    pub acceptor: String,
    pub proposal: Proposal<V>,
}
