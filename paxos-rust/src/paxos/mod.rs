pub mod acceptor;
pub mod learner;
pub mod messages;
pub mod proposer;
pub mod quorum;

pub use acceptor::{
    Acceptor, AcceptorExit, AcceptorHandle, AcceptorReport, AcceptorState, AcceptorStatus,
};
pub use learner::{Decision, Learner};
pub use messages::{
    AcceptRequest, Accepted, PrepareRequest, PrepareResponse, Proposal, ProposalNumber, Request,
    Value,
};
pub use proposer::{Proposer, RoundOutcome, adopt_value};
pub use quorum::Quorum;
