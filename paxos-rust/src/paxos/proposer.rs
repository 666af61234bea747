use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::config::PaxosConfig;
use crate::error::{PaxosError, Phase, Result};
use crate::network::Roster;
use crate::paxos::messages::{AcceptRequest, PrepareRequest, PrepareResponse, ProposalNumber, Value};

/// What a round did. Phase 2 is never acknowledged, so this only says the
/// value was broadcast, not that it was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundOutcome<V> {
    pub number: ProposalNumber,
    pub value: V,
    /// The value came from a previously accepted proposal.
    pub adopted: bool,
    pub promises: usize,
    pub accepts_sent: usize,
}

/// A single round of the two-phase protocol.
pub struct Proposer<V> {
    name: String,
    number: ProposalNumber,
    value: V,
    roster: Roster<V>,
    config: PaxosConfig,
}

impl<V: Value> Proposer<V> {
    /// `number` must be unique across every concurrently running proposer.
    pub fn new(
        name: &str,
        number: ProposalNumber,
        value: V,
        roster: Roster<V>,
        config: PaxosConfig,
    ) -> Self {
        Proposer {
            name: name.to_string(),
            number,
            value,
            roster,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> ProposalNumber {
        self.number
    }

    pub fn spawn(self) -> JoinHandle<Result<RoundOutcome<V>>> {
        tokio::spawn(self.run())
    }

    /// Runs Phase 1 and, if a majority promised, Phase 2.
    pub async fn run(self) -> Result<RoundOutcome<V>> {
        info!(
            proposer = %self.name,
            number = %self.number,
            value = ?self.value,
            "proposer started"
        );

        let responses = match self.prepare().await {
            Ok(responses) => responses,
            Err(err) => {
                warn!(proposer = %self.name, %err, "proposer terminated");
                return Err(err);
            }
        };
        info!(
            proposer = %self.name,
            promises = responses.len(),
            "received prepare responses from the majority"
        );

        let (value, adopted) = adopt_value(self.value.clone(), &responses);
        if adopted {
            info!(
                proposer = %self.name,
                original = ?self.value,
                adopted = ?value,
                "adopted a previously accepted value"
            );
        }

        let accepts_sent = self.accept(value.clone()).await;
        info!(proposer = %self.name, number = %self.number, ?value, accepts_sent, "proposer finished");

        Ok(RoundOutcome {
            number: self.number,
            value,
            adopted,
            promises: responses.len(),
            accepts_sent,
        })
    }

    async fn prepare(&self) -> Result<Vec<PrepareResponse<V>>> {
        let quorum = self.roster.quorum();
        let (reply_tx, mut reply_rx) = mpsc::channel(self.roster.len());
        let req = PrepareRequest {
            number: self.number,
            reply: reply_tx,
        };

        debug!(proposer = %self.name, number = %self.number, "sending prepare requests");
        let timeout = self.config.send_timeout;
        let sends = self
            .roster
            .endpoints()
            .iter()
            .map(|endpoint| endpoint.send_prepare(req.clone(), timeout));
        let results = join_all(sends).await;
        self.record_broadcast(Phase::Prepare, results);
        // Only in-flight requests hold the reply channel open from here on.
        drop(req);

        let deadline = Instant::now() + self.config.quorum_timeout;
        let mut responses = Vec::with_capacity(quorum.threshold());
        let quorum_failed = |received| PaxosError::QuorumTimeout {
            number: self.number,
            received,
            needed: quorum.threshold(),
        };

        while !quorum.is_reached(responses.len()) {
            match time::timeout_at(deadline, reply_rx.recv()).await {
                Ok(Some(resp)) if resp.number == self.number => {
                    info!(
                        proposer = %self.name,
                        number = %resp.number,
                        accepted = ?resp.accepted.as_ref().map(|p| (p.number, &p.value)),
                        "received a prepare response"
                    );
                    responses.push(resp);
                }
                Ok(Some(resp)) => {
                    debug!(proposer = %self.name, number = %resp.number, "ignored a foreign prepare response");
                }
                Ok(None) => {
                    info!(proposer = %self.name, "no acceptor can answer anymore");
                    return Err(quorum_failed(responses.len()));
                }
                Err(_) => {
                    info!(proposer = %self.name, "timeout while receiving prepare responses");
                    return Err(quorum_failed(responses.len()));
                }
            }
        }

        Ok(responses)
    }

    async fn accept(&self, value: V) -> usize {
        let req = AcceptRequest {
            number: self.number,
            value,
        };
        debug!(proposer = %self.name, ?req, "sending accept requests");

        let timeout = self.config.send_timeout;
        let sends = self
            .roster
            .endpoints()
            .iter()
            .map(|endpoint| endpoint.send_accept(req.clone(), timeout));
        let results = join_all(sends).await;
        self.record_broadcast(Phase::Accept, results)
    }

    /// Logs per-target results of a broadcast and returns how many went out.
    fn record_broadcast(&self, phase: Phase, results: Vec<Result<()>>) -> usize {
        let mut sent = 0;
        for (endpoint, result) in self.roster.endpoints().iter().zip(results) {
            match result {
                Ok(()) => {
                    sent += 1;
                    info!(
                        proposer = %self.name,
                        acceptor = endpoint.name(),
                        number = %self.number,
                        "sent a {} request",
                        phase
                    );
                }
                Err(err) => warn!(proposer = %self.name, %err, "{} request not delivered", phase),
            }
        }
        sent
    }
}

/// Picks the value to send in Phase 2.
///
/// Returns the value of the highest-numbered accepted proposal among
/// `responses`, or `own` if no acceptor has accepted anything. The flag tells
/// whether the value was adopted.
pub fn adopt_value<V: Value>(own: V, responses: &[PrepareResponse<V>]) -> (V, bool) {
    let highest = responses
        .iter()
        .filter_map(|r| r.accepted.as_ref())
        .max_by_key(|p| p.number);

    match highest {
        Some(p) => (p.value.clone(), true),
        None => (own, false),
    }
}
