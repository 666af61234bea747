use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::paxos::messages::{Accepted, Proposal, ProposalNumber, Value};
use crate::paxos::quorum::Quorum;

/// A proposal accepted by a majority of acceptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision<V> {
    pub proposal: Proposal<V>,
    pub acceptors: Vec<String>,
}

/// Counts accept notifications per proposal number and reports when one of
/// them reaches a majority.
pub struct Learner<V> {
    quorum: Quorum,
    votes: BTreeMap<ProposalNumber, (V, BTreeSet<String>)>,
    decisions: Vec<Decision<V>>,
}

impl<V: Value + PartialEq> Learner<V> {
    pub fn new(quorum: Quorum) -> Self {
        Learner {
            quorum,
            votes: BTreeMap::new(),
            decisions: Vec::new(),
        }
    }

    /// The first decision reached, if any.
    pub fn chosen(&self) -> Option<&Decision<V>> {
        self.decisions.first()
    }

    pub fn decisions(&self) -> &[Decision<V>] {
        &self.decisions
    }

    /// Records one notification. Returns a decision the first time its
    /// proposal number gathers a majority.
    pub fn observe(&mut self, msg: Accepted<V>) -> Option<Decision<V>> {
        let Accepted { acceptor, proposal } = msg;
        let (value, voters) = self
            .votes
            .entry(proposal.number)
            .or_insert_with(|| (proposal.value.clone(), BTreeSet::new()));

        if !voters.insert(acceptor) || voters.len() != self.quorum.threshold() {
            return None;
        }

        let decision = Decision {
            proposal: Proposal::new(proposal.number, value.clone()),
            acceptors: voters.iter().cloned().collect(),
        };

        match self.decisions.first() {
            Some(first) if first.proposal.value != decision.proposal.value => {
                error!(
                    first = ?first.proposal,
                    conflicting = ?decision.proposal,
                    "two different values reached a majority"
                );
            }
            Some(_) => {
                info!(number = %decision.proposal.number, "majority confirmed the chosen value again");
            }
            None => {
                info!(
                    number = %decision.proposal.number,
                    value = ?decision.proposal.value,
                    acceptors = ?decision.acceptors,
                    "value chosen"
                );
            }
        }

        self.decisions.push(decision.clone());
        Some(decision)
    }

    /// Consumes notifications until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Accepted<V>>) -> Vec<Decision<V>> {
        while let Some(msg) = rx.recv().await {
            self.observe(msg);
        }
        self.decisions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted(acceptor: &str, round: i64, value: i64) -> Accepted<i64> {
        Accepted {
            acceptor: acceptor.to_string(),
            proposal: Proposal::new(ProposalNumber::new(round), value),
        }
    }

    #[test]
    fn decides_once_a_majority_accepted_the_same_number() {
        let mut learner = Learner::new(Quorum::majority_of(3));
        assert_eq!(learner.observe(accepted("A1", 1, 41)), None);
        // Duplicates do not count twice.
        assert_eq!(learner.observe(accepted("A1", 1, 41)), None);
        // Votes for different numbers are counted apart.
        assert_eq!(learner.observe(accepted("A2", 2, 41)), None);

        let decision = learner.observe(accepted("A3", 1, 41)).unwrap();
        assert_eq!(decision.proposal, Proposal::new(ProposalNumber::new(1), 41));
        assert_eq!(decision.acceptors, vec!["A1".to_string(), "A3".to_string()]);
        assert_eq!(learner.chosen(), Some(&decision));

        // The remaining acceptor does not produce a second decision for the same number.
        assert_eq!(learner.observe(accepted("A2", 1, 41)), None);
        assert_eq!(learner.decisions().len(), 1);
    }

    #[tokio::test]
    async fn run_collects_until_senders_are_gone() {
        let (tx, rx) = mpsc::channel(8);
        let learner = tokio::spawn(Learner::new(Quorum::majority_of(3)).run(rx));
        for name in ["A1", "A2", "A3"] {
            tx.send(accepted(name, 2, 41)).await.unwrap();
        }
        drop(tx);
        let decisions = learner.await.unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].proposal.value, 41);
    }
}
