use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::info;

use crate::config::PaxosConfig;
use crate::error::Result;
use crate::network::{self, LinkFaults, Roster};
use crate::paxos::{Acceptor, AcceptorHandle, AcceptorReport, Accepted, Proposer, ProposalNumber, Value};

/// A fixed set of running acceptors named `A1..An`, plus the roster used to reach them.
pub struct Cluster<V> {
    roster: Roster<V>,
    acceptors: Vec<AcceptorHandle<V>>,
    config: PaxosConfig,
}

impl<V: Value> Cluster<V> {
    pub fn start(size: usize, config: PaxosConfig) -> Result<Self> {
        Self::start_with(size, config, LinkFaults::reliable(), None)
    }

    /// Spawns `size` acceptors. Requests towards them go through `faults`;
    /// every accept is reported to `learner` when one is given.
    pub fn start_with(
        size: usize,
        config: PaxosConfig,
        faults: LinkFaults,
        learner: Option<mpsc::Sender<Accepted<V>>>,
    ) -> Result<Self> {
        let mut endpoints = Vec::with_capacity(size);
        let mut inboxes = Vec::with_capacity(size);
        for i in 1..=size {
            let (endpoint, inbox) =
                network::channel::<V>(&format!("A{}", i), config.channel_capacity);
            endpoints.push(endpoint.with_faults(faults)?);
            inboxes.push(inbox);
        }
        let roster = Roster::new(endpoints)?;

        let acceptors = roster
            .endpoints()
            .iter()
            .zip(inboxes)
            .map(|(endpoint, inbox)| {
                let mut acceptor = Acceptor::new(endpoint.name(), config.clone());
                if let Some(learner) = &learner {
                    acceptor = acceptor.with_learner(learner.clone());
                }
                acceptor.spawn(inbox)
            })
            .collect();

        info!(acceptors = size, majority = roster.quorum().threshold(), "cluster started");
        Ok(Cluster {
            roster,
            acceptors,
            config,
        })
    }

    pub fn roster(&self) -> &Roster<V> {
        &self.roster
    }

    pub fn config(&self) -> &PaxosConfig {
        &self.config
    }

    /// Prepares a round against every acceptor of the cluster.
    pub fn proposer(&self, name: &str, number: ProposalNumber, value: V) -> Proposer<V> {
        Proposer::new(name, number, value, self.roster.clone(), self.config.clone())
    }

    /// Waits for every acceptor to terminate on its own.
    pub async fn join(self) -> std::result::Result<Vec<AcceptorReport<V>>, JoinError> {
        let Cluster {
            roster, acceptors, ..
        } = self;
        let mut reports = Vec::with_capacity(acceptors.len());
        for handle in acceptors {
            reports.push(handle.join().await?);
        }
        drop(roster);
        info!("all acceptors are finished");
        Ok(reports)
    }

    /// Shuts every acceptor down and returns their final reports.
    pub async fn stop(self) -> std::result::Result<Vec<AcceptorReport<V>>, JoinError> {
        let mut reports = Vec::with_capacity(self.acceptors.len());
        for handle in self.acceptors {
            reports.push(handle.stop().await?);
        }
        Ok(reports)
    }
}
