use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time;
use tracing::{debug, info};

use crate::config::{IdlePolicy, PaxosConfig};
use crate::error::{PaxosError, Phase, Result};
use crate::network::Inbox;
use crate::paxos::messages::{
    AcceptRequest, Accepted, PrepareRequest, PrepareResponse, Proposal, ProposalNumber, Request,
    Value,
};

/// The promise/accept bookkeeping of a single acceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptorState<V> {
    /// Highest number promised or accepted. Never decreases.
    pub max_number: ProposalNumber,
    /// Last accepted proposal, `None` until the first accept.
    pub accepted: Option<Proposal<V>>,
}

impl<V: Value> Default for AcceptorState<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Value> AcceptorState<V> {
    pub fn new() -> Self {
        AcceptorState {
            max_number: ProposalNumber::SENTINEL,
            accepted: None,
        }
    }

    /// Promises `number` if it is strictly higher than anything seen so far.
    pub fn on_prepare(&mut self, number: ProposalNumber) -> Result<PrepareResponse<V>> {
        if number <= self.max_number {
            return Err(PaxosError::StaleRequest {
                phase: Phase::Prepare,
                number,
                max_number: self.max_number,
            });
        }
        self.max_number = number;
        Ok(PrepareResponse {
            number,
            accepted: self.accepted.clone(),
        })
    }

    /// Accepts the request unless a higher number was promised in the meantime.
    pub fn on_accept(&mut self, req: AcceptRequest<V>) -> Result<&Proposal<V>> {
        if req.number < self.max_number {
            return Err(PaxosError::StaleRequest {
                phase: Phase::Accept,
                number: req.number,
                max_number: self.max_number,
            });
        }
        self.max_number = req.number;
        let accepted = self.accepted.insert(Proposal {
            number: req.number,
            value: req.value,
        });
        Ok(&*accepted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptorStatus {
    Active,
    Terminated,
}

/// Why an acceptor task stopped serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptorExit {
    IdleTimeout,
    Shutdown,
    /// Every endpoint pointing at this acceptor was dropped.
    Disconnected,
}

/// Returned by a finished acceptor task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptorReport<V> {
    pub name: String,
    pub state: AcceptorState<V>,
    pub exit: AcceptorExit,
}

pub struct Acceptor<V> {
    name: String,
    state: AcceptorState<V>,
    status: AcceptorStatus,
    config: PaxosConfig,
    learner: Option<mpsc::Sender<Accepted<V>>>,
}

impl<V: Value> Acceptor<V> {
    pub fn new(name: &str, config: PaxosConfig) -> Self {
        Acceptor {
            name: name.to_string(),
            state: AcceptorState::new(),
            status: AcceptorStatus::Active,
            config,
            learner: None,
        }
    }

    /// Reports every accepted proposal to `learner`.
    pub fn with_learner(mut self, learner: mpsc::Sender<Accepted<V>>) -> Self {
        self.learner = Some(learner);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &AcceptorState<V> {
        &self.state
    }

    pub fn status(&self) -> AcceptorStatus {
        self.status
    }

    /// Runs the acceptor on its own task, draining `inbox` until it terminates.
    pub fn spawn(self, inbox: Inbox<V>) -> AcceptorHandle<V> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let name = self.name.clone();
        let join = tokio::spawn(self.run(inbox, shutdown_rx));
        AcceptorHandle {
            name,
            shutdown: Some(shutdown_tx),
            join,
        }
    }

    fn idle_timeout(&self) -> Duration {
        if self.state.accepted.is_some() {
            self.config.acceptor_idle_after_accept
        } else {
            self.config.acceptor_idle_timeout
        }
    }

    async fn run(
        mut self,
        mut inbox: Inbox<V>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> AcceptorReport<V> {
        info!(acceptor = %self.name, "acceptor started");

        let exit = loop {
            // Any event, including an ignored request, restarts the idle timer.
            // Queued requests are served before a shutdown or an idle timeout.
            let idle = self.idle_timeout();
            tokio::select! {
                biased;

                req = inbox.recv() => match req {
                    Some(Request::Prepare(req)) => self.handle_prepare(req),
                    Some(Request::Accept(req)) => self.handle_accept(req),
                    None => break AcceptorExit::Disconnected,
                },
                _ = &mut shutdown => break AcceptorExit::Shutdown,
                _ = time::sleep(idle) => match self.config.idle_policy {
                    IdlePolicy::Terminate => {
                        info!(acceptor = %self.name, ?idle, "timeout while waiting for messages");
                        break AcceptorExit::IdleTimeout;
                    }
                    IdlePolicy::KeepAlive => {
                        debug!(acceptor = %self.name, ?idle, "idle, still serving");
                    }
                },
            }
        };

        self.status = AcceptorStatus::Terminated;
        info!(acceptor = %self.name, ?exit, "acceptor terminated");

        AcceptorReport {
            name: self.name,
            state: self.state,
            exit,
        }
    }

    fn handle_prepare(&mut self, req: PrepareRequest<V>) {
        info!(acceptor = %self.name, number = %req.number, "received a prepare request");

        let resp = match self.state.on_prepare(req.number) {
            Ok(resp) => resp,
            Err(err) => {
                info!(acceptor = %self.name, %err, "ignored the prepare request");
                return;
            }
        };

        let accepted = resp.accepted.as_ref().map(|p| (p.number, p.value.clone()));
        match req.reply.try_send(resp) {
            Ok(()) => info!(
                acceptor = %self.name,
                number = %req.number,
                ?accepted,
                "sent a prepare response"
            ),
            Err(err) => debug!(
                acceptor = %self.name,
                number = %req.number,
                %err,
                "prepare response dropped"
            ),
        }
    }

    fn handle_accept(&mut self, req: AcceptRequest<V>) {
        info!(
            acceptor = %self.name,
            number = %req.number,
            value = ?req.value,
            "received an accept request"
        );

        let proposal = match self.state.on_accept(req) {
            Ok(proposal) => proposal.clone(),
            Err(err) => {
                info!(acceptor = %self.name, %err, "ignored the accept request");
                return;
            }
        };
        info!(
            acceptor = %self.name,
            number = %proposal.number,
            value = ?proposal.value,
            "updated the accepted proposal"
        );

        if let Some(learner) = &self.learner {
            let msg = Accepted {
                acceptor: self.name.clone(),
                proposal,
            };
            if let Err(err) = learner.try_send(msg) {
                debug!(acceptor = %self.name, %err, "learner notification dropped");
            }
        }
    }
}

/// Owner-side control of a running acceptor. Dropping it stops the acceptor.
#[derive(Debug)]
pub struct AcceptorHandle<V> {
    name: String,
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<AcceptorReport<V>>,
}

impl<V: Value> AcceptorHandle<V> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Asks the acceptor to stop. Has no effect once it terminated on its own.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    /// Waits for the acceptor to terminate on its own.
    pub async fn join(self) -> std::result::Result<AcceptorReport<V>, JoinError> {
        let AcceptorHandle { join, shutdown, .. } = self;
        let report = join.await;
        drop(shutdown);
        report
    }

    /// Shuts the acceptor down and returns its final report.
    pub async fn stop(mut self) -> std::result::Result<AcceptorReport<V>, JoinError> {
        self.shutdown();
        self.join.await
    }
}
