//! Bounded conduits between proposer rounds and acceptors.
//!
//! Each acceptor owns one [`Inbox`]; every proposer round holds a clone of the
//! matching [`Endpoint`]. Sends are bounded by a timeout and may be dropped or
//! delayed by the link's [`LinkFaults`].

pub mod simulation;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::trace;

use crate::error::{PaxosError, Phase, Result};
use crate::paxos::messages::{AcceptRequest, PrepareRequest, Request, Value};
use crate::paxos::quorum::Quorum;

pub use simulation::LinkFaults;

/// Sending half of an acceptor's conduit. Cheap to clone, safe to share.
#[derive(Debug, Clone)]
pub struct Endpoint<V> {
    name: String,
    tx: mpsc::Sender<Request<V>>,
    faults: LinkFaults,
}

/// Receiving half, drained by exactly one acceptor task.
#[derive(Debug)]
pub struct Inbox<V> {
    rx: mpsc::Receiver<Request<V>>,
}

impl<V> Inbox<V> {
    /// Next request in arrival order, `None` once every endpoint is gone.
    pub async fn recv(&mut self) -> Option<Request<V>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Request<V>> {
        self.rx.try_recv().ok()
    }
}

/// Creates the request conduit of one acceptor.
pub fn channel<V: Value>(name: &str, capacity: usize) -> (Endpoint<V>, Inbox<V>) {
    let (tx, rx) = mpsc::channel(capacity);
    let endpoint = Endpoint {
        name: name.to_string(),
        tx,
        faults: LinkFaults::reliable(),
    };
    (endpoint, Inbox { rx })
}

impl<V: Value> Endpoint<V> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Routes every request through `faults`. Fails if they are out of range.
    pub fn with_faults(mut self, faults: LinkFaults) -> Result<Self> {
        faults.validate()?;
        self.faults = faults;
        Ok(self)
    }

    pub async fn send_prepare(&self, req: PrepareRequest<V>, timeout: Duration) -> Result<()> {
        self.deliver(Request::Prepare(req), Phase::Prepare, timeout)
            .await
    }

    pub async fn send_accept(&self, req: AcceptRequest<V>, timeout: Duration) -> Result<()> {
        self.deliver(Request::Accept(req), Phase::Accept, timeout)
            .await
    }

    async fn deliver(&self, req: Request<V>, phase: Phase, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let timed_out = || PaxosError::SendTimeout {
            acceptor: self.name.clone(),
            phase,
            timeout,
        };

        let delay = self.faults.sample_delay();
        if !delay.is_zero() {
            if delay >= timeout {
                time::sleep_until(deadline).await;
                return Err(timed_out());
            }
            time::sleep(delay).await;
        }

        if self.faults.should_drop() {
            trace!(acceptor = %self.name, %phase, number = %req.number(), "request lost in transit");
            return Ok(());
        }

        match time::timeout_at(deadline, self.tx.send(req)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(PaxosError::AcceptorStopped {
                acceptor: self.name.clone(),
            }),
            Err(_) => Err(timed_out()),
        }
    }
}

/// The fixed set of acceptors a proposer round talks to.
#[derive(Debug, Clone)]
pub struct Roster<V> {
    endpoints: Vec<Endpoint<V>>,
    quorum: Quorum,
}

impl<V: Value> Roster<V> {
    pub fn new(endpoints: Vec<Endpoint<V>>) -> Result<Self> {
        let threshold = Quorum::majority_of(endpoints.len()).threshold();
        Self::with_threshold(endpoints, threshold)
    }

    /// Fails unless `threshold` equals `⌊N/2⌋ + 1` for the given endpoints.
    pub fn with_threshold(endpoints: Vec<Endpoint<V>>, threshold: usize) -> Result<Self> {
        let quorum = Quorum::with_threshold(endpoints.len(), threshold)?;
        Ok(Roster { endpoints, quorum })
    }

    pub fn endpoints(&self) -> &[Endpoint<V>] {
        &self.endpoints
    }

    pub fn quorum(&self) -> Quorum {
        self.quorum
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paxos::messages::ProposalNumber;

    fn accept(n: i64) -> AcceptRequest<i64> {
        AcceptRequest {
            number: ProposalNumber::new(n),
            value: n,
        }
    }

    fn received_accept(req: Option<Request<i64>>) -> Option<AcceptRequest<i64>> {
        match req? {
            Request::Accept(req) => Some(req),
            Request::Prepare(req) => panic!("expected an accept request, got {:?}", req),
        }
    }

    #[tokio::test]
    async fn delivers_on_reliable_link() {
        let (endpoint, mut inbox) = channel::<i64>("A1", 4);
        endpoint
            .send_accept(accept(1), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(received_accept(inbox.recv().await), Some(accept(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn full_conduit_times_out() {
        let (endpoint, _inbox) = channel::<i64>("A1", 1);
        endpoint
            .send_accept(accept(1), Duration::from_millis(10))
            .await
            .unwrap();
        let err = endpoint
            .send_accept(accept(2), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(
            matches!(err, PaxosError::SendTimeout { phase: Phase::Accept, .. }),
            "got {:?}",
            err
        );
    }

    #[tokio::test]
    async fn closed_conduit_reports_stopped_acceptor() {
        let (endpoint, inbox) = channel::<i64>("A1", 1);
        drop(inbox);
        let err = endpoint
            .send_accept(accept(1), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, PaxosError::AcceptorStopped { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn lossy_link_swallows_requests() {
        let (endpoint, mut inbox) = channel::<i64>("A1", 4);
        let endpoint = endpoint.with_faults(LinkFaults::lossy(1.0)).unwrap();
        endpoint
            .send_accept(accept(1), Duration::from_millis(10))
            .await
            .unwrap();
        assert!(inbox.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn delay_longer_than_timeout_times_out() {
        let (endpoint, mut inbox) = channel::<i64>("A1", 4);
        let endpoint = endpoint
            .with_faults(
                LinkFaults::reliable().with_delay(Duration::from_secs(5), Duration::from_secs(5)),
            )
            .unwrap();
        let err = endpoint
            .send_accept(accept(1), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PaxosError::SendTimeout { .. }), "got {:?}", err);
        assert!(inbox.try_recv().is_none());
    }

    #[test]
    fn rejects_faults_out_of_range() {
        let inverted =
            LinkFaults::reliable().with_delay(Duration::from_millis(5), Duration::from_millis(1));
        let (endpoint, _inbox) = channel::<i64>("A1", 1);
        let err = endpoint.clone().with_faults(inverted).unwrap_err();
        assert!(matches!(err, PaxosError::InvalidConfig(_)), "got {:?}", err);
        let err = endpoint.with_faults(LinkFaults::lossy(f64::NAN)).unwrap_err();
        assert!(matches!(err, PaxosError::InvalidConfig(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn prepare_and_accept_keep_arrival_order() {
        let (endpoint, mut inbox) = channel::<i64>("A1", 4);
        let (reply, _reply_rx) = mpsc::channel(1);
        endpoint
            .send_accept(accept(1), Duration::from_millis(10))
            .await
            .unwrap();
        endpoint
            .send_prepare(
                PrepareRequest {
                    number: ProposalNumber::new(2),
                    reply,
                },
                Duration::from_millis(10),
            )
            .await
            .unwrap();
        assert!(matches!(inbox.recv().await, Some(Request::Accept(_))));
        assert!(matches!(inbox.recv().await, Some(Request::Prepare(_))));
    }

    #[test]
    fn roster_rejects_empty_and_wrong_threshold() {
        assert!(Roster::<i64>::new(Vec::new()).is_err());
        let endpoints: Vec<_> = (0..3)
            .map(|i| channel::<i64>(&format!("A{}", i), 1).0)
            .collect();
        assert!(Roster::with_threshold(endpoints.clone(), 3).is_err());
        let roster = Roster::new(endpoints).unwrap();
        assert_eq!(roster.quorum().threshold(), 2);
        assert_eq!(roster.len(), 3);
    }
}
