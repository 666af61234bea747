use std::{fs, path::Path, time::Duration};

use yaml_rust::{Yaml, YamlLoader};

use crate::error::{PaxosError, Result};
use crate::network::simulation::LinkFaults;
use crate::paxos::messages::ProposalNumber;
use crate::paxos::quorum::Quorum;

/// What an acceptor does when no request arrived within its idle timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdlePolicy {
    /// Stop serving for good.
    #[default]
    Terminate,
    /// Log a heartbeat and keep serving until shut down explicitly.
    KeepAlive,
}

impl IdlePolicy {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "terminate" => Ok(IdlePolicy::Terminate),
            "keep-alive" | "keep_alive" => Ok(IdlePolicy::KeepAlive),
            other => Err(PaxosError::InvalidConfig(format!(
                "invalid idle_policy `{}`",
                other
            ))),
        }
    }
}

/// Timeouts and buffer sizes shared by every proposer and acceptor.
#[derive(Debug, Clone)]
pub struct PaxosConfig {
    /// Bound on a single enqueue towards one acceptor.
    pub send_timeout: Duration,
    /// Bound on collecting a majority of prepare responses.
    pub quorum_timeout: Duration,
    /// Idle timeout of an acceptor that has not accepted anything yet.
    pub acceptor_idle_timeout: Duration,
    /// Idle timeout once the acceptor holds an accepted proposal.
    pub acceptor_idle_after_accept: Duration,
    /// Capacity of each acceptor's request channels.
    pub channel_capacity: usize,
    pub idle_policy: IdlePolicy,
}

impl Default for PaxosConfig {
    fn default() -> Self {
        PaxosConfig {
            send_timeout: Duration::from_secs(10),
            quorum_timeout: Duration::from_secs(10),
            acceptor_idle_timeout: Duration::from_secs(10),
            acceptor_idle_after_accept: Duration::from_secs(3),
            channel_capacity: 1024,
            idle_policy: IdlePolicy::Terminate,
        }
    }
}

/// One proposer round started by the demo driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposerSpec {
    pub name: String,
    pub number: ProposalNumber,
    pub value: i64,
    pub start_delay: Duration,
}

impl ProposerSpec {
    pub fn new(name: &str, round: i64, value: i64) -> Self {
        ProposerSpec {
            name: name.to_string(),
            number: ProposalNumber::new(round),
            value,
            start_delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }
}

/// Everything the demo binary needs to run a cluster.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub acceptors: usize,
    pub quorum: Quorum,
    pub paxos: PaxosConfig,
    pub faults: LinkFaults,
    pub proposers: Vec<ProposerSpec>,
}

impl Default for ScenarioConfig {
    /// Three acceptors, P1 and P2 racing, P3 a second later.
    fn default() -> Self {
        ScenarioConfig {
            acceptors: 3,
            quorum: Quorum::majority_of(3),
            paxos: PaxosConfig::default(),
            faults: LinkFaults::default(),
            proposers: vec![
                ProposerSpec::new("P1", 1, 41),
                ProposerSpec::new("P2", 2, 42),
                ProposerSpec::new("P3", 3, 10).delayed(Duration::from_secs(1)),
            ],
        }
    }
}

impl ScenarioConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(&path)?;
        Self::from_yaml_str(&s)
    }

    /// Parses a YAML document. Missing keys fall back to the defaults.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let docs = YamlLoader::load_from_str(s)?;
        let Some(doc) = docs.first() else {
            return Ok(ScenarioConfig::default());
        };
        let defaults = ScenarioConfig::default();

        let acceptors = match optional_u64(&doc["acceptors"], "acceptors")? {
            Some(n) => n as usize,
            None => defaults.acceptors,
        };
        if acceptors == 0 {
            return Err(PaxosError::InvalidConfig(
                "at least one acceptor is required".to_string(),
            ));
        }
        let quorum = match optional_u64(&doc["majority"], "majority")? {
            Some(threshold) => Quorum::with_threshold(acceptors, threshold as usize)?,
            None => Quorum::majority_of(acceptors),
        };

        let t = &doc["timeouts"];
        let d = &defaults.paxos;
        let mut paxos = PaxosConfig {
            send_timeout: millis_or(&t["send_ms"], "timeouts.send_ms", d.send_timeout)?,
            quorum_timeout: millis_or(&t["quorum_ms"], "timeouts.quorum_ms", d.quorum_timeout)?,
            acceptor_idle_timeout: millis_or(
                &t["acceptor_idle_ms"],
                "timeouts.acceptor_idle_ms",
                d.acceptor_idle_timeout,
            )?,
            acceptor_idle_after_accept: millis_or(
                &t["acceptor_idle_after_accept_ms"],
                "timeouts.acceptor_idle_after_accept_ms",
                d.acceptor_idle_after_accept,
            )?,
            channel_capacity: d.channel_capacity,
            idle_policy: d.idle_policy,
        };
        if let Some(cap) = optional_u64(&doc["channel_capacity"], "channel_capacity")? {
            if cap == 0 {
                return Err(PaxosError::InvalidConfig(
                    "channel_capacity must be positive".to_string(),
                ));
            }
            paxos.channel_capacity = cap as usize;
        }
        if let Some(policy) = doc["idle_policy"].as_str() {
            paxos.idle_policy = IdlePolicy::parse(policy)?;
        }

        let faults = parse_faults(&doc["network"])?;

        let proposers = match doc["proposers"].as_vec() {
            Some(raw) => raw
                .iter()
                .enumerate()
                .map(|(i, e)| parse_proposer(i, e))
                .collect::<Result<Vec<_>>>()?,
            None => defaults.proposers,
        };

        Ok(ScenarioConfig {
            acceptors,
            quorum,
            paxos,
            faults,
            proposers,
        })
    }
}

fn parse_faults(n: &Yaml) -> Result<LinkFaults> {
    let mut faults = LinkFaults::default();
    if n.is_badvalue() {
        return Ok(faults);
    }
    if let Some(rate) = optional_f64(&n["drop_rate"], "network.drop_rate")? {
        faults.drop_rate = rate;
    }
    if let Some(min) = optional_u64(&n["min_delay_ms"], "network.min_delay_ms")? {
        faults.min_delay = Duration::from_millis(min);
    }
    if let Some(max) = optional_u64(&n["max_delay_ms"], "network.max_delay_ms")? {
        faults.max_delay = Duration::from_millis(max);
    }
    faults.validate()?;
    Ok(faults)
}

fn parse_proposer(index: usize, e: &Yaml) -> Result<ProposerSpec> {
    let name = match e["name"].as_str() {
        Some(name) => name.to_string(),
        None => format!("P{}", index + 1),
    };
    let round = e["number"].as_i64().ok_or_else(|| {
        PaxosError::InvalidConfig(format!("proposer {} is missing an integer `number`", name))
    })?;
    if round < 0 {
        return Err(PaxosError::InvalidConfig(format!(
            "proposer {} has negative number {}",
            name, round
        )));
    }
    let node = optional_u64(&e["node"], "proposers.node")?.unwrap_or(0);
    let value = e["value"].as_i64().ok_or_else(|| {
        PaxosError::InvalidConfig(format!("proposer {} is missing an integer `value`", name))
    })?;
    let start_delay = millis_or(&e["start_delay_ms"], "proposers.start_delay_ms", Duration::ZERO)?;

    Ok(ProposerSpec {
        name,
        number: ProposalNumber::with_node(round, node),
        value,
        start_delay,
    })
}

fn optional_u64(y: &Yaml, key: &str) -> Result<Option<u64>> {
    if y.is_badvalue() {
        return Ok(None);
    }
    match y.as_i64() {
        Some(v) if v >= 0 => Ok(Some(v as u64)),
        _ => Err(PaxosError::InvalidConfig(format!(
            "`{}` must be a non-negative integer",
            key
        ))),
    }
}

fn optional_f64(y: &Yaml, key: &str) -> Result<Option<f64>> {
    if y.is_badvalue() {
        return Ok(None);
    }
    y.as_f64()
        .or_else(|| y.as_i64().map(|v| v as f64))
        .map(Some)
        .ok_or_else(|| PaxosError::InvalidConfig(format!("`{}` must be a number", key)))
}

fn millis_or(y: &Yaml, key: &str, default: Duration) -> Result<Duration> {
    Ok(optional_u64(y, key)?
        .map(Duration::from_millis)
        .unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = ScenarioConfig::from_yaml_str("").unwrap();
        assert_eq!(cfg.acceptors, 3);
        assert_eq!(cfg.quorum.threshold(), 2);
        assert_eq!(cfg.proposers.len(), 3);
        assert_eq!(cfg.paxos.send_timeout, Duration::from_secs(10));
        assert_eq!(cfg.paxos.acceptor_idle_after_accept, Duration::from_secs(3));
    }

    #[test]
    fn parses_full_scenario() {
        let yaml = r#"
acceptors: 5
majority: 3
channel_capacity: 16
idle_policy: keep-alive
timeouts:
  send_ms: 50
  quorum_ms: 200
  acceptor_idle_ms: 1000
  acceptor_idle_after_accept_ms: 300
network:
  drop_rate: 0.25
  min_delay_ms: 1
  max_delay_ms: 5
proposers:
  - name: alpha
    number: 4
    node: 2
    value: 7
    start_delay_ms: 100
  - number: 5
    value: 8
"#;
        let cfg = ScenarioConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.acceptors, 5);
        assert_eq!(cfg.quorum.threshold(), 3);
        assert_eq!(cfg.paxos.channel_capacity, 16);
        assert_eq!(cfg.paxos.idle_policy, IdlePolicy::KeepAlive);
        assert_eq!(cfg.paxos.quorum_timeout, Duration::from_millis(200));
        assert_eq!(cfg.faults.drop_rate, 0.25);
        assert_eq!(cfg.faults.max_delay, Duration::from_millis(5));
        assert_eq!(
            cfg.proposers[0],
            ProposerSpec {
                name: "alpha".to_string(),
                number: ProposalNumber::with_node(4, 2),
                value: 7,
                start_delay: Duration::from_millis(100),
            }
        );
        assert_eq!(cfg.proposers[1].name, "P2");
    }

    #[test]
    fn rejects_wrong_majority() {
        let err = ScenarioConfig::from_yaml_str("acceptors: 4\nmajority: 2\n").unwrap_err();
        assert!(matches!(err, PaxosError::InvalidConfig(_)), "got {:?}", err);
    }

    #[test]
    fn rejects_unknown_idle_policy() {
        let err = ScenarioConfig::from_yaml_str("idle_policy: forever\n").unwrap_err();
        assert!(matches!(err, PaxosError::InvalidConfig(_)), "got {:?}", err);
    }

    #[test]
    fn rejects_proposer_without_number() {
        let err = ScenarioConfig::from_yaml_str("proposers:\n  - value: 1\n").unwrap_err();
        assert!(matches!(err, PaxosError::InvalidConfig(_)), "got {:?}", err);
    }
}
