use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{info, warn};

use single_decree_paxos::{
    Cluster, IdlePolicy, ScenarioConfig, logging,
    paxos::{AcceptorReport, Decision, Learner, RoundOutcome},
};

#[derive(Parser)]
struct Args {
    /// scenario file; the built-in three-proposer race runs without one
    #[clap(long)]
    config: Option<PathBuf>,

    /// default log level, overridden by RUST_LOG
    #[clap(long, default_value = "info")]
    log_level: String,

    /// attach a learner that reports when a value was chosen
    #[clap(long)]
    learner: bool,
}

#[derive(Serialize)]
struct Summary {
    rounds: Vec<RoundSummary>,
    acceptors: Vec<AcceptorReport<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    decisions: Option<Vec<Decision<i64>>>,
}

#[derive(Serialize)]
struct RoundSummary {
    proposer: String,
    outcome: Option<RoundOutcome<i64>>,
    error: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_tracing(&args.log_level);

    let scenario = match &args.config {
        Some(path) => ScenarioConfig::load(path)
            .with_context(|| format!("loading scenario {}", path.display()))?,
        None => ScenarioConfig::default(),
    };

    let (learn_tx, learn_rx) = if args.learner {
        let (tx, rx) = mpsc::channel(scenario.paxos.channel_capacity);
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let cluster = Cluster::<i64>::start_with(
        scenario.acceptors,
        scenario.paxos.clone(),
        scenario.faults,
        learn_tx,
    )?;
    let learner = learn_rx.map(|rx| tokio::spawn(Learner::new(scenario.quorum).run(rx)));

    let rounds: Vec<_> = scenario
        .proposers
        .iter()
        .map(|spec| {
            let proposer = cluster.proposer(&spec.name, spec.number, spec.value);
            let delay = spec.start_delay;
            tokio::spawn(async move {
                time::sleep(delay).await;
                proposer.run().await
            })
        })
        .collect();

    let mut summaries = Vec::with_capacity(rounds.len());
    for (spec, round) in scenario.proposers.iter().zip(rounds) {
        let summary = match round.await? {
            Ok(outcome) => RoundSummary {
                proposer: spec.name.clone(),
                outcome: Some(outcome),
                error: None,
            },
            Err(err) => {
                warn!(proposer = %spec.name, %err, "round failed");
                RoundSummary {
                    proposer: spec.name.clone(),
                    outcome: None,
                    error: Some(err.to_string()),
                }
            }
        };
        summaries.push(summary);
    }
    info!("all proposers are finished");

    let acceptors = match scenario.paxos.idle_policy {
        IdlePolicy::Terminate => cluster.join().await?,
        IdlePolicy::KeepAlive => cluster.stop().await?,
    };
    let decisions = match learner {
        Some(handle) => Some(handle.await?),
        None => None,
    };

    let summary = Summary {
        rounds: summaries,
        acceptors,
        decisions,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
