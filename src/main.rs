//! Auditor daemon: candidates in as JSON lines on stdin, reports out as JSON
//! lines on stdout. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use honeypot_auditor::{AnvilManager, AuditConfig, AuditError, Candidate, Result, SessionCoordinator};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

/// Fork-based honeypot auditor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Archive RPC the sandboxes fork from
    #[arg(short, long)]
    rpc: Option<String>,

    /// Forking node binary
    #[arg(long)]
    anvil: Option<PathBuf>,

    /// Maximum concurrent sandboxes
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Per-step timeout in milliseconds
    #[arg(long)]
    step_timeout_ms: Option<u64>,

    /// Print human-readable reports instead of JSON lines
    #[arg(long)]
    pretty: bool,

    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn build_config(args: &Args) -> Result<AuditConfig> {
    let mut config = match &args.config {
        Some(path) => AuditConfig::from_file(path)?,
        None => AuditConfig::default(),
    };

    if let Some(rpc) = &args.rpc {
        config.sandbox.fork_url = rpc.clone();
    }
    if let Some(anvil) = &args.anvil {
        config.sandbox.node_binary = anvil.clone();
    }
    if let Some(concurrency) = args.concurrency {
        config.session.max_concurrent_sessions = concurrency;
    }
    if let Some(step_timeout_ms) = args.step_timeout_ms {
        config.probe.step_timeout_ms = step_timeout_ms;
    }

    config.validate()?;
    Ok(config)
}

/// Feed stdin lines into the queue until EOF or the receiver goes away.
async fn read_candidates(queue: mpsc::Sender<Candidate>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("stdin read failed: {}", e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Candidate>(&line) {
            Ok(candidate) => {
                if queue.send(candidate).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!("Skipping malformed candidate {:?}: {}", line, e),
        }
    }

    tracing::debug!("Candidate input closed");
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        "honeypot_auditor=debug"
    } else {
        "honeypot_auditor=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = build_config(&args)?;
    if config.sandbox.fork_url.is_empty() {
        tracing::warn!("No fork URL configured, sandboxes will start from an empty chain");
    }

    let manager = Arc::new(AnvilManager::new(
        config.sandbox.clone(),
        config.probe.receipt_poll_interval(),
    ));
    let coordinator = Arc::new(SessionCoordinator::new(&config, manager.clone())?);

    tracing::info!(
        "🔍 Auditor ready: {} slots, step timeout {:?}",
        config.session.max_concurrent_sessions,
        config.probe.step_timeout()
    );

    let (queue, rx) = mpsc::channel::<Candidate>(256);
    tokio::spawn(read_candidates(queue));

    let (stop_tx, stop_rx) = watch::channel(false);
    {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                coordinator.shutdown();
                let _ = stop_tx.send(true);
            }
        });
    }

    let candidates = futures::stream::unfold((rx, stop_rx), |(mut rx, mut stop)| async move {
        if *stop.borrow() {
            return None;
        }
        tokio::select! {
            candidate = rx.recv() => candidate.map(|c| (c, (rx, stop))),
            Ok(()) = stop.changed() => None,
        }
    });

    let reports = coordinator.submit_all(candidates);
    tokio::pin!(reports);

    while let Some((candidate, result)) = reports.next().await {
        match result {
            Ok(report) if args.pretty => println!("{}", report),
            Ok(report) => println!("{}", serde_json::to_string(&report)?),
            Err(AuditError::Cancelled) => tracing::debug!("Dropped {} on shutdown", candidate),
            Err(e) => tracing::error!("{}: {}", candidate, e),
        }
    }

    manager.terminate_all().await;

    let stats = coordinator.stats();
    tracing::info!(
        "Done: {} submitted, {} completed, {} failed, {} retries, {} cancelled",
        stats.submitted,
        stats.completed,
        stats.failed,
        stats.retries,
        stats.cancelled
    );

    Ok(())
}
