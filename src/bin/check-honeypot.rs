use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use honeypot_auditor::{AnvilManager, AuditConfig, Candidate, SessionCoordinator};

/// Audit a single pair on a fresh fork
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Token contract address to check
    #[arg(value_name = "TOKEN_ADDRESS")]
    token: String,

    /// Token/WETH pair address
    #[arg(value_name = "PAIR_ADDRESS")]
    pair: String,

    /// Archive RPC URL to fork from
    #[arg(short, long)]
    rpc: String,

    /// Fork at this block instead of the latest
    #[arg(short, long)]
    block: Option<u64>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("honeypot_auditor=debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("honeypot_auditor=warn")
            .with_writer(std::io::stderr)
            .init();
    }

    let mut config = match &args.config {
        Some(path) => AuditConfig::from_file(path)?,
        None => AuditConfig::default(),
    };
    config.sandbox.fork_url = args.rpc.clone();
    config.sandbox.fork_at_discovery_block = args.block.is_some();
    config.session.max_concurrent_sessions = 1;

    let candidate = Candidate::parse(&args.pair, &args.token, args.block.unwrap_or_default())?;

    if !args.json {
        println!("\n🔍 Honeypot Auditor");
        println!("================================\n");
        println!("🎯 Token: {:?}", candidate.token_address);
        println!("🔗 Pair:  {:?}", candidate.pair_address);
        println!("📡 RPC:   {}\n", args.rpc);
        println!("🚀 Forking and running buy/sell probe...\n");
    }

    let manager = Arc::new(AnvilManager::new(
        config.sandbox.clone(),
        config.probe.receipt_poll_interval(),
    ));
    let coordinator = SessionCoordinator::new(&config, manager.clone())?;

    let report = coordinator.submit(candidate).await?;
    manager.terminate_all().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }

    if report.honeypot {
        std::process::exit(1);
    }

    Ok(())
}
