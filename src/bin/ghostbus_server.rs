//! GhostBus Server
//!
//! Runs the ingest pipeline, the periodic sweep, and the TCP transport in one
//! process. With `--demo`, a synthetic fleet feeds the pipeline.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ghostbus::feed::{DemoFeed, FeedConfig};
use ghostbus::transport::TcpServer;
use ghostbus::{
    BroadcastHub, Clock, GhostBusConfig, InMemoryRegistry, IngestPipeline, SweepMode, Sweeper,
    SystemClock,
};

/// GhostBus live vehicle fan-out server
#[derive(Parser, Debug)]
#[command(name = "ghostbus-server")]
#[command(about = "Serve classified vehicle positions over TCP (newline-delimited JSON)", long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "127.0.0.1:7400")]
    addr: SocketAddr,

    /// JSON config file (policy, hub, sweep sections)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds of silence before a vehicle is stale (overrides config)
    #[arg(long)]
    stale_after: Option<i64>,

    /// Sweep interval in seconds (overrides config)
    #[arg(long)]
    sweep_interval: Option<u64>,

    /// Per-subscriber queue capacity (overrides config)
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Only broadcast records whose verdict changed on each sweep
    #[arg(long)]
    changed_only: bool,

    /// Feed the pipeline from the synthetic demo fleet
    #[arg(long)]
    demo: bool,

    /// Seed for the demo fleet
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> Result<GhostBusConfig, ghostbus::GhostError> {
    let mut cfg = match &args.config {
        Some(path) => GhostBusConfig::from_json_file(path)?,
        None => GhostBusConfig::default(),
    };
    if let Some(v) = args.stale_after {
        cfg.policy.stale_after_seconds = v;
    }
    if let Some(v) = args.sweep_interval {
        cfg.policy.sweep_interval_seconds = v;
    }
    if let Some(v) = args.queue_capacity {
        cfg.hub.queue_capacity = v;
    }
    if args.changed_only {
        cfg.sweep.mode = SweepMode::Changed;
    }
    cfg.validate()?;
    Ok(cfg)
}

async fn run_demo_feed(pipeline: Arc<IngestPipeline>, mut feed: DemoFeed, interval: Duration) {
    let clock = SystemClock;
    let mut ticker = tokio::time::interval(interval);
    info!(buses = feed.len(), "demo feed started");

    loop {
        ticker.tick().await;
        for update in feed.step(clock.now()) {
            if let Err(err) = pipeline.ingest(&update) {
                warn!(vehicle = %update.id, error = %err, "demo update rejected");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = load_config(&args)?;
    info!("GhostBus Server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        stale_after = cfg.policy.stale_after_seconds,
        stationary_below = cfg.policy.stationary_speed_threshold,
        sweep_interval = cfg.policy.sweep_interval_seconds,
        queue_capacity = cfg.hub.queue_capacity,
        "configuration loaded"
    );

    let pipeline = Arc::new(IngestPipeline::new(
        Arc::new(InMemoryRegistry::new()),
        Arc::new(BroadcastHub::new(cfg.hub.clone())),
        cfg.policy,
        Arc::new(SystemClock),
    ));

    let sweeper = Sweeper::for_policy(Arc::clone(&pipeline), cfg.sweep)?;

    let feed = if args.demo {
        let demo = DemoFeed::new(FeedConfig::default(), args.seed)?;
        let interval = Duration::from_secs(cfg.policy.sweep_interval_seconds);
        Some(tokio::spawn(run_demo_feed(Arc::clone(&pipeline), demo, interval)))
    } else {
        None
    };

    let listener = TcpListener::bind(args.addr).await?;
    info!("Press Ctrl+C to stop");

    TcpServer::new(Arc::clone(&pipeline))
        .serve(listener, async {
            let _ = signal::ctrl_c().await;
        })
        .await?;

    if let Some(handle) = feed {
        handle.abort();
    }
    sweeper.stop();
    info!("Shut down");
    Ok(())
}
