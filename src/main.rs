use anyhow::{Result, bail};
use clap::Parser;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walletlink::{
    config::Settings,
    data_sources::{InMemorySource, TransactionSource},
    etherscan::EtherscanSource,
    fetch::Fetcher,
    graph_utils::*,
    rate_limiter::RateLimiter,
    summary::LinkSummary,
    traversal::*,
    types::TraceRequest,
};

#[derive(Parser, Debug)]
#[command(about = "Find transaction paths linking wallets to a set of target addresses")]
struct Args {
    #[arg(short, long, default_value = "credentials.yml")]
    config: PathBuf,
    /// Trace over an explorer CSV export instead of calling Etherscan
    #[arg(long)]
    csv: Option<PathBuf>,
    #[arg(short = 'd', long)]
    max_hops: Option<usize>,
    #[arg(short = 'm', long)]
    max_transactions: Option<usize>,
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,
    /// Give up on a start address after this many seconds
    #[arg(short = 't', long)]
    timeout_secs: Option<u64>,
    /// Write every discovered link to a DOT file
    #[arg(long)]
    dot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting walletlink");
    let args = Args::parse();

    let mut settings = Settings::load(&args.config)?;
    if let Some(max_hops) = args.max_hops {
        settings.trace.max_hops = max_hops;
    }
    if let Some(max_transactions) = args.max_transactions {
        settings.trace.max_transactions_per_node = max_transactions;
    }
    if let Some(concurrency) = args.concurrency {
        settings.trace.concurrency = concurrency;
    }
    if args.timeout_secs.is_some() {
        settings.trace.timeout_secs = args.timeout_secs;
    }
    settings.validate()?;

    let request = settings.trace_request()?;
    info!(
        "{} start addresses, {} targets, {} excluded, max {} hops",
        request.start_addresses.len(),
        request.target_addresses.len(),
        request.exclude_addresses.len(),
        request.max_hops
    );

    match &args.csv {
        Some(path) => {
            info!("Initializing InMemorySource from {}", path.display());
            let source = InMemorySource::from_csv(path)?;
            run(source, &settings, &request, &args).await
        }
        None => {
            if !settings.has_api_key() {
                bail!("etherscan.api_key is not configured");
            }
            info!("Initializing EtherscanSource at {}", settings.etherscan.base_url);
            let source = EtherscanSource::new(
                settings.etherscan.base_url.clone(),
                settings.etherscan.api_key.clone(),
                settings.etherscan.sort,
                Duration::from_secs(settings.etherscan.timeout_secs),
            )?;
            run(source, &settings, &request, &args).await
        }
    }
}

async fn run<S: TransactionSource>(
    source: S,
    settings: &Settings,
    request: &TraceRequest,
    args: &Args,
) -> Result<()> {
    let limiter = Arc::new(RateLimiter::new(
        settings.rate_limit.capacity,
        settings.rate_limit.fill_rate,
    ));
    let fetcher = Fetcher::new(source, limiter, settings.retry.policy());
    let tracer = LinkTracer::new(
        fetcher,
        TracerOptions {
            concurrency: settings.trace.concurrency,
            deadline: settings.trace.timeout_secs.map(Duration::from_secs),
            ..Default::default()
        },
    );

    let summaries: Vec<LinkSummary> = tracer.trace_all(request).await;
    for summary in &summaries {
        print!("{}", summary);
    }

    let linked = summaries.iter().filter(|s| s.has_links()).count();
    info!("{} of {} start addresses linked", linked, summaries.len());
    if summaries.iter().any(|s| s.timed_out || !s.dead_ends.is_empty()) {
        warn!("Some traces are incomplete, see warnings above");
    }

    if let Some(path) = &args.dot {
        let graph = build_link_graph(&summaries);
        save_graph_as_dot(&graph, request, path)?;
        info!(
            "Wrote link graph with {} nodes and {} edges to {}",
            graph.node_count(),
            graph.edge_count(),
            path.display()
        );
    }

    Ok(())
}
