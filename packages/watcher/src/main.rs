use std::sync::Arc;

use clap::Parser;
use eyre::WrapErr;
use futures::future::try_join_all;
use xdomain_rs::domain::DomainClient;
use xdomain_rs::{DomainEndpoint, RpcDomainClient, TxHash, Watcher};

use xdomain_watcher::config::{Config, EndpointConfig};

/// Wait for the cross-domain relays of bridge transactions
#[derive(Debug, Parser)]
#[command(name = "xdomain-watcher", version, about)]
struct Args {
    /// Source transaction hashes (0x-prefixed)
    #[arg(required = true)]
    tx_hashes: Vec<String>,

    /// Maximum wait per message, overrides TIMEOUT_MS
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Destination confirmations, overrides CONFIRMATIONS
    #[arg(long)]
    confirmations: Option<u64>,

    /// Watch L2 -> L1 (withdrawals) instead of L1 -> L2
    #[arg(long)]
    reverse: bool,

    /// Environment file to load before reading configuration
    #[arg(long, default_value = ".env")]
    env_file: String,
}

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    let args = Args::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(args))
}

async fn async_main(args: Args) -> eyre::Result<()> {
    init_logging();

    let mut config = Config::load_from_file(&args.env_file)?;
    if let Some(timeout_ms) = args.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if let Some(confirmations) = args.confirmations {
        config.confirmations = confirmations.max(1);
    }
    tracing::info!(?config, reverse = args.reverse, "Configuration loaded");

    let tx_hashes = args
        .tx_hashes
        .iter()
        .map(|raw| TxHash::from_hex(raw).wrap_err_with(|| format!("invalid tx hash {}", raw)))
        .collect::<eyre::Result<Vec<_>>>()?;

    let l1 = connect(&config.l1, "l1").await?;
    let l2 = connect(&config.l2, "l2").await?;
    let watcher = Watcher::new(l1, l2, config.to_watcher_config());
    let watcher = if args.reverse {
        watcher.reverse()
    } else {
        watcher
    };

    let timeout = config.timeout();
    let watches = try_join_all(
        tx_hashes
            .iter()
            .map(|tx| watcher.watch_source_tx(tx, timeout)),
    );

    tokio::select! {
        result = watches => {
            let results = result?;
            for result in &results {
                println!("{}", serde_json::to_string_pretty(result)?);
            }
            tracing::info!(transactions = results.len(), "All relays found");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, abandoning waits");
        }
    }
    Ok(())
}

async fn connect(endpoint: &EndpointConfig, name: &str) -> eyre::Result<DomainEndpoint> {
    let client = RpcDomainClient::new(endpoint.rpc_url.clone())
        .wrap_err_with(|| format!("failed to create {} client", name))?;
    let chain_id = client
        .chain_id()
        .await
        .wrap_err_with(|| format!("failed to reach {} domain", name))?;
    tracing::info!(domain = name, chain_id = %chain_id, messenger = %endpoint.messenger, "Domain connected");
    Ok(DomainEndpoint::new(Arc::new(client), endpoint.messenger))
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,xdomain_rs=debug,xdomain_watcher=debug"));

    // Logs go to stderr so stdout carries only the JSON results
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}
