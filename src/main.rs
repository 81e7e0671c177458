use alloy::providers::ProviderBuilder;
use anyhow::Context;
use deployblock::cache::{self, DeploymentBlockCache, SearchQuery};
use deployblock::config::Config;
use deployblock::oracle::{CodeOracle, RpcOracle};
use deployblock::storage::{ResultStore, SqliteStore};
use std::sync::Arc;

fn print_usage() {
    eprintln!("usage: deployblock [--no-db] <address> [floor]");
    eprintln!("  env: ETH_RPC_URL (required), CHAIN_ID, DEPLOYBLOCK_DB_PATH, DEPLOYBLOCK_NO_DB");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to `info` when RUST_LOG is unset or invalid; logs go to stderr
    // so the resolved block stays alone on stdout.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let no_db_flag = args.iter().any(|a| a == "--no-db");
    args.retain(|a| a != "--no-db");

    let Some(address_raw) = args
        .first()
        .cloned()
        .or_else(|| std::env::var("TARGET_ADDRESS").ok())
    else {
        print_usage();
        anyhow::bail!("no target address supplied");
    };
    let floor = match args.get(1) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("floor must be a block number, got `{raw}`"))?,
        None => 0,
    };

    let cfg = Config::from_env()?;
    let query = SearchQuery::parse(cfg.chain_id, &address_raw, floor)?;

    let url = cfg
        .rpc_url
        .parse::<reqwest::Url>()
        .context("ETH_RPC_URL failed to parse")?;
    let provider = Arc::new(ProviderBuilder::new().on_http(url));
    let oracle: Arc<dyn CodeOracle> = Arc::new(RpcOracle::new(provider));

    let store: Option<Arc<dyn ResultStore>> = match cfg.db_path.as_ref() {
        Some(path) if !no_db_flag => match SqliteStore::open(path) {
            Ok(store) => Some(Arc::new(store)),
            Err(err) => {
                tracing::warn!(
                    "[startup] sqlite store at {} unavailable: {}; continuing without persistence",
                    path.display(),
                    err
                );
                None
            }
        },
        _ => None,
    };

    // Install once at the boundary; everything below goes through the
    // process-wide default handle.
    cache::install_default(Arc::new(DeploymentBlockCache::new(
        cfg.chain_id,
        oracle,
        store,
    )));
    let resolver = cache::default_cache().context("default resolver not installed")?;

    tracing::info!(
        "[probe] chain {} address {:#x} floor {}",
        cfg.chain_id,
        query.address,
        query.floor
    );
    let block = resolver
        .resolve_with(query.address, query.floor, no_db_flag)
        .await?;
    println!("{block}");
    Ok(())
}
