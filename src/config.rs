use anyhow::{bail, Context};
use std::env;
use std::path::PathBuf;

const DEFAULT_CHAIN_ID: u64 = 1;
const DEFAULT_DB_PATH: &str = "deployments.db";

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub chain_id: u64,
    /// `None` disables the persistent tier entirely.
    pub db_path: Option<PathBuf>,
}

fn env_truthy(name: &str) -> bool {
    env::var(name)
        .ok()
        .map(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}

fn validate_http_url(name: &str, raw: &str) -> anyhow::Result<()> {
    let parsed = raw
        .parse::<reqwest::Url>()
        .with_context(|| format!("{name} must be a valid URL, got `{raw}`"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => bail!("{name} must use http(s) scheme, got `{other}`"),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let rpc_url = env::var("ETH_RPC_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .context("missing required configuration: ETH_RPC_URL")?;
        validate_http_url("ETH_RPC_URL", &rpc_url)?;

        let chain_id = match env::var("CHAIN_ID") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("CHAIN_ID must be a u64, got `{raw}`"))?,
            Err(_) => DEFAULT_CHAIN_ID,
        };

        let db_path = if env_truthy("DEPLOYBLOCK_NO_DB") {
            None
        } else {
            let raw = env::var("DEPLOYBLOCK_DB_PATH")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
            Some(PathBuf::from(raw))
        };

        Ok(Self {
            rpc_url,
            chain_id,
            db_path,
        })
    }
}
