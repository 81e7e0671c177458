//! Two-tier cache in front of the search engine.
//!
//! Read path, short-circuiting on first hit: in-process memo map (a resolved
//! value never goes stale), then the persistent store (a hit back-fills the
//! memo map), then a full search whose result is written store-first, then
//! memo. The search itself runs in a detached task: at most one per distinct
//! query per process, concurrent callers subscribe to the same execution via
//! a watch channel, and a caller that stops awaiting does not cancel the
//! search; it still completes and populates both tiers for future callers.
//! A failed search leaves no trace in either tier, so the next call
//! re-attempts cleanly.

use crate::error::{OracleError, ProbeError, Result};
use crate::oracle::CodeOracle;
use crate::search;
use crate::storage::ResultStore;
use alloy::primitives::Address;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;

const CACHE_KEY_NAMESPACE: &str = "deployblock";

/// Identity key for every cache tier. `Address` is a canonical 20-byte value,
/// so case normalization happens at parse time; key rendering always uses
/// lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchQuery {
    pub chain_id: u64,
    pub address: Address,
    pub floor: u64,
}

impl SearchQuery {
    pub fn new(chain_id: u64, address: Address, floor: u64) -> Result<Self> {
        if address == Address::ZERO {
            return Err(ProbeError::InvalidQuery(
                "zero address has no deployment".to_string(),
            ));
        }
        Ok(Self {
            chain_id,
            address,
            floor,
        })
    }

    /// Parse an operator-supplied address string. Rejected before any oracle
    /// call so malformed input never costs an RPC.
    pub fn parse(chain_id: u64, address: &str, floor: u64) -> Result<Self> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(ProbeError::InvalidQuery("empty address".to_string()));
        }
        let parsed = Address::from_str(trimmed)
            .map_err(|err| ProbeError::InvalidQuery(format!("bad address `{trimmed}`: {err}")))?;
        Self::new(chain_id, parsed, floor)
    }

    pub fn cache_key(&self) -> String {
        cache_key(self.chain_id, self.address, self.floor)
    }
}

/// Persistent-store key for a query. Stable across restarts: derived only from
/// the chain id, the lowercase address, and the floor. Public so collaborators
/// can pre-seed or invalidate entries externally.
pub fn cache_key(chain_id: u64, address: Address, floor: u64) -> String {
    format!("{CACHE_KEY_NAMESPACE}:{chain_id}:{address:#x}:{floor}")
}

/// Broadcast slot for one in-flight search: `None` until the detached task
/// settles, then the terminal outcome.
type SearchSlot = Option<Result<u64>>;

/// Process-wide resolver for deployment blocks on one chain.
///
/// Owns the memo and in-flight maps; the oracle and store are injected, never
/// reached for through global state.
pub struct DeploymentBlockCache {
    chain_id: u64,
    oracle: Arc<dyn CodeOracle>,
    store: Option<Arc<dyn ResultStore>>,
    resolved: Arc<DashMap<SearchQuery, u64>>,
    inflight: Arc<DashMap<SearchQuery, watch::Receiver<SearchSlot>>>,
}

impl DeploymentBlockCache {
    pub fn new(
        chain_id: u64,
        oracle: Arc<dyn CodeOracle>,
        store: Option<Arc<dyn ResultStore>>,
    ) -> Self {
        Self {
            chain_id,
            oracle,
            store,
            resolved: Arc::new(DashMap::new()),
            inflight: Arc::new(DashMap::new()),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub async fn resolve(&self, address: Address, floor: u64) -> Result<u64> {
        self.resolve_with(address, floor, false).await
    }

    /// `skip_store` disables the persistent tier for this call, reads and
    /// writes alike; the adapter then acts as an in-memory-only cache. For
    /// execution contexts without usable storage (ephemeral workers).
    pub async fn resolve_with(&self, address: Address, floor: u64, skip_store: bool) -> Result<u64> {
        let query = SearchQuery::new(self.chain_id, address, floor)?;
        if let Some(block) = self.resolved.get(&query) {
            return Ok(*block);
        }

        let mut slot = match self.inflight.entry(query) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(vacant) => {
                // A search may have settled between the memo lookup and
                // taking this entry; its memo insert happens before the
                // in-flight entry is removed, so this re-check closes the gap.
                if let Some(block) = self.resolved.get(&query) {
                    return Ok(*block);
                }
                let (tx, rx) = watch::channel(None);
                vacant.insert(rx.clone());
                let oracle = self.oracle.clone();
                let store = if skip_store { None } else { self.store.clone() };
                let resolved = self.resolved.clone();
                let inflight = self.inflight.clone();
                // Detached on purpose: abandoning callers must not cancel the
                // search, and its result still lands in both tiers.
                tokio::spawn(async move {
                    let outcome = run_search(oracle, store, query).await;
                    if let Ok(block) = &outcome {
                        resolved.insert(query, *block);
                    }
                    inflight.remove(&query);
                    let _ = tx.send(Some(outcome));
                });
                rx
            }
        };

        loop {
            let settled = slot.borrow_and_update().clone();
            if let Some(outcome) = settled {
                return outcome;
            }
            if slot.changed().await.is_err() {
                return Err(ProbeError::Oracle(OracleError::Transport {
                    context: "deployment search".to_string(),
                    message: "search task dropped before reporting".to_string(),
                }));
            }
        }
    }
}

/// One full search execution: store read-through, engine, store write-through.
/// Store failures degrade to a miss here and nowhere else.
async fn run_search(
    oracle: Arc<dyn CodeOracle>,
    store: Option<Arc<dyn ResultStore>>,
    query: SearchQuery,
) -> Result<u64> {
    if let Some(store) = store.clone() {
        if let Some(block) = store_lookup(store, &query).await {
            return Ok(block);
        }
    }
    let block = search::find_deployment_block(query.address, query.floor, oracle.as_ref()).await?;
    if let Some(store) = store {
        store_write(store, &query, block).await;
    }
    Ok(block)
}

// Store implementations are synchronous (sqlite), so every access hops to the
// blocking pool instead of stalling the async executor.

async fn store_lookup(store: Arc<dyn ResultStore>, query: &SearchQuery) -> Option<u64> {
    let key = query.cache_key();
    let lookup_key = key.clone();
    match tokio::task::spawn_blocking(move || store.get(&lookup_key)).await {
        Ok(Ok(Some(raw))) => match raw.trim().parse::<u64>() {
            Ok(block) => Some(block),
            Err(_) => {
                let err = crate::error::StoreError::Malformed { key, value: raw };
                tracing::warn!("[store] {}; treating as miss", err);
                None
            }
        },
        Ok(Ok(None)) => None,
        Ok(Err(err)) => {
            // Storage unavailability degrades to a miss, never to a caller
            // visible failure.
            tracing::warn!("[store] read failed for `{}`: {}; treating as miss", key, err);
            None
        }
        Err(err) => {
            tracing::warn!("[store] read task failed for `{}`: {}", key, err);
            None
        }
    }
}

async fn store_write(store: Arc<dyn ResultStore>, query: &SearchQuery, block: u64) {
    let key = query.cache_key();
    let write_key = key.clone();
    match tokio::task::spawn_blocking(move || store.set(&write_key, &block.to_string())).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::warn!("[store] write failed for `{}`: {}", key, err);
        }
        Err(err) => {
            tracing::warn!("[store] write task failed for `{}`: {}", key, err);
        }
    }
}

// Thin process-wide default for the outermost boundary (the binary installs
// it once after wiring the provider and store). Library code always takes the
// cache explicitly.
static DEFAULT_CACHE: OnceLock<Arc<DeploymentBlockCache>> = OnceLock::new();

pub fn install_default(cache: Arc<DeploymentBlockCache>) -> bool {
    DEFAULT_CACHE.set(cache).is_ok()
}

pub fn default_cache() -> Option<Arc<DeploymentBlockCache>> {
    DEFAULT_CACHE.get().cloned()
}
