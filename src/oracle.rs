//! Code-presence oracle over an alloy provider.
//!
//! Two questions, both single RPC calls: what is the current chain head, and
//! does an address carry bytecode at a given block. Historical code lookups go
//! through `raw_request` because `eth_getCode` with an explicit block tag is
//! the portable path across archive providers.

use crate::error::OracleError;
use alloy::network::Network;
use alloy::primitives::{Address, Bytes};
use alloy::providers::Provider;
use alloy::transports::Transport;
use async_trait::async_trait;
use std::borrow::Cow;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::time::{timeout, Duration};

const ORACLE_CALL_TIMEOUT_MS: u64 = 5_000;

fn oracle_call_timeout_ms() -> u64 {
    std::env::var("ORACLE_CALL_TIMEOUT_MS")
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|v| (250..=60_000).contains(v))
        .unwrap_or(ORACLE_CALL_TIMEOUT_MS)
}

/// Non-empty bytecode counts as code present; `0x` decodes to empty and
/// counts as absent.
pub fn is_code(code: &[u8]) -> bool {
    !code.is_empty()
}

fn block_tag(block_number: u64) -> String {
    format!("0x{block_number:x}")
}

#[async_trait]
pub trait CodeOracle: Send + Sync {
    async fn chain_head(&self) -> Result<u64, OracleError>;
    async fn code_at(&self, address: Address, block_number: u64) -> Result<Bytes, OracleError>;
}

/// Alloy-provider-backed oracle with a per-call timeout. No retries: transport
/// failures propagate unchanged and retry policy stays with the caller.
pub struct RpcOracle<P, T, N> {
    provider: Arc<P>,
    call_timeout: Duration,
    _transport: PhantomData<fn() -> (T, N)>,
}

impl<P, T, N> RpcOracle<P, T, N>
where
    T: Transport + Clone,
    N: Network,
    P: Provider<T, N>,
{
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            call_timeout: Duration::from_millis(oracle_call_timeout_ms()),
            _transport: PhantomData,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    async fn bounded<R, F>(&self, context: &str, fut: F) -> Result<R, OracleError>
    where
        F: Future<Output = Result<R, OracleError>> + Send,
    {
        match timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout {
                context: context.to_string(),
                elapsed_ms: self.call_timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl<P, T, N> CodeOracle for RpcOracle<P, T, N>
where
    T: Transport + Clone,
    N: Network,
    P: Provider<T, N>,
{
    async fn chain_head(&self) -> Result<u64, OracleError> {
        let provider = self.provider.clone();
        self.bounded("eth_blockNumber", async move {
            provider
                .get_block_number()
                .await
                .map_err(|err| OracleError::Transport {
                    context: "eth_blockNumber".to_string(),
                    message: err.to_string(),
                })
        })
        .await
    }

    async fn code_at(&self, address: Address, block_number: u64) -> Result<Bytes, OracleError> {
        let context = format!("eth_getCode({address:#x}, {})", block_tag(block_number));
        let provider = self.provider.clone();
        let call_context = context.clone();
        self.bounded(&context, async move {
            let raw: String = provider
                .raw_request(
                    Cow::Borrowed("eth_getCode"),
                    serde_json::json!([address, block_tag(block_number)]),
                )
                .await
                .map_err(|err| OracleError::Transport {
                    context: call_context.clone(),
                    message: err.to_string(),
                })?;
            let bytes = hex::decode(raw.trim_start_matches("0x")).map_err(|err| {
                OracleError::Transport {
                    context: call_context,
                    message: format!("non-hex code payload: {err}"),
                }
            })?;
            Ok(Bytes::from(bytes))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_code_rejects_empty_payloads() {
        assert!(!is_code(&[]));
        assert!(is_code(&[0x60, 0x80]));
    }

    #[test]
    fn test_block_tag_is_minimal_hex() {
        assert_eq!(block_tag(0), "0x0");
        assert_eq!(block_tag(15), "0xf");
        assert_eq!(block_tag(1_000_000), "0xf4240");
    }
}
