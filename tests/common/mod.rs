#![allow(dead_code)]

use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use deployblock::error::{OracleError, StoreError};
use deployblock::oracle::CodeOracle;
use deployblock::storage::ResultStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::time::{sleep, Duration};

/// Synthetic chain: code exists at `address` from `deployed_at` through
/// `head`, absent below; `deployed_at = None` means never deployed. Counts
/// every call so tests can assert probe budgets.
pub struct MockOracle {
    pub head: u64,
    deployed_at: Mutex<Option<u64>>,
    pub head_calls: AtomicUsize,
    pub code_calls: AtomicUsize,
    probe_delay: Duration,
}

impl MockOracle {
    pub fn new(head: u64, deployed_at: Option<u64>) -> Self {
        Self {
            head,
            deployed_at: Mutex::new(deployed_at),
            head_calls: AtomicUsize::new(0),
            code_calls: AtomicUsize::new(0),
            probe_delay: Duration::ZERO,
        }
    }

    /// Rewrites chain history mid-test, e.g. to model a contract appearing
    /// after a failed lookup.
    pub fn set_deployed_at(&self, deployed_at: Option<u64>) {
        *self.deployed_at.lock().unwrap() = deployed_at;
    }

    /// Widens the in-flight window so concurrency tests can overlap calls.
    pub fn with_probe_delay(mut self, probe_delay: Duration) -> Self {
        self.probe_delay = probe_delay;
        self
    }

    pub fn total_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst) + self.code_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeOracle for MockOracle {
    async fn chain_head(&self) -> Result<u64, OracleError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        if !self.probe_delay.is_zero() {
            sleep(self.probe_delay).await;
        }
        Ok(self.head)
    }

    async fn code_at(&self, _address: Address, block_number: u64) -> Result<Bytes, OracleError> {
        self.code_calls.fetch_add(1, Ordering::SeqCst);
        if !self.probe_delay.is_zero() {
            sleep(self.probe_delay).await;
        }
        let deployed_at = *self.deployed_at.lock().unwrap();
        match deployed_at {
            Some(deployed_at) if block_number >= deployed_at => {
                Ok(Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]))
            }
            _ => Ok(Bytes::new()),
        }
    }
}

/// Map-backed store with call counters, for asserting read/write traffic.
#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, String>>,
    pub get_calls: AtomicUsize,
    pub set_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn seed(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn value_of(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }
}

impl ResultStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store whose reads block the calling thread for `delay` when the key
/// contains `slow_fragment`, and answer instantly otherwise. Models sqlite
/// lock contention for executor-starvation tests.
pub struct SlowStore {
    pub slow_fragment: String,
    pub delay: Duration,
}

impl ResultStore for SlowStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if key.contains(&self.slow_fragment) {
            std::thread::sleep(self.delay);
        }
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Store whose medium is gone; every operation errors.
pub struct FailingStore;

impl ResultStore for FailingStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Sqlite {
            context: "get".to_string(),
            message: format!("medium unavailable for `{key}`"),
        })
    }

    fn set(&self, key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Sqlite {
            context: "set".to_string(),
            message: format!("medium unavailable for `{key}`"),
        })
    }
}

pub fn addr(byte: u8) -> Address {
    Address::from([byte; 20])
}
