//! Persistent result storage.

pub mod deployments_db;

pub use deployments_db::SqliteStore;

use crate::error::StoreError;

/// Durable key-value storage for discovered deployment blocks. Values are
/// decimal text; keys come from [`crate::cache::cache_key`]. Errors are
/// returned, not swallowed; the cache adapter decides what to do with them.
pub trait ResultStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}
