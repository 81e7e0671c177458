//! Deployment-block locator for EVM-compatible chains.
//!
//! Given a contract address, finds the earliest block at which bytecode
//! existed at that address using O(log n) `eth_getCode` probes: an exponential
//! descent to a confirmed code-free lower bound followed by a binary search on
//! the remaining window. A two-tier cache sits in front of the search: an
//! in-process memo map with in-flight request deduplication, and an optional
//! sqlite-backed store that survives restarts. Deployment blocks never change
//! once discovered, so entries are cached indefinitely.

pub mod cache;
pub mod config;
pub mod error;
pub mod oracle;
pub mod search;
pub mod storage;
