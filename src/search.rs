//! Deployment-block search engine.
//!
//! Pure function of (address, floor, oracle): no long-lived state, no caching.
//! The strategy is exponential descent from the chain head until a block with
//! no code is found, then binary search on the remaining `(lo, hi]` window.
//! Total probe count is O(log n) in the distance between the head and the true
//! deployment block, which is optimal for a has-code/no-code oracle.
//!
//! Known limitation: the search assumes code presence is monotonic from the
//! deployment block onward. A contract that self-destructs and is later
//! redeployed at the same address violates that assumption and the search may
//! converge on the redeploy boundary instead of the original deployment.

use crate::error::{ProbeError, Result};
use crate::oracle::{is_code, CodeOracle};
use alloy::primitives::Address;

/// Find the earliest block at or above `floor` with code at `address`.
///
/// Fails with [`ProbeError::NotDeployed`] when the address has no code at the
/// current chain head; that check runs before any search work. Oracle failures
/// propagate unchanged, with no internal retries and no partial results.
///
/// `floor` is trusted as asserted: if code is already present there, it is
/// returned immediately without checking whether an earlier deployment exists
/// below it.
pub async fn find_deployment_block(
    address: Address,
    floor: u64,
    oracle: &dyn CodeOracle,
) -> Result<u64> {
    let latest = oracle.chain_head().await?;
    if !is_code(&oracle.code_at(address, latest).await?) {
        return Err(ProbeError::NotDeployed(address));
    }

    if floor > 0 && is_code(&oracle.code_at(address, floor).await?) {
        tracing::debug!(
            "[search] floor {} already has code for {:#x}; skipping search",
            floor,
            address
        );
        return Ok(floor);
    }

    // Invariant from here on: `lo` has no code (floor is either 0 or was just
    // probed absent), `hi` has code.
    let mut lo = floor;
    let mut hi = latest;
    let mut probes = 0usize;

    // Exponential descent: double the backward step until a code-free block
    // lands inside the window. The deployment may be arbitrarily far below
    // the head, so fixed-size steps would degrade to a linear scan.
    let mut step: u64 = 1;
    while hi.saturating_sub(step) > lo {
        let probe = hi - step;
        probes += 1;
        if is_code(&oracle.code_at(address, probe).await?) {
            hi = probe;
            step = step.saturating_mul(2);
        } else {
            lo = probe;
            break;
        }
    }

    // Binary search on (lo, hi]; terminates with lo and hi adjacent and hi
    // the first block with code.
    while lo + 1 < hi {
        let mid = lo + (hi - lo) / 2;
        probes += 1;
        if is_code(&oracle.code_at(address, mid).await?) {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    tracing::debug!(
        "[search] {:#x} deployed at block {} (head {}, {} probe(s))",
        address,
        hi,
        latest,
        probes
    );
    Ok(hi)
}
