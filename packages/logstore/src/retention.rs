//! Size-bounded retention over the log table.
//!
//! When the store grows past its budget, the oldest fifth of the rows is
//! evicted in one batch. Batching keeps the delete query cheap enough to
//! run from a scheduler without noticeable stalls.

use tracing::info;

use crate::error::Result;
use crate::store::LogStore;

/// Share of total rows removed per eviction.
const EVICT_FRACTION: f64 = 0.2;

/// Evictions smaller than this are not worth a delete query.
const MIN_EVICTIONS: i64 = 5;

/// When cleanup runs.
///
/// With a byte budget configured the store's measured size drives the
/// trigger; otherwise the row count does. Exactly one of the two is
/// consulted per run.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Row-count trigger, used when `max_bytes` is unset.
    pub max_rows: i64,
    /// Byte-size trigger. Takes precedence when set.
    pub max_bytes: Option<u64>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy {
            max_rows: 10_000,
            max_bytes: Some(500 * 1024 * 1024),
        }
    }
}

impl RetentionPolicy {
    /// Policy driven purely by row count.
    pub fn rows_only(max_rows: i64) -> Self {
        RetentionPolicy {
            max_rows,
            max_bytes: None,
        }
    }
}

/// What a cleanup pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Store empty or within budget.
    Skipped,
    /// Over budget, but the batch would be too small to bother.
    BelowMinimum,
    /// Oldest rows deleted.
    Evicted { deleted: u64 },
}

impl CleanupOutcome {
    /// Rows removed by this pass.
    pub fn deleted(&self) -> u64 {
        match self {
            CleanupOutcome::Evicted { deleted } => *deleted,
            _ => 0,
        }
    }
}

/// Runs one retention pass. Safe to call repeatedly; a store within budget
/// is left untouched.
pub async fn cleanup(store: &LogStore, policy: &RetentionPolicy) -> Result<CleanupOutcome> {
    let total = store.count().await?;
    if total == 0 {
        return Ok(CleanupOutcome::Skipped);
    }

    let over_budget = match policy.max_bytes {
        Some(max_bytes) => store.size_bytes().await? > max_bytes,
        None => total > policy.max_rows,
    };
    if !over_budget {
        return Ok(CleanupOutcome::Skipped);
    }

    let to_delete = (total as f64 * EVICT_FRACTION) as i64;
    if to_delete < MIN_EVICTIONS {
        return Ok(CleanupOutcome::BelowMinimum);
    }

    let deleted = store.delete_oldest(to_delete).await?;
    info!(deleted, remaining = total - deleted as i64, "evicted oldest log rows");
    Ok(CleanupOutcome::Evicted { deleted })
}
