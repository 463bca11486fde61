//! Stopping logic of a sync, separated from I/O.
//!
//! A `FrontierScan` absorbs pages in feed order and decides, transaction by
//! transaction, whether the previously synced frontier has been reached.
//! It enforces the feed's ordering contract: block heights never increase
//! from one visited transaction to the next, within or across pages.

use crate::{
    error::{FeedError, SyncError, SyncResult},
    feed::FeedTransaction,
    store::LedgerEntry,
    types::{Amount, BlockHeight},
};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    /// The page was consumed entirely; fetch the next one.
    Continue,
    /// A transaction at or below the old watermark was hit.
    FrontierReached,
}

#[derive(Debug)]
pub struct FrontierScan<'a> {
    account_id: &'a str,
    old_sync_block: BlockHeight,
    entries: Vec<LedgerEntry>,
    total_value_change: Amount,
    largest_block_height: Option<BlockHeight>,
    last_height: Option<BlockHeight>,
    seen: HashSet<String>,
}

impl<'a> FrontierScan<'a> {
    pub fn new(account_id: &'a str, old_sync_block: BlockHeight) -> Self {
        Self {
            account_id,
            old_sync_block,
            entries: Vec::new(),
            total_value_change: 0,
            largest_block_height: None,
            last_height: None,
            seen: HashSet::new(),
        }
    }

    pub fn absorb(&mut self, page: Vec<FeedTransaction>) -> SyncResult<ScanStep> {
        for tx in page {
            // Heights are stored as SQLite INTEGER.
            if i64::try_from(tx.block_height).is_err() {
                return Err(FeedError::Malformed(format!(
                    "{} has out-of-range block height {}",
                    tx.hash, tx.block_height
                ))
                .into());
            }
            if let Some(prev) = self.last_height {
                if tx.block_height > prev {
                    return Err(SyncError::FeedInconsistency {
                        detail: format!(
                            "{} at block {} follows block {prev} for {}",
                            tx.hash, tx.block_height, self.account_id
                        ),
                    });
                }
            }
            self.last_height = Some(tx.block_height);

            if tx.block_height <= self.old_sync_block {
                return Ok(ScanStep::FrontierReached);
            }

            if !self.seen.insert(tx.hash.clone()) {
                return Err(SyncError::DuplicateEntry {
                    tx_id: tx.hash,
                    block_height: tx.block_height,
                });
            }

            let value_change = tx.value_change_for(self.account_id)?;
            self.total_value_change = self
                .total_value_change
                .checked_add(value_change)
                .ok_or_else(|| {
                    FeedError::Malformed(format!("running total overflows at {}", tx.hash))
                })?;
            // Newest-first: the first processed transaction is the highest.
            self.largest_block_height.get_or_insert(tx.block_height);
            self.entries.push(LedgerEntry {
                tx_id: tx.hash,
                account_id: self.account_id.to_string(),
                value_change,
                block_height: tx.block_height,
            });
        }
        Ok(ScanStep::Continue)
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn total_value_change(&self) -> Amount {
        self.total_value_change
    }

    /// Watermark to commit: the highest processed height, never below the old one.
    pub fn new_sync_block(&self) -> BlockHeight {
        self.largest_block_height
            .map_or(self.old_sync_block, |h| h.max(self.old_sync_block))
    }

    pub fn into_plan(self) -> CommitPlan {
        let new_sync_block = self.new_sync_block();
        CommitPlan {
            entries: self.entries,
            total_value_change: self.total_value_change,
            new_sync_block,
        }
    }
}

/// What a finished scan wants written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPlan {
    pub entries: Vec<LedgerEntry>,
    pub total_value_change: Amount,
    pub new_sync_block: BlockHeight,
}

impl CommitPlan {
    /// Drop an entry the store already holds, so its delta is not counted
    /// twice. Returns the dropped entry, if it was part of the plan.
    pub fn drop_entry(&mut self, tx_id: &str) -> Option<LedgerEntry> {
        let pos = self.entries.iter().position(|e| e.tx_id == tx_id)?;
        let entry = self.entries.remove(pos);
        self.total_value_change -= entry.value_change;
        Some(entry)
    }

    pub fn is_noop(&self, old_sync_block: BlockHeight) -> bool {
        self.entries.is_empty() && self.new_sync_block == old_sync_block
    }
}
