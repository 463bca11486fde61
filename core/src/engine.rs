//! The reconciliation engine: folds new chain transactions into one
//! account's ledger.
//!
//! SYNC ORDER (per account, never reordered):
//!   1. Read (balance, sync_block): the resume point.
//!   2. Page through the feed newest-first until an empty page or the
//!      old watermark is reached.
//!   3. Commit all new entries with the new balance and watermark in a
//!      single store transaction.
//!
//! RULES:
//!   - No state is cached across calls.
//!   - Nothing is written before step 3; any earlier failure or a
//!     cancellation leaves the account exactly as it was.
//!   - Failures are never retried here.

use crate::{
    config::LedgerConfig,
    error::{StoreError, SyncError, SyncResult},
    feed::{PageCursor, TransactionFeed},
    frontier::{FrontierScan, ScanStep},
    store::LedgerStore,
    types::{AccountId, Amount, BlockHeight},
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncSummary {
    pub account_id: AccountId,
    pub entries_processed: usize,
    /// Entries the store already held below the old watermark.
    pub duplicates_skipped: usize,
    pub pages_fetched: u32,
    pub new_balance: Amount,
    pub new_sync_block: BlockHeight,
}

pub struct ReconciliationEngine<'a, S: LedgerStore + ?Sized, F: TransactionFeed + ?Sized> {
    store: &'a S,
    feed: &'a F,
    page_size: u32,
    max_pages: Option<u32>,
    cancel: Option<&'a AtomicBool>,
}

impl<'a, S: LedgerStore + ?Sized, F: TransactionFeed + ?Sized> ReconciliationEngine<'a, S, F> {
    pub fn new(store: &'a S, feed: &'a F, config: &LedgerConfig) -> Self {
        Self {
            store,
            feed,
            page_size: config.page_size.max(1),
            max_pages: config.max_pages,
            cancel: None,
        }
    }

    /// Observe `flag` between pages; once set, the running sync stops
    /// without committing.
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|f| f.load(Ordering::SeqCst))
    }

    pub fn sync(&self, account_id: &str) -> SyncResult<SyncSummary> {
        let state = self.store.get_account(account_id)?;
        if self.cancelled() {
            return Err(SyncError::Cancelled);
        }

        let mut scan = FrontierScan::new(account_id, state.sync_block);
        let mut cursor = PageCursor::new(self.feed, account_id, self.page_size, self.max_pages);
        for (n, page) in cursor.by_ref().enumerate() {
            let page = page?;
            log::debug!(
                "account={account_id} sync: page {} with {} transactions",
                n + 1,
                page.len()
            );
            let step = match scan.absorb(page) {
                Ok(step) => step,
                Err(e) => {
                    if let SyncError::FeedInconsistency { detail } = &e {
                        log::error!("account={account_id} sync: feed contract violated: {detail}");
                    }
                    return Err(e);
                }
            };
            if step == ScanStep::FrontierReached {
                break;
            }
            if self.cancelled() {
                log::info!("account={account_id} sync: cancelled between pages");
                return Err(SyncError::Cancelled);
            }
        }
        let pages_fetched = cursor.pages_fetched();

        let mut plan = scan.into_plan();
        let mut duplicates_skipped = 0;
        if plan.is_noop(state.sync_block) {
            log::debug!("account={account_id} sync: already at block {}", state.sync_block);
            return Ok(SyncSummary {
                account_id: account_id.to_string(),
                entries_processed: 0,
                duplicates_skipped,
                pages_fetched,
                new_balance: state.balance,
                new_sync_block: state.sync_block,
            });
        }

        // Each pass either commits or removes one already-applied entry,
        // so this ends after at most entries.len() + 1 attempts.
        let new_balance = loop {
            let new_balance = state
                .balance
                .checked_add(plan.total_value_change)
                .ok_or_else(|| SyncError::BalanceOverflow {
                    account_id: account_id.to_string(),
                    balance: state.balance,
                    delta: plan.total_value_change,
                })?;
            match self
                .store
                .commit_sync(account_id, new_balance, plan.new_sync_block, &plan.entries)
            {
                Ok(()) => break new_balance,
                Err(StoreError::DuplicateEntry { tx_id, block_height })
                    if block_height <= state.sync_block =>
                {
                    if plan.drop_entry(&tx_id).is_none() {
                        return Err(SyncError::DuplicateEntry { tx_id, block_height });
                    }
                    log::warn!(
                        "account={account_id} sync: {tx_id} already recorded at block {block_height}, skipping"
                    );
                    duplicates_skipped += 1;
                }
                Err(StoreError::DuplicateEntry { tx_id, block_height }) => {
                    log::error!(
                        "account={account_id} sync: {tx_id} already recorded above watermark at block {block_height}"
                    );
                    return Err(SyncError::DuplicateEntry { tx_id, block_height });
                }
                Err(e) => return Err(e.into()),
            }
        };

        log::info!(
            "account={account_id} sync: {} entries, balance {} -> {new_balance}, block {} -> {}",
            plan.entries.len(),
            state.balance,
            state.sync_block,
            plan.new_sync_block
        );
        Ok(SyncSummary {
            account_id: account_id.to_string(),
            entries_processed: plan.entries.len(),
            duplicates_skipped,
            pages_fetched,
            new_balance,
            new_sync_block: plan.new_sync_block,
        })
    }
}
