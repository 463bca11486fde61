//! Account service: batch entry points over the store and the engine.
//!
//! RULES:
//!   - Accounts are handled strictly in the order given, one at a time.
//!   - A sync failure on one account never stops the rest of the batch.
//!   - Every outcome is recorded in the event log under one batch id.

use crate::{
    config::LedgerConfig,
    engine::{ReconciliationEngine, SyncSummary},
    error::{StoreError, StoreResult, SyncErrorKind, SyncResult},
    event::{EventLogEntry, LedgerEvent},
    feed::TransactionFeed,
    store::{LedgerEntry, LedgerStore},
    types::{AccountId, Amount, BatchId},
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddReport {
    pub batch_id: BatchId,
    pub added: Vec<AccountId>,
    pub already_existing: Vec<AccountId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoveReport {
    pub batch_id: BatchId,
    pub removed: Vec<AccountId>,
    pub missing: Vec<AccountId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountBalance {
    pub account_id: AccountId,
    pub balance: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceReport {
    pub balances: Vec<AccountBalance>,
    pub total: Amount,
}

/// Per-account sync results, in request order.
#[derive(Debug)]
pub struct BatchReport {
    pub batch_id: BatchId,
    pub results: Vec<(AccountId, SyncResult<SyncSummary>)>,
}

/// Serializable view of one account's sync result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Ok {
        #[serde(flatten)]
        summary: SyncSummary,
    },
    Failed {
        account_id: AccountId,
        kind: SyncErrorKind,
        detail: String,
        retryable: bool,
    },
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn all_ok(&self) -> bool {
        self.failed() == 0
    }

    pub fn outcomes(&self) -> Vec<SyncOutcome> {
        self.results
            .iter()
            .map(|(account_id, result)| match result {
                Ok(summary) => SyncOutcome::Ok {
                    summary: summary.clone(),
                },
                Err(e) => SyncOutcome::Failed {
                    account_id: account_id.clone(),
                    kind: e.kind(),
                    detail: e.to_string(),
                    retryable: e.is_retryable(),
                },
            })
            .collect()
    }
}

pub struct AccountService<'a, S: LedgerStore + ?Sized, F: TransactionFeed + ?Sized> {
    store: &'a S,
    feed: &'a F,
    config: LedgerConfig,
    cancel: Option<&'a AtomicBool>,
}

impl<'a, S: LedgerStore + ?Sized, F: TransactionFeed + ?Sized> AccountService<'a, S, F> {
    pub fn new(store: &'a S, feed: &'a F, config: LedgerConfig) -> Self {
        Self {
            store,
            feed,
            config,
            cancel: None,
        }
    }

    /// Cancellation flag handed to every engine run of this service.
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn new_batch_id() -> BatchId {
        uuid::Uuid::new_v4().to_string()
    }

    fn record(&self, batch_id: &str, event: &LedgerEvent) -> StoreResult<()> {
        let entry = EventLogEntry::new(batch_id, event)?;
        self.store.append_event(&entry)
    }

    // ── Registration ──────────────────────────────────────────────

    /// Register each id. Ids already present are reported, not fatal.
    pub fn add_accounts(&self, account_ids: &[AccountId]) -> StoreResult<AddReport> {
        let batch_id = Self::new_batch_id();
        let mut added = Vec::new();
        let mut already_existing = Vec::new();

        for account_id in account_ids {
            let event = match self.store.insert_account(account_id) {
                Ok(()) => {
                    added.push(account_id.clone());
                    LedgerEvent::AccountAdded {
                        account_id: account_id.clone(),
                    }
                }
                Err(StoreError::AccountExists { .. }) => {
                    log::warn!("account={account_id} add: already exists");
                    already_existing.push(account_id.clone());
                    LedgerEvent::AccountAlreadyExists {
                        account_id: account_id.clone(),
                    }
                }
                Err(e) => {
                    log::error!("account={account_id} add: {e}");
                    return Err(e);
                }
            };
            self.record(&batch_id, &event)?;
        }

        Ok(AddReport {
            batch_id,
            added,
            already_existing,
        })
    }

    /// Remove each id together with its ledger entries.
    pub fn remove_accounts(&self, account_ids: &[AccountId]) -> StoreResult<RemoveReport> {
        let batch_id = Self::new_batch_id();
        let mut removed = Vec::new();
        let mut missing = Vec::new();

        for account_id in account_ids {
            let existed = self.store.remove_account(account_id)?;
            if existed {
                removed.push(account_id.clone());
            } else {
                log::warn!("account={account_id} remove: not registered");
                missing.push(account_id.clone());
            }
            self.record(
                &batch_id,
                &LedgerEvent::AccountRemoved {
                    account_id: account_id.clone(),
                    existed,
                },
            )?;
        }

        Ok(RemoveReport {
            batch_id,
            removed,
            missing,
        })
    }

    // ── Queries ───────────────────────────────────────────────────

    /// Balances of every id plus their sum. Any unknown id, or a sum past
    /// the i64 range, fails the request.
    pub fn balances(&self, account_ids: &[AccountId]) -> StoreResult<BalanceReport> {
        let mut balances = Vec::with_capacity(account_ids.len());
        let mut total: Amount = 0;
        for account_id in account_ids {
            let balance = self.store.get_balance(account_id)?;
            total = total
                .checked_add(balance)
                .ok_or(StoreError::TotalOverflow {
                    accounts: account_ids.len(),
                })?;
            balances.push(AccountBalance {
                account_id: account_id.clone(),
                balance,
            });
        }
        Ok(BalanceReport { balances, total })
    }

    /// Recorded entries of every id, concatenated in request order.
    pub fn list_transactions(
        &self,
        account_ids: &[AccountId],
        limit: Option<u32>,
        offset: u32,
    ) -> StoreResult<Vec<LedgerEntry>> {
        let mut entries = Vec::new();
        for account_id in account_ids {
            entries.extend(self.store.list_entries(account_id, limit, offset)?);
        }
        Ok(entries)
    }

    // ── Sync ──────────────────────────────────────────────────────

    pub fn sync_account(&self, account_id: &str) -> SyncResult<SyncSummary> {
        let engine = ReconciliationEngine::new(self.store, self.feed, &self.config);
        match self.cancel {
            Some(flag) => engine.with_cancel(flag).sync(account_id),
            None => engine.sync(account_id),
        }
    }

    /// Reconcile every id in order; one result per id.
    pub fn sync_batch(&self, account_ids: &[AccountId]) -> BatchReport {
        let batch_id = Self::new_batch_id();
        let mut results = Vec::with_capacity(account_ids.len());

        for account_id in account_ids {
            let result = self.sync_account(account_id);
            let event = match &result {
                Ok(summary) => LedgerEvent::AccountSynced {
                    account_id: account_id.clone(),
                    entries_processed: summary.entries_processed,
                    new_balance: summary.new_balance,
                    new_sync_block: summary.new_sync_block,
                },
                Err(e) => {
                    log::warn!("account={account_id} sync failed ({:?}): {e}", e.kind());
                    LedgerEvent::SyncFailed {
                        account_id: account_id.clone(),
                        kind: e.kind(),
                        detail: e.to_string(),
                    }
                }
            };
            // The audit trail must not turn a finished sync into a failure.
            if let Err(e) = self.record(&batch_id, &event) {
                log::error!("account={account_id} sync: event log write failed: {e}");
            }
            results.push((account_id.clone(), result));
        }

        let report = BatchReport { batch_id, results };
        log::info!(
            "batch={} sync: {} ok, {} failed",
            report.batch_id,
            report.succeeded(),
            report.failed()
        );
        report
    }
}

/// Split a pipe-separated id list (`a|b|c`), dropping empty segments.
pub fn parse_account_ids(raw: &str) -> Vec<AccountId> {
    raw.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;

    #[test]
    fn parses_pipe_separated_ids() {
        assert_eq!(parse_account_ids("a| b ||c"), vec!["a", "b", "c"]);
        assert!(parse_account_ids("").is_empty());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let report = BatchReport {
            batch_id: "b".into(),
            results: vec![
                (
                    "x".into(),
                    Ok(SyncSummary {
                        account_id: "x".into(),
                        entries_processed: 1,
                        duplicates_skipped: 0,
                        pages_fetched: 2,
                        new_balance: 5,
                        new_sync_block: 9,
                    }),
                ),
                ("y".into(), Err(SyncError::AccountNotFound { account_id: "y".into() })),
            ],
        };
        let json = serde_json::to_value(report.outcomes()).unwrap();
        assert_eq!(json[0]["status"], "ok");
        assert_eq!(json[0]["new_sync_block"], 9);
        assert_eq!(json[1]["status"], "failed");
        assert_eq!(json[1]["kind"], "account_not_found");
        assert_eq!(json[1]["retryable"], false);
        assert_eq!(report.failed(), 1);
    }
}
