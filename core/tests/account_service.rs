//! Integration tests for the account service.
//!
//! Tests verify:
//! 1. Batches run in order and keep going after a failed account
//! 2. Add reports existing ids instead of failing
//! 3. Remove cascades to ledger entries
//! 4. Balances and transaction listings across several accounts
//! 5. Every outcome lands in the event log under the batch id

use chainledger_core::{
    account_service::{AccountService, SyncOutcome},
    config::LedgerConfig,
    error::{FeedResult, StoreError, SyncError, SyncErrorKind},
    event::LedgerEvent,
    feed::{AddressPage, FeedTransaction, MemoryFeed, TransactionFeed, TxIo},
    store::{LedgerStore, SqliteLedgerStore},
    types::{AccountId, Amount, BlockHeight},
};
use std::sync::atomic::{AtomicBool, Ordering};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn build_store() -> SqliteLedgerStore {
    init_logging();
    let store = SqliteLedgerStore::in_memory().expect("in_memory failed");
    store.migrate().expect("migrate failed");
    store
}

fn ids(raw: &[&str]) -> Vec<AccountId> {
    raw.iter().map(|s| s.to_string()).collect()
}

fn credit(account: &str, hash: &str, height: BlockHeight, value: Amount) -> FeedTransaction {
    FeedTransaction {
        hash: hash.into(),
        block_height: height,
        inputs: vec![],
        outputs: vec![TxIo::new(account, value)],
    }
}

/// Three accounts; "bad" has an out-of-order history.
fn seeded_feed() -> MemoryFeed {
    let feed = MemoryFeed::new();
    feed.set_history("a", vec![credit("a", "a2", 20, 5), credit("a", "a1", 10, 7)]);
    feed.set_history("bad", vec![credit("bad", "b1", 5, 1), credit("bad", "b2", 6, 1)]);
    feed.set_history("c", vec![credit("c", "c1", 30, 100)]);
    feed
}

// ─────────────────────────────────────────────────────────────────────────────
// Batch sync
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn batch_continues_past_failures_in_order() {
    let store = build_store();
    let feed = seeded_feed();
    let service = AccountService::new(&store, &feed, LedgerConfig::default_test());
    service.add_accounts(&ids(&["a", "bad", "c"])).unwrap();

    let report = service.sync_batch(&ids(&["a", "bad", "missing", "c"]));

    let order: Vec<&str> = report.results.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(order, vec!["a", "bad", "missing", "c"]);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 2);
    assert!(!report.all_ok());

    let kinds: Vec<Option<SyncErrorKind>> = report
        .results
        .iter()
        .map(|(_, r)| r.as_ref().err().map(|e| e.kind()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            None,
            Some(SyncErrorKind::FeedInconsistency),
            Some(SyncErrorKind::AccountNotFound),
            None
        ]
    );

    assert_eq!(store.get_balance("a").unwrap(), 12);
    assert_eq!(store.get_balance("bad").unwrap(), 0);
    assert_eq!(store.get_balance("c").unwrap(), 100);
}

#[test]
fn batch_outcomes_and_events_share_batch_id() {
    let store = build_store();
    let feed = seeded_feed();
    let service = AccountService::new(&store, &feed, LedgerConfig::default_test());
    service.add_accounts(&ids(&["a", "bad"])).unwrap();

    let report = service.sync_batch(&ids(&["a", "bad"]));
    let outcomes = report.outcomes();
    assert!(matches!(outcomes[0], SyncOutcome::Ok { ref summary } if summary.new_sync_block == 20));
    assert!(matches!(
        outcomes[1],
        SyncOutcome::Failed { kind: SyncErrorKind::FeedInconsistency, retryable: false, .. }
    ));

    let events = store.events_for_batch(&report.batch_id).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, "account_synced");
    assert_eq!(events[1].event_type, "sync_failed");
    assert_eq!(
        events[0].decode().unwrap(),
        LedgerEvent::AccountSynced {
            account_id: "a".into(),
            entries_processed: 2,
            new_balance: 12,
            new_sync_block: 20,
        }
    );
}

#[test]
fn empty_batch_is_empty_report() {
    let store = build_store();
    let feed = MemoryFeed::new();
    let service = AccountService::new(&store, &feed, LedgerConfig::default_test());

    let report = service.sync_batch(&[]);
    assert!(report.results.is_empty());
    assert!(report.all_ok());
}

/// Raises the cancel flag as soon as `trigger` is first requested.
struct CancelOnAccount<'a> {
    inner: &'a MemoryFeed,
    trigger: &'a str,
    flag: &'a AtomicBool,
}

impl TransactionFeed for CancelOnAccount<'_> {
    fn get_address(&self, account_id: &str, limit: u32, offset: u64) -> FeedResult<AddressPage> {
        if account_id == self.trigger {
            self.flag.store(true, Ordering::SeqCst);
        }
        self.inner.get_address(account_id, limit, offset)
    }
}

#[test]
fn cancelling_mid_batch_keeps_finished_accounts() {
    let store = build_store();
    let inner = seeded_feed();
    inner.set_history("d", vec![credit("d", "d1", 40, 9)]);
    let cancel = AtomicBool::new(false);
    let feed = CancelOnAccount { inner: &inner, trigger: "c", flag: &cancel };
    let service =
        AccountService::new(&store, &feed, LedgerConfig::default_test()).with_cancel(&cancel);
    service.add_accounts(&ids(&["a", "c", "d"])).unwrap();

    let report = service.sync_batch(&ids(&["a", "c", "d"]));

    let order: Vec<&str> = report.results.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(order, vec!["a", "c", "d"]);
    assert!(report.results[0].1.is_ok());
    assert!(matches!(report.results[1].1, Err(SyncError::Cancelled)));
    assert!(matches!(report.results[2].1, Err(SyncError::Cancelled)));

    // "a" finished before the flag went up and stays committed.
    assert_eq!(store.get_balance("a").unwrap(), 12);
    assert_eq!(store.get_account("a").unwrap().sync_block, 20);
    // "c" was cancelled between pages, "d" before its first page.
    assert_eq!(store.get_balance("c").unwrap(), 0);
    assert_eq!(store.entry_count("c").unwrap(), 0);
    assert_eq!(store.get_balance("d").unwrap(), 0);
    assert_eq!(inner.calls(), 3, "a: two pages, c: one page, d: none");

    let events = store.events_for_batch(&report.batch_id).unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[2].event_type, "sync_failed");
}

// ─────────────────────────────────────────────────────────────────────────────
// Registration
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn add_reports_already_existing_accounts() {
    let store = build_store();
    let feed = MemoryFeed::new();
    let service = AccountService::new(&store, &feed, LedgerConfig::default_test());

    let first = service.add_accounts(&ids(&["x", "y"])).unwrap();
    assert_eq!(first.added, ids(&["x", "y"]));
    assert!(first.already_existing.is_empty());

    let second = service.add_accounts(&ids(&["y", "z"])).unwrap();
    assert_eq!(second.added, ids(&["z"]));
    assert_eq!(second.already_existing, ids(&["y"]));

    assert!(matches!(
        store.insert_account("x"),
        Err(StoreError::AccountExists { .. })
    ));
    let events = store.events_for_account("y").unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event_type, "account_already_exists");
}

#[test]
fn remove_cascades_ledger_entries() {
    let store = build_store();
    let feed = seeded_feed();
    let service = AccountService::new(&store, &feed, LedgerConfig::default_test());
    service.add_accounts(&ids(&["a", "c"])).unwrap();
    service.sync_batch(&ids(&["a", "c"]));
    assert_eq!(store.total_entry_count().unwrap(), 3);

    let report = service.remove_accounts(&ids(&["a", "ghost"])).unwrap();
    assert_eq!(report.removed, ids(&["a"]));
    assert_eq!(report.missing, ids(&["ghost"]));

    assert_eq!(store.entry_count("a").unwrap(), 0);
    assert_eq!(store.total_entry_count().unwrap(), 1);
    assert!(matches!(
        store.get_account("a"),
        Err(StoreError::AccountNotFound { .. })
    ));

    // Re-adding starts from scratch and resyncs the full history.
    service.add_accounts(&ids(&["a"])).unwrap();
    let summary = service.sync_account("a").unwrap();
    assert_eq!(summary.entries_processed, 2);
    assert_eq!(summary.new_balance, 12);
}

// ─────────────────────────────────────────────────────────────────────────────
// Queries
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn balances_include_total() {
    let store = build_store();
    let feed = seeded_feed();
    let service = AccountService::new(&store, &feed, LedgerConfig::default_test());
    service.add_accounts(&ids(&["a", "c"])).unwrap();
    service.sync_batch(&ids(&["a", "c"]));

    let report = service.balances(&ids(&["a", "c"])).unwrap();
    assert_eq!(report.balances[0].balance, 12);
    assert_eq!(report.balances[1].balance, 100);
    assert_eq!(report.total, 112);

    assert!(matches!(
        service.balances(&ids(&["a", "nope"])),
        Err(StoreError::AccountNotFound { ref account_id }) if account_id == "nope"
    ));
}

#[test]
fn balance_total_overflow_is_an_error() {
    let store = build_store();
    let feed = MemoryFeed::new();
    let service = AccountService::new(&store, &feed, LedgerConfig::default_test());
    service.add_accounts(&ids(&["rich", "small"])).unwrap();
    store.commit_sync("rich", i64::MAX, 1, &[]).unwrap();
    store.commit_sync("small", 10, 1, &[]).unwrap();

    assert!(matches!(
        service.balances(&ids(&["rich", "small"])),
        Err(StoreError::TotalOverflow { accounts: 2 })
    ));
    assert_eq!(service.balances(&ids(&["rich"])).unwrap().total, i64::MAX);
}

#[test]
fn transaction_listing_pages_by_limit() {
    let store = build_store();
    let feed = MemoryFeed::new();
    feed.set_history(
        "a",
        (1..=5).rev().map(|h| credit("a", &format!("t{h}"), h, 1)).collect(),
    );
    let service = AccountService::new(&store, &feed, LedgerConfig::default_test());
    service.add_accounts(&ids(&["a"])).unwrap();
    service.sync_account("a").unwrap();

    let all = service.list_transactions(&ids(&["a"]), None, 7).unwrap();
    assert_eq!(all.len(), 5);
    assert_eq!(all[0].tx_id, "t5");

    let second_page = service.list_transactions(&ids(&["a"]), Some(2), 1).unwrap();
    let hashes: Vec<&str> = second_page.iter().map(|e| e.tx_id.as_str()).collect();
    assert_eq!(hashes, vec!["t3", "t2"]);

    let past_end = service.list_transactions(&ids(&["a"]), Some(2), 3).unwrap();
    assert!(past_end.is_empty());
}
