//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The engine and the service call `LedgerStore` methods; they never
//! execute SQL directly.

use crate::{
    error::{StoreError, StoreResult},
    event::EventLogEntry,
    types::{AccountId, Amount, BlockHeight},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

mod account;
mod entry;
mod event_log;

/// The resume point of an account: what has already been folded in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountState {
    pub balance: Amount,
    pub sync_block: BlockHeight,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountRow {
    pub account_id: AccountId,
    pub balance: Amount,
    pub sync_block: BlockHeight,
    pub created_at: String,
    pub last_synced_at: Option<String>,
}

/// One reconciled transaction's effect on one account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub tx_id: String,
    pub account_id: AccountId,
    pub value_change: Amount,
    pub block_height: BlockHeight,
}

/// Read/write contract the engine and the service depend on.
///
/// Every mutating operation is atomic: it applies fully or not at all.
pub trait LedgerStore {
    /// Current `(balance, sync_block)`, or `AccountNotFound`.
    fn get_account(&self, account_id: &str) -> StoreResult<AccountState>;

    /// Insert `entries` and move the account to `(new_balance, new_sync_block)`
    /// in one transaction.
    ///
    /// Fails with `DuplicateEntry` (carrying the stored row's height) if any
    /// `(account_id, tx_id)` already exists, and with `WatermarkRegression`
    /// if `new_sync_block` is below the stored watermark. Nothing is
    /// written on failure.
    fn commit_sync(
        &self,
        account_id: &str,
        new_balance: Amount,
        new_sync_block: BlockHeight,
        entries: &[LedgerEntry],
    ) -> StoreResult<()>;

    /// Register an account at balance 0, watermark 0, or `AccountExists`.
    fn insert_account(&self, account_id: &str) -> StoreResult<()>;

    /// Delete an account together with all of its entries.
    /// Returns whether the account existed.
    fn remove_account(&self, account_id: &str) -> StoreResult<bool>;

    fn get_balance(&self, account_id: &str) -> StoreResult<Amount>;

    /// Entries newest-first. `limit: None` returns everything; `offset`
    /// counts pages of `limit` rows and is ignored without a limit.
    fn list_entries(
        &self,
        account_id: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> StoreResult<Vec<LedgerEntry>>;

    fn append_event(&self, entry: &EventLogEntry) -> StoreResult<()>;
}

pub struct SqliteLedgerStore {
    conn: Connection,
}

impl SqliteLedgerStore {
    pub fn open(path: &str) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only matters for real files; :memory: ignores it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> StoreResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_ledger.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_event_log.sql"))?;
        Ok(())
    }

    /// Raw SQL access for failure-injection fixtures in integration tests.
    /// Not part of the ledger API; ledger code goes through `LedgerStore`.
    #[doc(hidden)]
    pub fn test_connection(&self) -> &Connection {
        &self.conn
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn get_account(&self, account_id: &str) -> StoreResult<AccountState> {
        self.account_state(account_id)
    }

    fn commit_sync(
        &self,
        account_id: &str,
        new_balance: Amount,
        new_sync_block: BlockHeight,
        entries: &[LedgerEntry],
    ) -> StoreResult<()> {
        self.commit_entries(account_id, new_balance, new_sync_block, entries)
    }

    fn insert_account(&self, account_id: &str) -> StoreResult<()> {
        self.create_account(account_id)
    }

    fn remove_account(&self, account_id: &str) -> StoreResult<bool> {
        self.delete_account(account_id)
    }

    fn get_balance(&self, account_id: &str) -> StoreResult<Amount> {
        self.account_balance(account_id)
    }

    fn list_entries(
        &self,
        account_id: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> StoreResult<Vec<LedgerEntry>> {
        self.entries_for_account(account_id, limit, offset)
    }

    fn append_event(&self, entry: &EventLogEntry) -> StoreResult<()> {
        self.insert_event(entry)
    }
}

/// True for a PRIMARY KEY / UNIQUE violation, the only constraint failure
/// the store turns into a typed duplicate error.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Heights are INTEGER columns; anything past i64::MAX cannot be stored.
fn height_to_sql(height: BlockHeight) -> StoreResult<i64> {
    i64::try_from(height).map_err(|_| StoreError::HeightOutOfRange { height })
}

fn not_found(account_id: &str) -> StoreError {
    StoreError::AccountNotFound {
        account_id: account_id.to_string(),
    }
}
