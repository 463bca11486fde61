use super::{is_unique_violation, not_found, AccountRow, AccountState, SqliteLedgerStore};
use crate::{
    error::{StoreError, StoreResult},
    types::Amount,
};
use rusqlite::{params, OptionalExtension};

impl SqliteLedgerStore {
    // ── Account ───────────────────────────────────────────────────

    pub(super) fn create_account(&self, account_id: &str) -> StoreResult<()> {
        let created_at = chrono::Utc::now().to_rfc3339();
        match self.conn.execute(
            "INSERT INTO account (account_id, balance, sync_block, created_at)
             VALUES (?1, 0, 0, ?2)",
            params![account_id, created_at],
        ) {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::AccountExists {
                account_id: account_id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub(super) fn account_state(&self, account_id: &str) -> StoreResult<AccountState> {
        self.conn
            .query_row(
                "SELECT balance, sync_block FROM account WHERE account_id = ?1",
                params![account_id],
                |row| {
                    Ok(AccountState {
                        balance: row.get(0)?,
                        sync_block: row.get::<_, i64>(1)? as u64,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| not_found(account_id))
    }

    pub(super) fn account_balance(&self, account_id: &str) -> StoreResult<Amount> {
        self.conn
            .query_row(
                "SELECT balance FROM account WHERE account_id = ?1",
                params![account_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| not_found(account_id))
    }

    /// Entries go first, then the account row, in one transaction, so a
    /// failure can never leave orphaned entries behind.
    pub(super) fn delete_account(&self, account_id: &str) -> StoreResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM ledger_entry WHERE account_id = ?1",
            params![account_id],
        )?;
        let removed = tx.execute(
            "DELETE FROM account WHERE account_id = ?1",
            params![account_id],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    /// All registered accounts, ordered by id.
    pub fn all_accounts(&self) -> StoreResult<Vec<AccountRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT account_id, balance, sync_block, created_at, last_synced_at
             FROM account ORDER BY account_id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AccountRow {
                    account_id: row.get(0)?,
                    balance: row.get(1)?,
                    sync_block: row.get::<_, i64>(2)? as u64,
                    created_at: row.get(3)?,
                    last_synced_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
